//! Moving a native installer's output from the staging directory into place.
//!
//! Installers unpack into `App`, `Data` and `Other` plus loose files. `App`
//! and `Other` replace the installed copies, the staged `Data` is discarded so
//! user data survives, and loose files are carried over unless they are
//! package artifacts.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use ad_core::{Error, Limits};

use crate::locks::LockBreaker;

/// Staging files with these suffixes are installer leftovers, never installed.
pub const ARTIFACT_SUFFIXES: &[&str] = &[".7z", ".rar", ".zip", ".paf.exe"];

const REPLACED_DIRS: [&str; 2] = ["App", "Other"];
const DATA_DIR: &str = "Data";

pub struct DirectoryReconciler<'a> {
    locks: &'a LockBreaker<'a>,
    attempts: usize,
    delay: Duration,
}

impl<'a> DirectoryReconciler<'a> {
    pub fn new(locks: &'a LockBreaker<'a>, limits: &Limits) -> Self {
        Self {
            locks,
            attempts: limits.reconcile_attempts.max(1),
            delay: limits.reconcile_delay,
        }
    }

    /// Reconcile `staging` into `install_dir`, retrying on I/O errors.
    ///
    /// Returns whether anything was moved. A retry only touches what is
    /// still staged, so folders moved by an earlier attempt stay in place.
    pub fn reconcile(&self, staging: &Path, install_dir: &Path) -> Result<bool, Error> {
        let staged = ["App", DATA_DIR, "Other"]
            .iter()
            .any(|name| staging.join(name).is_dir());
        if !staged {
            debug!(staging = %staging.display(), "nothing staged");
            return Ok(false);
        }

        let mut cleared = false;
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.reconcile_once(staging, install_dir, &mut cleared) {
                Ok(()) => {
                    info!(dest = %install_dir.display(), "installed files moved into place");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconciliation failed");
                    last_error = e.to_string();
                    if attempt < self.attempts {
                        std::thread::sleep(self.delay);
                    }
                }
            }
        }

        Err(Error::ReconcileFailed {
            attempts: self.attempts,
            message: last_error,
        })
    }

    fn reconcile_once(
        &self,
        staging: &Path,
        install_dir: &Path,
        cleared: &mut bool,
    ) -> Result<(), Error> {
        if install_dir.is_dir() {
            self.release(install_dir)?;
            for name in REPLACED_DIRS {
                let dir = install_dir.join(name);
                if staging.join(name).is_dir() && dir.is_dir() {
                    fs::remove_dir_all(&dir)?;
                }
            }
            // loose files moved in by an earlier attempt must survive a retry
            if !*cleared {
                for entry in fs::read_dir(install_dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        fs::remove_file(entry.path())?;
                    }
                }
            }
        } else {
            fs::create_dir_all(install_dir)?;
        }
        *cleared = true;

        for name in REPLACED_DIRS {
            let src = staging.join(name);
            if src.is_dir() {
                self.release(&src)?;
                move_path(&src, &install_dir.join(name))?;
            }
        }

        let data = staging.join(DATA_DIR);
        if data.is_dir() {
            fs::remove_dir_all(&data)?;
        }

        for entry in fs::read_dir(staging)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() || is_hidden(&entry)? {
                continue;
            }
            let name = entry.file_name();
            let lower = name.to_string_lossy().to_ascii_lowercase();
            if ARTIFACT_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
                continue;
            }
            self.release(&entry.path())?;
            move_path(&entry.path(), &install_dir.join(&name))?;
        }

        Ok(())
    }

    fn release(&self, path: &Path) -> Result<(), Error> {
        if self.locks.break_locks(path, true)? {
            Ok(())
        } else {
            Err(Error::LockRelease {
                path: path.to_path_buf(),
                message: "locks could not be released".to_string(),
            })
        }
    }
}

#[cfg(windows)]
fn is_hidden(entry: &fs::DirEntry) -> io::Result<bool> {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    Ok(entry.metadata()?.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
}

#[cfg(not(windows))]
fn is_hidden(entry: &fs::DirEntry) -> io::Result<bool> {
    Ok(entry.file_name().to_string_lossy().starts_with('.'))
}

/// Rename, falling back to copy-and-delete across filesystems.
fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_recursive(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)
            } else {
                fs::remove_file(src)
            }
        }
        Err(e) => Err(e),
    }
}

fn copy_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockProcessTable, MockPrompt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn unlocked() -> MockProcessTable {
        let mut table = MockProcessTable::new();
        table.expect_locking_processes().returning(|_| Ok(vec![]));
        table
    }

    fn limits() -> Limits {
        Limits {
            reconcile_delay: Duration::ZERO,
            ..Limits::default()
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn empty_staging_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("apps");
        fs::create_dir_all(&staging).unwrap();
        write(&staging.join("readme.txt"), "loose");

        let table = unlocked();
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let reconciler = DirectoryReconciler::new(&locks, &limits());

        let install = tmp.path().join("Example");
        assert!(!reconciler.reconcile(&staging, &install).unwrap());
        assert!(!install.exists());
        assert!(staging.join("readme.txt").exists());
    }

    #[test]
    fn fresh_install_moves_layout_and_loose_files() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("apps");
        write(&staging.join("App/Example/example.exe"), "bin");
        write(&staging.join("Other/Source/license.txt"), "license");
        write(&staging.join("Data/settings.ini"), "defaults");
        write(&staging.join("ExamplePortable.exe"), "launcher");
        write(&staging.join("help.html"), "help");
        write(&staging.join("Example_1.0.paf.exe"), "package");
        write(&staging.join("bundle.zip"), "zip");
        write(&staging.join(".hidden"), "secret");

        let table = unlocked();
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let reconciler = DirectoryReconciler::new(&locks, &limits());

        let install = tmp.path().join("Example");
        assert!(reconciler.reconcile(&staging, &install).unwrap());

        assert!(install.join("App/Example/example.exe").exists());
        assert!(install.join("Other/Source/license.txt").exists());
        assert!(install.join("ExamplePortable.exe").exists());
        assert!(install.join("help.html").exists());
        assert!(!install.join("Data").exists());
        assert!(!install.join("Example_1.0.paf.exe").exists());
        assert!(!install.join("bundle.zip").exists());
        assert!(!install.join(".hidden").exists());

        assert!(!staging.join("App").exists());
        assert!(!staging.join("Data").exists());
        assert!(staging.join("Example_1.0.paf.exe").exists());
    }

    #[test]
    fn update_replaces_app_but_keeps_user_data() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("Example");
        write(&install.join("App/old.dll"), "old");
        write(&install.join("Data/settings.ini"), "user settings");
        write(&install.join("ExamplePortable.exe"), "old launcher");

        let staging = tmp.path().join("apps");
        write(&staging.join("App/new.dll"), "new");
        write(&staging.join("Data/settings.ini"), "defaults");

        let table = unlocked();
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let reconciler = DirectoryReconciler::new(&locks, &limits());

        assert!(reconciler.reconcile(&staging, &install).unwrap());

        assert!(install.join("App/new.dll").exists());
        assert!(!install.join("App/old.dll").exists());
        assert!(!install.join("ExamplePortable.exe").exists());
        assert_eq!(
            fs::read_to_string(install.join("Data/settings.ini")).unwrap(),
            "user settings"
        );
    }

    #[test]
    fn second_run_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("apps");
        write(&staging.join("App/example.exe"), "bin");
        write(&staging.join("Data/settings.ini"), "defaults");

        let table = unlocked();
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let reconciler = DirectoryReconciler::new(&locks, &limits());

        let install = tmp.path().join("Example");
        assert!(reconciler.reconcile(&staging, &install).unwrap());
        assert!(!reconciler.reconcile(&staging, &install).unwrap());
        assert!(install.join("App/example.exe").exists());
    }

    #[test]
    fn persistent_failure_reports_attempts() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("apps");
        write(&staging.join("App/example.exe"), "bin");
        // a plain file where the install directory should be
        let install = tmp.path().join("Example");
        write(&install, "not a directory");

        let table = unlocked();
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let limits = Limits {
            reconcile_attempts: 3,
            ..limits()
        };
        let reconciler = DirectoryReconciler::new(&locks, &limits);

        let err = reconciler.reconcile(&staging, &install).unwrap_err();
        assert!(matches!(err, Error::ReconcileFailed { attempts: 3, .. }));
    }

    #[test]
    fn retry_keeps_folders_moved_by_earlier_attempt() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("Example");
        write(&install.join("App/old.exe"), "old");
        write(&install.join("Other/old.txt"), "old");

        let staging = tmp.path().join("apps");
        write(&staging.join("App/new.exe"), "new");
        write(&staging.join("Other/lic.txt"), "license");
        write(&staging.join("ExamplePortable.exe"), "launcher");

        let failed_once = Mutex::new(false);
        let mut table = MockProcessTable::new();
        table.expect_locking_processes().returning(move |path| {
            let mut failed = failed_once.lock().unwrap();
            if path.ends_with("apps/Other") && !*failed {
                *failed = true;
                return Err(Error::Io {
                    message: "sharing violation".into(),
                });
            }
            Ok(vec![])
        });
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let limits = Limits {
            reconcile_attempts: 2,
            ..limits()
        };
        let reconciler = DirectoryReconciler::new(&locks, &limits);

        assert!(reconciler.reconcile(&staging, &install).unwrap());

        assert!(install.join("App/new.exe").exists());
        assert!(!install.join("App/old.exe").exists());
        assert!(install.join("Other/lic.txt").exists());
        assert!(!install.join("Other/old.txt").exists());
        assert!(install.join("ExamplePortable.exe").exists());
        assert!(!staging.join("App").exists());
        assert!(!staging.join("Other").exists());
    }

    #[test]
    fn retry_keeps_loose_files_moved_by_earlier_attempt() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("Example");
        fs::create_dir_all(&install).unwrap();

        let staging = tmp.path().join("apps");
        write(&staging.join("App/example.exe"), "bin");
        write(&staging.join("a-help.html"), "help");
        write(&staging.join("z-readme.txt"), "readme");

        let failed_once = Mutex::new(false);
        let mut table = MockProcessTable::new();
        table.expect_locking_processes().returning(move |path| {
            let mut failed = failed_once.lock().unwrap();
            if path.ends_with("z-readme.txt") && !*failed {
                *failed = true;
                return Err(Error::Io {
                    message: "sharing violation".into(),
                });
            }
            Ok(vec![])
        });
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let limits = Limits {
            reconcile_attempts: 2,
            ..limits()
        };
        let reconciler = DirectoryReconciler::new(&locks, &limits);

        assert!(reconciler.reconcile(&staging, &install).unwrap());
        assert!(install.join("App/example.exe").exists());
        assert!(install.join("a-help.html").exists());
        assert!(install.join("z-readme.txt").exists());
    }

    #[test]
    fn loose_files_are_unlocked_before_moving() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("apps");
        write(&staging.join("App/example.exe"), "bin");
        write(&staging.join("ExamplePortable.exe"), "launcher");

        let launcher_checks = Arc::new(AtomicUsize::new(0));
        let counter = launcher_checks.clone();
        let mut table = MockProcessTable::new();
        table.expect_locking_processes().returning(move |path| {
            if path.ends_with("ExamplePortable.exe") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(vec![])
        });
        let prompt = MockPrompt::new();
        let locks = LockBreaker::new(&table, &prompt);
        let reconciler = DirectoryReconciler::new(&locks, &limits());

        let install = tmp.path().join("Example");
        assert!(reconciler.reconcile(&staging, &install).unwrap());
        assert_eq!(launcher_checks.load(Ordering::SeqCst), 1);
        assert!(install.join("ExamplePortable.exe").exists());
    }
}
