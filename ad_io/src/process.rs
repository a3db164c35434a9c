//! Process inspection and installer launching on the host system.

use std::path::Path;
use std::process::{Child, Command};

use sysinfo::{Pid, Signal, System};
use tracing::debug;

use ad_core::Error;

use crate::traits::{InstallerLauncher, InstallerProcess, LockingProcess, ProcessTable};

/// [`ProcessTable`] backed by `sysinfo`.
///
/// Open handles are discovered through `/proc/<pid>/fd`; on platforms
/// without procfs no process is ever reported as locking.
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }

    fn with_process<T>(
        &self,
        target: &LockingProcess,
        f: impl FnOnce(&sysinfo::Process) -> T,
    ) -> Result<Option<T>, Error> {
        let mut system = System::new();
        system.refresh_processes();
        Ok(system.process(Pid::from_u32(target.pid)).map(f))
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn locking_processes(&self, path: &Path) -> Result<Vec<LockingProcess>, Error> {
        let own_pid = std::process::id();
        let mut system = System::new();
        system.refresh_processes();

        let mut locking: Vec<LockingProcess> = open_handle_pids(path)?
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .map(|pid| LockingProcess {
                pid,
                name: system
                    .process(Pid::from_u32(pid))
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
            })
            .collect();
        locking.sort_by_key(|p| p.pid);
        Ok(locking)
    }

    fn close(&self, process: &LockingProcess) -> Result<(), Error> {
        match self.with_process(process, |p| p.kill_with(Signal::Term))? {
            None => Ok(()),
            Some(Some(true)) => Ok(()),
            Some(Some(false)) => Err(Error::Io {
                message: format!("failed to signal process {}", process.pid),
            }),
            // no graceful signal on this platform
            Some(None) => self.terminate(process),
        }
    }

    fn terminate(&self, process: &LockingProcess) -> Result<(), Error> {
        match self.with_process(process, |p| p.kill())? {
            None | Some(true) => Ok(()),
            Some(false) => Err(Error::Io {
                message: format!("failed to kill process {}", process.pid),
            }),
        }
    }
}

#[cfg(target_os = "linux")]
fn open_handle_pids(path: &Path) -> Result<Vec<u32>, Error> {
    let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut pids = Vec::new();

    for entry in std::fs::read_dir("/proc")? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // processes owned by other users are unreadable; skip them
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds = fds
            .flatten()
            .filter_map(|fd| std::fs::read_link(fd.path()).ok())
            .any(|link| link.starts_with(&target));
        if holds {
            pids.push(pid);
        }
    }
    Ok(pids)
}

#[cfg(not(target_os = "linux"))]
fn open_handle_pids(path: &Path) -> Result<Vec<u32>, Error> {
    debug!(path = %path.display(), "open handle enumeration unsupported on this platform");
    Ok(Vec::new())
}

/// Launches installers with `std::process::Command`.
pub struct StdLauncher;

impl InstallerLauncher for StdLauncher {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<Box<dyn InstallerProcess>, Error> {
        debug!(program = %program.display(), ?args, "launching installer");
        let child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .spawn()
            .map_err(|e| Error::AutomationFailed {
                message: format!("failed to start {}: {e}", program.display()),
            })?;
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl InstallerProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> Result<bool, Error> {
        Ok(self.child.try_wait()?.is_some())
    }

    fn wait(&mut self) -> Result<(), Error> {
        let status = self.child.wait()?;
        debug!(?status, "installer exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(target_os = "linux")]
    #[test]
    fn own_handles_are_not_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("held.bin");
        let _file = std::fs::File::create(&path).unwrap();

        let table = SystemProcessTable::new();
        let locking = table.locking_processes(tmp.path()).unwrap();
        assert!(locking.iter().all(|p| p.pid != std::process::id()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_holding_a_file_is_reported_and_terminated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("held.txt");
        std::fs::write(&path, b"x").unwrap();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("exec 3<\"$0\"; sleep 30")
            .arg(&path)
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));

        let table = SystemProcessTable::new();
        let locking = table.locking_processes(tmp.path()).unwrap();
        let held = locking.iter().find(|p| p.pid == child.id());
        assert!(held.is_some(), "expected child in {locking:?}");

        table.terminate(held.unwrap()).unwrap();
        child.wait().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn launcher_runs_program_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        let mut process = StdLauncher
            .launch(
                Path::new("sh"),
                &["-c".to_string(), "touch ran".to_string()],
                tmp.path(),
            )
            .unwrap();
        process.wait().unwrap();
        assert!(process.has_exited().unwrap());
        assert!(tmp.path().join("ran").exists());
    }

    #[test]
    fn launching_missing_program_fails() {
        let tmp = TempDir::new().unwrap();
        let result = StdLauncher.launch(Path::new("/nonexistent/installer.exe"), &[], tmp.path());
        assert!(matches!(result, Err(Error::AutomationFailed { .. })));
    }
}
