//! Releasing file locks held by other processes.
//!
//! Two rounds: the first asks every locking process to close (after
//! confirmation unless forced), the second terminates whatever is still
//! holding the path.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use ad_core::Error;

use crate::traits::{LockDecision, LockingProcess, ProcessTable, Prompt};

/// Process-name suffixes marking the launcher itself; never closed gracefully.
pub const LAUNCHER_SUFFIXES: &[&str] = &["64Portable", "Portable64", "Portable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    Requesting,
    Escalated,
}

pub struct LockBreaker<'a> {
    processes: &'a dyn ProcessTable,
    prompt: &'a dyn Prompt,
    settle_delay: Duration,
}

impl<'a> LockBreaker<'a> {
    pub fn new(processes: &'a dyn ProcessTable, prompt: &'a dyn Prompt) -> Self {
        Self {
            processes,
            prompt,
            settle_delay: Duration::from_millis(400),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Free `path` from other processes' handles.
    ///
    /// Returns `Ok(false)` only when the user declines; nothing is signalled
    /// in that case.
    pub fn break_locks(&self, path: &Path, force: bool) -> Result<bool, Error> {
        if !path.exists() {
            return Ok(true);
        }

        let mut round = Round::Requesting;
        loop {
            let locking = self
                .processes
                .locking_processes(path)
                .map_err(|e| Error::LockRelease {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            if locking.is_empty() {
                return Ok(true);
            }
            debug!(path = %path.display(), count = locking.len(), ?round, "path is locked");

            match round {
                Round::Escalated => {
                    for process in &locking {
                        info!(pid = process.pid, name = %process.name, "terminating locking process");
                        if let Err(e) = self.processes.terminate(process) {
                            warn!(pid = process.pid, error = %e, "failed to terminate process");
                        }
                    }
                    return Ok(true);
                }
                Round::Requesting => {
                    if !force
                        && self.prompt.confirm_lock_release(path, &locking) == LockDecision::Cancel
                    {
                        info!(path = %path.display(), "lock release declined");
                        return Ok(false);
                    }
                    for process in locking.iter().filter(|p| !self.is_protected(p)) {
                        debug!(pid = process.pid, name = %process.name, "closing locking process");
                        if let Err(e) = self.processes.close(process) {
                            warn!(pid = process.pid, error = %e, "failed to close process");
                        }
                    }
                    std::thread::sleep(self.settle_delay);
                    round = Round::Escalated;
                }
            }
        }
    }

    fn is_protected(&self, process: &LockingProcess) -> bool {
        let name = process
            .name
            .strip_suffix(".exe")
            .unwrap_or(&process.name)
            .to_ascii_lowercase();
        LAUNCHER_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(&suffix.to_ascii_lowercase()))
    }
}
