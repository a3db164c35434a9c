use std::path::Path;

use tracing::info;

use crate::traits::{LockDecision, LockingProcess, MismatchResolution, Prompt};

/// Answers every question the same way; used for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt {
    pub on_mismatch: MismatchResolution,
    pub on_locks: LockDecision,
}

impl FixedPrompt {
    /// Never installs unverified files; always releases locks.
    pub fn unattended() -> Self {
        Self {
            on_mismatch: MismatchResolution::Abort,
            on_locks: LockDecision::Accept,
        }
    }
}

impl Prompt for FixedPrompt {
    fn resolve_checksum_mismatch(
        &self,
        file_name: &str,
        _expected: &str,
        _actual: &str,
    ) -> MismatchResolution {
        info!(file = file_name, answer = ?self.on_mismatch, "checksum mismatch");
        self.on_mismatch
    }

    fn confirm_lock_release(&self, path: &Path, processes: &[LockingProcess]) -> LockDecision {
        info!(path = %path.display(), count = processes.len(), answer = ?self.on_locks, "lock release");
        self.on_locks
    }

    fn notify_install_skipped(&self, name: &str) {
        info!(package = name, "install skipped");
    }
}
