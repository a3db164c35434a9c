//! Trait seams for everything the orchestrator does outside the process.
//!
//! Network transfers, window automation, process inspection and user prompts
//! all go through these traits so tests can substitute mocks or scripted
//! fakes for the real platform bindings.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use ad_core::{Credentials, Error};

use crate::progress::ProgressCallback;

// ============================================================================
// Network
// ============================================================================

/// One request against a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    /// Sent only when non-empty
    pub user_agent: String,
    pub credentials: Option<Credentials>,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Check that the source answers with a success status.
    async fn probe(&self, request: &TransferRequest, timeout: Duration) -> Result<(), Error>;

    /// Stream the source into `dest`, returning the number of bytes written.
    async fn download(
        &self,
        request: &TransferRequest,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64, Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn ipv4_available(&self) -> bool;
    async fn ipv6_available(&self) -> bool;
}

/// IPv4 first; IPv6-only connectivity still counts but is logged.
pub async fn is_reachable(connectivity: &dyn Connectivity) -> bool {
    if connectivity.ipv4_available().await {
        return true;
    }
    if connectivity.ipv6_available().await {
        warn!("IPv4 unavailable, continuing over IPv6");
        return true;
    }
    false
}

// ============================================================================
// Windows and installer processes
// ============================================================================

/// Opaque native window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// How a window is hidden while the installer is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizeMode {
    /// Minimize without activating
    MinimizedNoActivate,
    /// Show in its current state without activating
    ShowNoActivate,
}

#[cfg_attr(test, automock)]
pub trait WindowAutomation: Send + Sync {
    /// Title of the process's main window; `None` until it has one.
    fn main_window_title(&self, pid: u32) -> Option<String>;
    fn find_window_by_title(&self, title: &str) -> Option<WindowHandle>;
    fn find_child_control(&self, window: WindowHandle, label: &str) -> Option<WindowHandle>;
    fn send_click(&self, control: WindowHandle) -> Result<(), Error>;
    fn minimize(&self, window: WindowHandle, mode: MinimizeMode) -> Result<(), Error>;
    fn restore(&self, window: WindowHandle) -> Result<(), Error>;
    fn set_foreground(&self, window: WindowHandle) -> Result<(), Error>;
    /// Numeric UI language id (e.g. 1033 for en-US).
    fn ui_language(&self) -> u16;
}

pub trait InstallerProcess: Send {
    fn id(&self) -> u32;
    fn has_exited(&mut self) -> Result<bool, Error>;
    /// Block until the process exits.
    fn wait(&mut self) -> Result<(), Error>;
}

#[cfg_attr(test, automock)]
pub trait InstallerLauncher: Send + Sync {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<Box<dyn InstallerProcess>, Error>;
}

// ============================================================================
// File locks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockingProcess {
    pub pid: u32,
    pub name: String,
}

#[cfg_attr(test, automock)]
pub trait ProcessTable: Send + Sync {
    /// Processes other than the current one holding handles under `path`.
    fn locking_processes(&self, path: &Path) -> Result<Vec<LockingProcess>, Error>;
    /// Ask the process to exit.
    fn close(&self, process: &LockingProcess) -> Result<(), Error>;
    fn terminate(&self, process: &LockingProcess) -> Result<(), Error>;
}

// ============================================================================
// User prompts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchResolution {
    Ignore,
    Retry,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    Accept,
    Cancel,
}

#[cfg_attr(test, automock)]
pub trait Prompt: Send + Sync {
    fn resolve_checksum_mismatch(
        &self,
        file_name: &str,
        expected: &str,
        actual: &str,
    ) -> MismatchResolution;

    fn confirm_lock_release(&self, path: &Path, processes: &[LockingProcess]) -> LockDecision;

    fn notify_install_skipped(&self, name: &str);
}
