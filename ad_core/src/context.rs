//! Per-run paths, limits and flags shared by every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Locale used to pick the current-manifest entry when none is given.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Filesystem locations used during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Directory the single destination file is downloaded into
    pub transfer_dir: PathBuf,
    /// Staging directory native installers are pointed at
    pub apps_dir: PathBuf,
    /// External archiver used for formats without a native extractor (7z, rar)
    pub archiver: Option<PathBuf>,
}

impl Paths {
    pub fn from_root(root: &Path) -> Self {
        Self {
            transfer_dir: root.join("transfer"),
            apps_dir: root.join("apps"),
            archiver: None,
        }
    }
}

/// Timeouts, ceilings and retry caps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub probe_timeout: Duration,
    pub automation_budget: Duration,
    /// Clicks on one button label before it is considered stuck
    pub click_ceiling: u32,
    pub poll_interval: Duration,
    /// Pause between graceful close and the escalation round
    pub lock_settle_delay: Duration,
    pub reconcile_attempts: usize,
    pub reconcile_delay: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(60),
            automation_budget: Duration::from_secs(5 * 60),
            click_ceiling: 10,
            poll_interval: Duration::from_millis(250),
            lock_settle_delay: Duration::from_millis(400),
            reconcile_attempts: 15,
            reconcile_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub paths: Paths,
    pub limits: Limits,
    pub locale: String,
    /// Prefer the update manifest keyed by the installed package version
    pub update_mode: bool,
    pub force_redirect: bool,
    pub ipv4_available: bool,
    /// Wait for each started transfer and fall through to the next source on failure
    pub fallback_on_failure: bool,
}

impl Context {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            limits: Limits::default(),
            locale: DEFAULT_LOCALE.to_string(),
            update_mode: false,
            force_redirect: false,
            ipv4_available: true,
            fallback_on_failure: false,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// The path a download named `file_name` is written to.
    pub fn destination_for(&self, file_name: &str) -> PathBuf {
        self.paths.transfer_dir.join(file_name)
    }
}
