//! Download-and-install orchestration for a single package.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ad_core::{
    Context, Error, PackageSpec, RedirectPolicy, Selection, SourceCandidate, SourceResolver,
    SourcesConfig, Verdict,
};

use crate::automation::InstallAutomator;
use crate::extract::{extract_archive, is_archive};
use crate::http::ReqwestTransport;
use crate::locks::LockBreaker;
use crate::package_info;
use crate::process::{StdLauncher, SystemProcessTable};
use crate::progress::ProgressCallback;
use crate::reconcile::DirectoryReconciler;
use crate::traits::{
    InstallerLauncher, MismatchResolution, ProcessTable, Prompt, Transport, WindowAutomation,
};
use crate::transfer::TransferEngine;
use crate::verify::IntegrityVerifier;
use crate::window::platform_automation;

/// The side-effecting collaborators a [`Transferor`] works through.
pub struct Platform {
    pub transport: Arc<dyn Transport>,
    pub processes: Box<dyn ProcessTable>,
    pub windows: Box<dyn WindowAutomation>,
    pub launcher: Box<dyn InstallerLauncher>,
    pub prompt: Box<dyn Prompt>,
}

impl Platform {
    /// Real network, process and window bindings for this host.
    pub fn system(prompt: Box<dyn Prompt>) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            processes: Box::new(SystemProcessTable::new()),
            windows: platform_automation(),
            launcher: Box::new(StdLauncher),
            prompt,
        }
    }
}

/// Fetches and installs one package.
///
/// Sources are resolved once on construction. `start_download` may be called
/// repeatedly to walk through the remaining sources; `start_install` runs
/// only once a download has finished.
pub struct Transferor {
    package: PackageSpec,
    ctx: Context,
    platform: Platform,
    engine: TransferEngine,
    selected_key: Option<String>,
    install_started: bool,
    auto_retry: bool,
}

impl Transferor {
    pub fn new(
        package: PackageSpec,
        config: &SourcesConfig,
        ctx: Context,
        platform: Platform,
    ) -> Self {
        let installed_version = if ctx.update_mode {
            package_info::installed_version(&package.install_dir)
        } else {
            None
        };
        let selection = Selection {
            locale: &ctx.locale,
            installed_version: installed_version.as_deref(),
            update_mode: ctx.update_mode,
        };
        let policy = RedirectPolicy {
            forced: ctx.force_redirect,
            ipv4_available: ctx.ipv4_available,
        };

        let resolved = SourceResolver::new(config, policy).resolve(&package, &selection);
        debug!(
            package = %package.name,
            key = ?resolved.selected_key,
            candidates = resolved.candidates.len(),
            "resolved sources"
        );

        let destination = resolved
            .file_name
            .as_deref()
            .map(|name| ctx.destination_for(name));
        let engine = TransferEngine::new(platform.transport.clone(), resolved.candidates, destination)
            .with_credentials(resolved.credentials)
            .with_fallback_agent(config.user_agents.fallback.clone())
            .with_probe_timeout(ctx.limits.probe_timeout)
            .with_fallback_on_failure(ctx.fallback_on_failure);

        Self {
            package,
            ctx,
            platform,
            engine,
            selected_key: resolved.selected_key,
            install_started: false,
            auto_retry: false,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.engine = self.engine.with_progress(Some(progress));
        self
    }

    pub fn package(&self) -> &PackageSpec {
        &self.package
    }

    /// Manifest key the sources were resolved from.
    pub fn selected_key(&self) -> Option<&str> {
        self.selected_key.as_deref()
    }

    pub fn candidates(&self) -> &[SourceCandidate] {
        self.engine.candidates()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.engine.destination()
    }

    pub fn download_started(&self) -> bool {
        self.engine.download_started()
    }

    pub fn install_started(&self) -> bool {
        self.install_started
    }

    /// Set when the user asked to download again after a checksum mismatch.
    pub fn auto_retry(&self) -> bool {
        self.auto_retry
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    pub async fn start_download(&mut self, force: bool) -> Result<(), Error> {
        self.engine.start_download(force).await
    }

    pub async fn wait(&mut self) -> Result<Option<u64>, Error> {
        self.engine.wait().await
    }

    pub async fn cancel(&mut self) {
        self.engine.cancel().await
    }

    /// Verify and install the finished download.
    ///
    /// Only a transfer that [`wait`](Self::wait) saw succeed is installed.
    /// Returns `Ok(false)` when there is nothing to install yet or the user
    /// stopped the installation.
    pub fn start_install(&mut self) -> Result<bool, Error> {
        if self.engine.is_busy() {
            debug!("transfer still running");
            return Ok(false);
        }
        let Some(dest) = self.engine.destination().map(Path::to_path_buf) else {
            return Ok(false);
        };
        if self.engine.completed().is_none() || !dest.is_file() {
            debug!(path = %dest.display(), "no completed download");
            return Ok(false);
        }

        if !self.verify(&dest)? {
            return Ok(false);
        }

        let prompt = self.platform.prompt.as_ref();
        let locks = LockBreaker::new(self.platform.processes.as_ref(), prompt)
            .with_settle_delay(self.ctx.limits.lock_settle_delay);
        let install_dir = &self.package.install_dir;

        if install_dir.exists() && !locks.break_locks(install_dir, false)? {
            prompt.notify_install_skipped(&self.package.name);
            return Ok(false);
        }

        info!(package = %self.package.name, dest = %install_dir.display(), "installing");

        if is_archive(&dest) {
            extract_archive(&dest, install_dir, self.ctx.paths.archiver.as_deref())?;
        } else {
            let apps_dir = &self.ctx.paths.apps_dir;
            let automator = InstallAutomator::new(
                self.platform.windows.as_ref(),
                self.platform.launcher.as_ref(),
                &self.ctx.limits,
            );
            let report = automator.run(&dest, apps_dir)?;
            info!(outcome = ?report.outcome, clicks = report.clicks, "installer finished");

            DirectoryReconciler::new(&locks, &self.ctx.limits).reconcile(apps_dir, install_dir)?;
        }

        if let Err(e) = std::fs::remove_file(&dest) {
            warn!(path = %dest.display(), error = %e, "could not remove installed download");
        }
        self.install_started = true;
        Ok(true)
    }

    fn verify(&mut self, dest: &Path) -> Result<bool, Error> {
        let report = IntegrityVerifier::new(dest).verify_attempted(self.engine.candidates())?;
        let Verdict::Mismatch { actual } = &report.verdict else {
            return Ok(true);
        };

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        warn!(file = %file_name, expected = %report.expected, %actual, "checksum mismatch");

        match self
            .platform
            .prompt
            .resolve_checksum_mismatch(&file_name, &report.expected, actual)
        {
            MismatchResolution::Ignore => {
                warn!(file = %file_name, "installing unverified download");
                Ok(true)
            }
            MismatchResolution::Retry => {
                self.auto_retry = true;
                Ok(false)
            }
            MismatchResolution::Abort => Ok(false),
        }
    }
}
