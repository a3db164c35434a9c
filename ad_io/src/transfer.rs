//! Probing and downloading from an ordered list of sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ad_core::{Credentials, Error, SourceCandidate};

use crate::progress::{ProgressCallback, TransferProgress};
use crate::traits::{TransferRequest, Transport};

/// Walks the candidate list, committing to the first source that answers.
///
/// Each candidate is tried at most once per engine. A probe uses the
/// candidate's own user agent first and then, once, the fallback agent.
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
    candidates: Vec<SourceCandidate>,
    destination: Option<PathBuf>,
    credentials: Option<Credentials>,
    fallback_agent: String,
    probe_timeout: Duration,
    fallback_on_failure: bool,
    progress: Option<ProgressCallback>,
    in_flight: Option<JoinHandle<Result<u64, Error>>>,
    active_url: Option<String>,
    download_started: bool,
    completed: Option<u64>,
}

impl TransferEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        candidates: Vec<SourceCandidate>,
        destination: Option<PathBuf>,
    ) -> Self {
        Self {
            transport,
            candidates,
            destination,
            credentials: None,
            fallback_agent: String::new(),
            probe_timeout: Duration::from_secs(60),
            fallback_on_failure: false,
            progress: None,
            in_flight: None,
            active_url: None,
            download_started: false,
            completed: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_fallback_agent(mut self, agent: impl Into<String>) -> Self {
        self.fallback_agent = agent.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Await each transfer and move on to the next source when it fails.
    pub fn with_fallback_on_failure(mut self, enabled: bool) -> Self {
        self.fallback_on_failure = enabled;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn candidates(&self) -> &[SourceCandidate] {
        &self.candidates
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// URL of the most recently started transfer.
    pub fn active_url(&self) -> Option<&str> {
        self.active_url.as_deref()
    }

    pub fn download_started(&self) -> bool {
        self.download_started
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Size of the download sitting at the destination, once [`wait`] has
    /// seen its transfer succeed.
    ///
    /// [`wait`]: Self::wait
    pub fn completed(&self) -> Option<u64> {
        self.completed
    }

    /// Start transferring from the next untried source.
    ///
    /// A running transfer is left alone unless `force` is set, in which
    /// case it is cancelled first. Fails only when the previous download
    /// cannot be removed.
    pub async fn start_download(&mut self, force: bool) -> Result<(), Error> {
        if self.is_busy() {
            if !force {
                debug!("transfer already in progress");
                return Ok(());
            }
            self.cancel().await;
        }
        self.download_started = false;

        let Some(dest) = self.destination.clone() else {
            debug!("no destination resolved, nothing to download");
            return Ok(());
        };

        for index in 0..self.candidates.len() {
            if self.candidates[index].attempted {
                continue;
            }

            remove_destination(&dest)?;
            self.completed = None;
            self.candidates[index].attempted = true;

            let candidate = self.candidates[index].clone();
            let Some(request) = self.probe(&candidate).await else {
                continue;
            };

            self.spawn(request, dest.clone());
            self.download_started = true;

            if !self.fallback_on_failure {
                return Ok(());
            }
            match self.wait().await {
                Ok(_) => return Ok(()),
                Err(e) => warn!(url = %candidate.url, error = %e, "transfer failed, trying next source"),
            }
        }

        Ok(())
    }

    /// Wait for the running transfer.
    ///
    /// Yields the size of the last transfer that completed, `None` when no
    /// transfer has completed since the last one was started.
    pub async fn wait(&mut self) -> Result<Option<u64>, Error> {
        let Some(handle) = self.in_flight.take() else {
            return Ok(self.completed);
        };
        match handle.await {
            Ok(result) => {
                let bytes = result?;
                self.completed = Some(bytes);
                Ok(self.completed)
            }
            Err(e) => Err(Error::NetworkFailure {
                message: format!("transfer task did not complete: {e}"),
            }),
        }
    }

    pub async fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
            let _ = handle.await;
            self.completed = None;
            debug!("cancelled in-flight transfer");
        }
    }

    async fn probe(&self, candidate: &SourceCandidate) -> Option<TransferRequest> {
        let request = TransferRequest::new(&candidate.url, &candidate.user_agent)
            .with_credentials(self.credentials.clone());

        match self.transport.probe(&request, self.probe_timeout).await {
            Ok(()) => return Some(request),
            Err(e) => debug!(url = %candidate.url, error = %e, "probe failed with native agent"),
        }

        let request = TransferRequest {
            user_agent: self.fallback_agent.clone(),
            ..request
        };
        match self.transport.probe(&request, self.probe_timeout).await {
            Ok(()) => Some(request),
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "source unavailable");
                None
            }
        }
    }

    fn spawn(&mut self, request: TransferRequest, dest: PathBuf) {
        info!(url = %request.url, dest = %dest.display(), "starting transfer");
        let transport = self.transport.clone();
        let progress = self.progress.clone();
        self.active_url = Some(request.url.clone());
        self.completed = None;

        self.in_flight = Some(tokio::spawn(async move {
            let result = transport.download(&request, &dest, progress.clone()).await;
            if result.is_err() {
                // never leave a partial file where an install would pick it up
                let _ = std::fs::remove_file(&dest);
            }
            if let Some(cb) = &progress {
                cb(match &result {
                    Ok(bytes) => TransferProgress::Completed {
                        url: request.url.clone(),
                        bytes: *bytes,
                    },
                    Err(e) => TransferProgress::Failed {
                        url: request.url.clone(),
                        message: e.to_string(),
                    },
                });
            }
            result
        }));
    }
}

fn remove_destination(dest: &Path) -> Result<(), Error> {
    match std::fs::remove_file(dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %dest.display(), error = %e, "cannot remove previous download");
            Err(Error::DestinationLocked {
                path: dest.to_path_buf(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockTransport;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn candidate(url: &str) -> SourceCandidate {
        SourceCandidate::new(url, "", "native")
    }

    fn write_payload(dest: &Path) -> Result<u64, Error> {
        std::fs::write(dest, b"payload")?;
        Ok(7)
    }

    #[tokio::test]
    async fn falls_back_to_browser_agent_then_next_source() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("app.zip");

        let mut transport = MockTransport::new();
        let probes = Arc::new(Mutex::new(Vec::new()));
        let seen = probes.clone();
        transport.expect_probe().returning(move |req, _| {
            seen.lock()
                .unwrap()
                .push((req.url.clone(), req.user_agent.clone()));
            if req.url.contains("second") {
                Ok(())
            } else {
                Err(Error::NetworkFailure {
                    message: "refused".into(),
                })
            }
        });
        transport
            .expect_download()
            .withf(|req, _, _| req.url == "http://second.test/app.zip")
            .times(1)
            .returning(|_, dest, _| write_payload(dest));

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![
                candidate("http://first.test/app.zip"),
                candidate("http://second.test/app.zip"),
            ],
            Some(dest.clone()),
        )
        .with_fallback_agent("browser");

        engine.start_download(false).await.unwrap();
        assert_eq!(engine.wait().await.unwrap(), Some(7));

        assert_eq!(
            *probes.lock().unwrap(),
            vec![
                ("http://first.test/app.zip".to_string(), "native".to_string()),
                ("http://first.test/app.zip".to_string(), "browser".to_string()),
                ("http://second.test/app.zip".to_string(), "native".to_string()),
            ]
        );
        assert!(engine.download_started());
        assert_eq!(engine.active_url(), Some("http://second.test/app.zip"));
        assert!(engine.candidates().iter().all(|c| c.attempted));
    }

    #[tokio::test]
    async fn exhausted_candidates_make_start_a_noop() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("app.zip");

        let mut transport = MockTransport::new();
        transport.expect_probe().times(1).returning(|_, _| Ok(()));
        transport
            .expect_download()
            .times(1)
            .returning(|_, dest, _| write_payload(dest));

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![candidate("http://a.test/app.zip")],
            Some(dest.clone()),
        );

        engine.start_download(false).await.unwrap();
        engine.wait().await.unwrap();
        assert!(dest.exists());

        // second call must neither probe again nor delete the finished file
        engine.start_download(false).await.unwrap();
        assert!(dest.exists());
        assert_eq!(engine.wait().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn undeletable_destination_aborts() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("app.zip");
        std::fs::create_dir(&dest).unwrap();

        let mut transport = MockTransport::new();
        transport.expect_probe().never();

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![candidate("http://a.test/app.zip")],
            Some(dest.clone()),
        );

        let err = engine.start_download(false).await.unwrap_err();
        assert!(matches!(err, Error::DestinationLocked { .. }));
        assert!(!engine.candidates()[0].attempted);
    }

    #[tokio::test]
    async fn no_reachable_source_starts_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut transport = MockTransport::new();
        transport.expect_probe().returning(|_, _| {
            Err(Error::NetworkFailure {
                message: "down".into(),
            })
        });
        transport.expect_download().never();

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![candidate("http://a.test/x.zip"), candidate("http://b.test/x.zip")],
            Some(tmp.path().join("x.zip")),
        );

        engine.start_download(false).await.unwrap();
        assert!(!engine.download_started());
        assert_eq!(engine.wait().await.unwrap(), None);
    }

    #[tokio::test]
    async fn fallback_on_failure_moves_to_next_source() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("app.zip");

        let mut transport = MockTransport::new();
        transport.expect_probe().returning(|_, _| Ok(()));
        transport.expect_download().returning(|req, dest, _| {
            if req.url.contains("broken") {
                Err(Error::NetworkFailure {
                    message: "connection reset".into(),
                })
            } else {
                write_payload(dest)
            }
        });

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![
                candidate("http://broken.test/app.zip"),
                candidate("http://good.test/app.zip"),
            ],
            Some(dest.clone()),
        )
        .with_fallback_on_failure(true);

        engine.start_download(false).await.unwrap();
        assert_eq!(engine.active_url(), Some("http://good.test/app.zip"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert_eq!(engine.wait().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn failed_transfer_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Example.paf.exe");

        let mut transport = MockTransport::new();
        transport.expect_probe().returning(|_, _| Ok(()));
        transport.expect_download().times(1).returning(|_, dest, _| {
            std::fs::write(dest, b"MZ half an installer")?;
            Err(Error::NetworkFailure {
                message: "connection reset".into(),
            })
        });

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![candidate("http://a.test/Example.paf.exe")],
            Some(dest.clone()),
        );

        engine.start_download(false).await.unwrap();
        assert!(engine.wait().await.is_err());
        assert!(!dest.exists());
        assert_eq!(engine.completed(), None);
        assert_eq!(engine.wait().await.unwrap(), None);
    }

    #[tokio::test]
    async fn restart_after_completion_forgets_previous_size() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("x.zip");

        let mut transport = MockTransport::new();
        transport.expect_probe().returning(|_, _| Ok(()));
        transport
            .expect_download()
            .withf(|req, _, _| req.url == "http://a.test/x.zip")
            .times(1)
            .returning(|_, dest, _| write_payload(dest));
        transport
            .expect_download()
            .withf(|req, _, _| req.url == "http://b.test/x.zip")
            .returning(|_, _, _| {
                Err(Error::NetworkFailure {
                    message: "stalled".into(),
                })
            });

        let mut engine = TransferEngine::new(
            Arc::new(transport),
            vec![candidate("http://a.test/x.zip"), candidate("http://b.test/x.zip")],
            Some(dest.clone()),
        );

        engine.start_download(false).await.unwrap();
        assert_eq!(engine.wait().await.unwrap(), Some(7));
        assert_eq!(engine.completed(), Some(7));

        engine.start_download(true).await.unwrap();
        assert_eq!(engine.completed(), None);
        engine.cancel().await;

        assert_eq!(engine.wait().await.unwrap(), None);
        assert!(!dest.exists());
    }

    /// Transport whose downloads never finish on their own.
    struct StallingTransport {
        downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for StallingTransport {
        async fn probe(&self, _: &TransferRequest, _: Duration) -> Result<(), Error> {
            Ok(())
        }

        async fn download(
            &self,
            request: &TransferRequest,
            _: &Path,
            _: Option<ProgressCallback>,
        ) -> Result<u64, Error> {
            self.downloads.lock().unwrap().push(request.url.clone());
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn busy_engine_ignores_unforced_start_and_restarts_when_forced() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(StallingTransport {
            downloads: Mutex::new(Vec::new()),
        });

        let mut engine = TransferEngine::new(
            transport.clone(),
            vec![candidate("http://a.test/x.zip"), candidate("http://b.test/x.zip")],
            Some(tmp.path().join("x.zip")),
        );

        engine.start_download(false).await.unwrap();
        tokio::task::yield_now().await;
        assert!(engine.is_busy());
        assert!(engine.download_started());

        engine.start_download(false).await.unwrap();
        assert_eq!(engine.active_url(), Some("http://a.test/x.zip"));
        assert!(engine.download_started());

        engine.start_download(true).await.unwrap();
        assert_eq!(engine.active_url(), Some("http://b.test/x.zip"));

        engine.cancel().await;
        assert!(!engine.is_busy());
    }
}
