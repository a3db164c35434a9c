//! Test utilities for appdrop
//!
//! Shared fixtures for unit and integration tests:
//!
//! - `TestContext` - a temporary root plus a `MockServer` standing in for every mirror
//! - Archive helpers - build zip packages and their digests in memory
//! - Scripted collaborators - prompts and installers that record what happened
//!
//! # Example
//!
//! ```ignore
//! use ad_io::test_utils::{TestContext, sha256_hex, zip_fixture};
//!
//! #[tokio::test]
//! async fn test_install() {
//!     let ctx = TestContext::new().await;
//!     let archive = zip_fixture(&[("readme.txt", b"hello")]);
//!     ctx.mount_file("/app.zip", archive.clone()).await;
//!
//!     let package = ctx.package("Example", "http://a.test/app.zip", &sha256_hex(&archive));
//!     let config = ctx.sources_config(&[ctx.server().uri()]);
//!     // ... build a Transferor and install
//! }
//! ```

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ad_core::{
    Context, Error, HashAlgorithm, KnownHost, ManifestFile, PackageSpec, Paths, SourcesConfig,
};

use crate::traits::{
    InstallerLauncher, InstallerProcess, LockDecision, LockingProcess, MismatchResolution, Prompt,
};

/// Short host every test package URL uses; mirrored onto the mock server.
pub const TEST_HOST: &str = "a.test";

// ============================================================================
// Archive fixtures
// ============================================================================

/// Build a zip archive in memory.
pub fn zip_fixture(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in files {
        zip.start_file(*name, options).expect("failed to start zip entry");
        zip.write_all(data).expect("failed to write zip entry");
    }
    zip.finish().expect("failed to finish zip").into_inner()
}

pub fn sha256_hex(data: &[u8]) -> String {
    HashAlgorithm::Sha256.digest_bytes(data)
}

// ============================================================================
// TestContext
// ============================================================================

/// Temporary root directory and mock mirror server for one test.
pub struct TestContext {
    tmp: TempDir,
    server: MockServer,
}

impl TestContext {
    pub async fn new() -> Self {
        Self {
            tmp: TempDir::new().expect("failed to create temp dir"),
            server: MockServer::start().await,
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn paths(&self) -> Paths {
        Paths::from_root(&self.tmp.path().join("appdrop"))
    }

    /// Context with instant retries and polling.
    pub fn context(&self) -> Context {
        let mut ctx = Context::new(self.paths());
        ctx.limits.poll_interval = std::time::Duration::ZERO;
        ctx.limits.lock_settle_delay = std::time::Duration::ZERO;
        ctx.limits.reconcile_delay = std::time::Duration::ZERO;
        ctx
    }

    pub fn install_dir(&self, name: &str) -> PathBuf {
        self.tmp.path().join("Installed").join(name)
    }

    /// Sources configuration mapping [`TEST_HOST`] onto `mirrors`.
    pub fn sources_config(&self, mirrors: &[String]) -> SourcesConfig {
        SourcesConfig {
            internal_host: "appdrop.test".to_string(),
            redirect_endpoint: format!("{}/redirect?u=", self.server.uri()),
            hosts: vec![KnownHost {
                host: TEST_HOST.to_string(),
                user_agent: String::new(),
                mirrors: mirrors.to_vec(),
            }],
            ..SourcesConfig::default()
        }
    }

    /// A package with a single `en-US` file.
    pub fn package(&self, name: &str, url: &str, hash: &str) -> PackageSpec {
        PackageSpec {
            name: name.to_string(),
            install_dir: self.install_dir(name),
            download: [("en-US", vec![ManifestFile::new(url, hash)])]
                .into_iter()
                .collect(),
            update: None,
            server_key: None,
        }
    }

    /// Serve `body` at `file_path` for both probes and downloads.
    pub async fn mount_file(&self, file_path: &str, body: Vec<u8>) {
        Mock::given(method("HEAD"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Answer every request for `file_path` with 503.
    pub async fn mount_unavailable(&self, file_path: &str) {
        Mock::given(path(file_path))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }

    /// Write `package` as JSON under the root and return its path.
    pub fn write_package(&self, package: &PackageSpec) -> PathBuf {
        let path = self.tmp.path().join(format!("{}.json", package.name));
        let json = serde_json::to_string_pretty(package).expect("failed to serialize package");
        fs::write(&path, json).expect("failed to write package");
        path
    }

    pub fn write_sources(&self, config: &SourcesConfig) -> PathBuf {
        let path = self.tmp.path().join("sources.json");
        let json = serde_json::to_string_pretty(config).expect("failed to serialize sources");
        fs::write(&path, json).expect("failed to write sources");
        path
    }
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Prompt with fixed answers that records every question asked.
#[derive(Clone)]
pub struct RecordingPrompt {
    on_mismatch: MismatchResolution,
    on_locks: LockDecision,
    mismatches: Arc<Mutex<Vec<String>>>,
    lock_requests: Arc<Mutex<Vec<PathBuf>>>,
    skipped: Arc<Mutex<Vec<String>>>,
}

impl RecordingPrompt {
    pub fn new(on_mismatch: MismatchResolution, on_locks: LockDecision) -> Self {
        Self {
            on_mismatch,
            on_locks,
            mismatches: Arc::default(),
            lock_requests: Arc::default(),
            skipped: Arc::default(),
        }
    }

    /// File names a checksum mismatch was reported for.
    pub fn mismatches(&self) -> Vec<String> {
        self.mismatches.lock().unwrap().clone()
    }

    pub fn lock_requests(&self) -> Vec<PathBuf> {
        self.lock_requests.lock().unwrap().clone()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.skipped.lock().unwrap().clone()
    }
}

impl Prompt for RecordingPrompt {
    fn resolve_checksum_mismatch(
        &self,
        file_name: &str,
        _expected: &str,
        _actual: &str,
    ) -> MismatchResolution {
        self.mismatches.lock().unwrap().push(file_name.to_string());
        self.on_mismatch
    }

    fn confirm_lock_release(&self, path: &Path, _processes: &[LockingProcess]) -> LockDecision {
        self.lock_requests.lock().unwrap().push(path.to_path_buf());
        self.on_locks
    }

    fn notify_install_skipped(&self, name: &str) {
        self.skipped.lock().unwrap().push(name.to_string());
    }
}

/// Installer stand-in that writes a fixed file set into its working
/// directory and exits immediately.
#[derive(Clone, Default)]
pub struct UnpackingLauncher {
    files: Vec<(String, Vec<u8>)>,
    launches: Arc<Mutex<u32>>,
}

impl UnpackingLauncher {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
            launches: Arc::default(),
        }
    }

    pub fn launches(&self) -> u32 {
        *self.launches.lock().unwrap()
    }
}

impl InstallerLauncher for UnpackingLauncher {
    fn launch(
        &self,
        _program: &Path,
        _args: &[String],
        working_dir: &Path,
    ) -> Result<Box<dyn InstallerProcess>, Error> {
        *self.launches.lock().unwrap() += 1;
        for (name, data) in &self.files {
            let path = working_dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)?;
        }
        Ok(Box::new(ExitedProcess))
    }
}

struct ExitedProcess;

impl InstallerProcess for ExitedProcess {
    fn id(&self) -> u32 {
        0
    }

    fn has_exited(&mut self) -> Result<bool, Error> {
        Ok(true)
    }

    fn wait(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
