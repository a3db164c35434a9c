use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{RANGE, USER_AGENT};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use ad_core::Error;

use crate::progress::{ProgressCallback, TransferProgress};
use crate::traits::{TransferRequest, Transport};

/// [`Transport`] backed by reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn request(&self, method: reqwest::Method, request: &TransferRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, &request.url);
        if !request.user_agent.is_empty() {
            builder = builder.header(USER_AGENT, &request.user_agent);
        }
        if let Some(creds) = &request.credentials {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }
        builder
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn network_error(err: reqwest::Error) -> Error {
    Error::NetworkFailure {
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn probe(&self, request: &TransferRequest, timeout: Duration) -> Result<(), Error> {
        let response = self
            .request(reqwest::Method::HEAD, request)
            .timeout(timeout)
            .send()
            .await
            .map_err(network_error)?;

        let status = match response.status() {
            // Some servers refuse HEAD; ask for a single byte instead
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                debug!(url = %request.url, "HEAD refused, probing with ranged GET");
                self.request(reqwest::Method::GET, request)
                    .header(RANGE, "bytes=0-0")
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(network_error)?
                    .status()
            }
            status => status,
        };

        if !status.is_success() {
            return Err(Error::NetworkFailure {
                message: format!("HTTP {} from {}", status, request.url),
            });
        }
        Ok(())
    }

    async fn download(
        &self,
        request: &TransferRequest,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64, Error> {
        let response = self
            .request(reqwest::Method::GET, request)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::NetworkFailure {
                message: format!("HTTP {} from {}", status, request.url),
            });
        }

        let total_bytes = response.content_length();
        if let Some(cb) = &progress {
            cb(TransferProgress::Started {
                url: request.url.clone(),
                total_bytes,
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = partial_path(dest);
        match stream_to_file(response, &part, &request.url, total_bytes, progress.as_ref()).await {
            Ok(downloaded) => {
                tokio::fs::rename(&part, dest).await?;
                debug!(url = %request.url, bytes = downloaded, "transfer finished");
                Ok(downloaded)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

/// Sibling the body is streamed into; renamed over the destination once complete.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    url: &str,
    total_bytes: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> Result<u64, Error> {
    let mut file = tokio::fs::File::create(path).await?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_error)?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(cb) = progress {
            cb(TransferProgress::Progress {
                url: url.to_string(),
                downloaded,
                total_bytes,
            });
        }
    }
    file.flush().await?;
    Ok(downloaded)
}
