use std::sync::Arc;

/// Events emitted while a transfer runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    Started {
        url: String,
        total_bytes: Option<u64>,
    },
    Progress {
        url: String,
        downloaded: u64,
        total_bytes: Option<u64>,
    },
    Completed {
        url: String,
        bytes: u64,
    },
    Failed {
        url: String,
        message: String,
    },
}

impl TransferProgress {
    pub fn url(&self) -> &str {
        match self {
            TransferProgress::Started { url, .. }
            | TransferProgress::Progress { url, .. }
            | TransferProgress::Completed { url, .. }
            | TransferProgress::Failed { url, .. } => url,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;
