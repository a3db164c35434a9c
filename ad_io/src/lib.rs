pub mod automation;
pub mod connectivity;
pub mod extract;
pub mod http;
pub mod locks;
pub mod package_info;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod traits;
pub mod transfer;
pub mod transferor;
pub mod verify;
pub mod window;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use automation::{AutomationOutcome, AutomationReport, InstallAutomator};
pub use connectivity::{StaticConnectivity, TcpConnectivity};
pub use extract::{ArchiveKind, extract_archive};
pub use http::ReqwestTransport;
pub use locks::{LockBreaker, Round};
pub use process::{StdLauncher, SystemProcessTable};
pub use progress::{ProgressCallback, TransferProgress};
pub use prompt::FixedPrompt;
pub use reconcile::DirectoryReconciler;
pub use traits::{
    Connectivity, LockDecision, LockingProcess, MismatchResolution, Prompt, TransferRequest,
    Transport, is_reachable,
};
pub use transfer::TransferEngine;
pub use transferor::{Platform, Transferor};
pub use verify::{IntegrityReport, IntegrityVerifier};
