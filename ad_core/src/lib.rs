pub mod candidate;
pub mod checksum;
pub mod config;
pub mod context;
pub mod errors;
pub mod manifest;
pub mod resolve;

pub use candidate::{Credentials, SourceCandidate};
pub use checksum::{HashAlgorithm, Verdict, verify_reader};
pub use config::{KnownHost, PrivateSource, SourcesConfig, UserAgents};
pub use context::{Context, DEFAULT_LOCALE, Limits, Paths};
pub use errors::Error;
pub use manifest::{ManifestFile, PackageSpec, VersionManifest};
pub use resolve::{RedirectPolicy, ResolvedSources, Selection, SourceResolver, short_host};
