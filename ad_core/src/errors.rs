use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    NetworkFailure {
        message: String,
    },
    SourceUnavailable {
        name: String,
        tried: usize,
    },
    ChecksumMismatch {
        expected: String,
        actual: String,
        file_name: Option<String>,
    },
    DestinationLocked {
        path: PathBuf,
    },
    LockRelease {
        path: PathBuf,
        message: String,
    },
    AutomationFailed {
        message: String,
    },
    ReconcileFailed {
        attempts: usize,
        message: String,
    },
    UnsupportedArchive {
        path: PathBuf,
    },
    MissingArchiver {
        path: Option<PathBuf>,
    },
    InvalidConfig {
        message: String,
    },
    Io {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NetworkFailure { message } => {
                write!(
                    f,
                    "network error: {}\n  hint: check your internet connection and try again",
                    message
                )
            }
            Error::SourceUnavailable { name, tried } => {
                write!(
                    f,
                    "no reachable download source for '{}' ({} tried)",
                    name, tried
                )?;
                write!(
                    f,
                    "\n  hint: the mirrors may be down; try again later or use --force-redirect"
                )
            }
            Error::ChecksumMismatch {
                expected,
                actual,
                file_name,
            } => {
                write!(f, "checksum verification failed")?;
                if let Some(name) = file_name {
                    write!(f, " for '{}'", name)?;
                }
                write!(f, "\n  expected: {}\n  got:      {}", expected, actual)?;
                write!(
                    f,
                    "\n  hint: this may indicate a corrupted download or mirror issue; try again"
                )
            }
            Error::DestinationLocked { path } => {
                write!(
                    f,
                    "cannot remove previous download '{}'\n  hint: another program is holding the file; close it and try again",
                    path.display()
                )
            }
            Error::LockRelease { path, message } => {
                write!(
                    f,
                    "failed to release locks on '{}': {}",
                    path.display(),
                    message
                )
            }
            Error::AutomationFailed { message } => {
                write!(f, "installer automation failed: {}", message)
            }
            Error::ReconcileFailed { attempts, message } => {
                write!(
                    f,
                    "failed to move installed files into place after {} attempts: {}",
                    attempts, message
                )?;
                write!(
                    f,
                    "\n  hint: an antivirus scanner or open program may be holding the files"
                )
            }
            Error::UnsupportedArchive { path } => {
                write!(
                    f,
                    "unsupported archive format: '{}'",
                    path.display()
                )
            }
            Error::MissingArchiver { path } => {
                write!(f, "archive extraction requires an external archiver")?;
                if let Some(path) = path {
                    write!(f, " (not found at '{}')", path.display())?;
                }
                write!(
                    f,
                    "\n  hint: install 7-Zip or set \"archiver\" in the configuration"
                )
            }
            Error::InvalidConfig { message } => {
                write!(f, "invalid configuration: {}", message)
            }
            Error::Io { message } => write!(f, "i/o error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}
