//! Mirror and private-source directory.
//!
//! Loaded from a JSON document such as:
//!
//! ```json
//! {
//!   "internal_host": "appdrop.example",
//!   "redirect_endpoint": "https://appdrop.example/redirect?url=",
//!   "hosts": [
//!     { "host": "sourceforge.net", "mirrors": ["https://netix.dl.sourceforge.net"] }
//!   ],
//!   "private_sources": [
//!     { "host_prefix": "https://files.example", "key": "abc", "username": "u", "password": "p" }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Error;

/// User agents sent while probing and downloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgents {
    /// Sent to the internal host and through the redirect endpoint
    pub internal: String,
    /// Sent to direct and private sources
    pub default: String,
    /// Browser agent tried once when a probe with the native agent fails
    pub fallback: String,
}

impl Default for UserAgents {
    fn default() -> Self {
        Self {
            internal: "appdrop/0.1".to_string(),
            default: "Wget/1.21.4".to_string(),
            fallback: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// A public distribution host with alternate mirrors serving identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHost {
    /// Short host (last two labels), e.g. `sourceforge.net`
    pub host: String,
    #[serde(default)]
    pub user_agent: String,
    /// Mirror roots in preference order, e.g. `https://netix.dl.sourceforge.net`
    pub mirrors: Vec<String>,
}

/// A credential-protected download server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateSource {
    pub host_prefix: String,
    /// Matched against the package's `server_key`
    pub key: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Short host of the project's own server; never redirected
    #[serde(default)]
    pub internal_host: String,
    /// Prefix the encoded original URL is appended to when redirecting
    #[serde(default)]
    pub redirect_endpoint: String,
    #[serde(default)]
    pub user_agents: UserAgents,
    #[serde(default)]
    pub hosts: Vec<KnownHost>,
    #[serde(default)]
    pub private_sources: Vec<PrivateSource>,
}

impl SourcesConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: SourcesConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig {
                message: format!("failed to parse sources configuration: {e}"),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), Error> {
        for host in &self.hosts {
            if host.host.trim().is_empty() {
                return Err(Error::InvalidConfig {
                    message: "known host with an empty name".to_string(),
                });
            }
            if host.mirrors.is_empty() {
                return Err(Error::InvalidConfig {
                    message: format!("known host '{}' has no mirrors", host.host),
                });
            }
        }
        Ok(())
    }

    /// Look up a known host by short host name (case-insensitive).
    pub fn known_host(&self, short_host: &str) -> Option<&KnownHost> {
        if short_host.is_empty() {
            return None;
        }
        self.hosts
            .iter()
            .find(|h| h.host.eq_ignore_ascii_case(short_host))
    }

    pub fn private_source(&self, key: &str) -> Option<&PrivateSource> {
        self.private_sources.iter().find(|s| s.key == key)
    }

    pub fn is_internal(&self, short_host: &str) -> bool {
        !self.internal_host.is_empty() && self.internal_host.eq_ignore_ascii_case(short_host)
    }
}
