use std::fmt;

/// A resolved download source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub url: String,
    pub expected_hash: String,
    pub user_agent: String,
    /// Set once the transfer engine has tried this source; never reset
    pub attempted: bool,
}

impl SourceCandidate {
    pub fn new(
        url: impl Into<String>,
        expected_hash: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            expected_hash: expected_hash.into(),
            user_agent: user_agent.into(),
            attempted: false,
        }
    }
}

/// Basic-auth pair for a private source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
