//! Credential providers for remote operations.
//!
//! Credentials are fetched once per operation and handed to the transport
//! callbacks in memory. They are never written to the repository config or
//! embedded in the remote URL.

use crate::error::SyncError;
use async_trait::async_trait;
use std::fmt;

pub const ENV_USERNAME: &str = "GAZETTE_GIT_USERNAME";
pub const ENV_PASSWORD: &str = "GAZETTE_GIT_PASSWORD";

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

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials for a remote URL.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Credentials for `remote_url`, or `None` to attempt the operation anonymously.
    async fn credentials(&self, remote_url: &str) -> Result<Option<Credentials>, SyncError>;

    fn provider_name(&self) -> &str;
}

/// Fixed credentials supplied by the caller.
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _remote_url: &str) -> Result<Option<Credentials>, SyncError> {
        Ok(Some(self.0.clone()))
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

/// Reads `GAZETTE_GIT_USERNAME` / `GAZETTE_GIT_PASSWORD` at call time.
#[derive(Default)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credentials(&self, _remote_url: &str) -> Result<Option<Credentials>, SyncError> {
        match (std::env::var(ENV_USERNAME), std::env::var(ENV_PASSWORD)) {
            (Ok(username), Ok(password)) => Ok(Some(Credentials::new(username, password))),
            _ => Ok(None),
        }
    }

    fn provider_name(&self) -> &str {
        "environment"
    }
}

/// Anonymous access.
#[derive(Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn credentials(&self, _remote_url: &str) -> Result<Option<Credentials>, SyncError> {
        Ok(None)
    }

    fn provider_name(&self) -> &str {
        "none"
    }
}
