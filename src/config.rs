//! Configuration System
//!
//! Layered configuration for the repository connection and logging. Git
//! credentials never pass through here; they come from a credential provider
//! at operation time.

use crate::logging::LoggingConfig;
use crate::sync::RemoteSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GazetteConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local working tree and its remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Working tree root; relative paths resolve against the workspace.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// History depth of the initial clone; 0 clones everything.
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,

    /// Proxy URL applied to every remote operation.
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_branch() -> String {
    merge::merge_policy::DEFAULT_BRANCH.to_string()
}

fn default_clone_depth() -> u32 {
    merge::merge_policy::DEFAULT_CLONE_DEPTH as u32
}

fn default_author_name() -> String {
    "Gazette Editor".to_string()
}

fn default_author_email() -> String {
    "editor@gazette.invalid".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            remote_url: None,
            branch: default_branch(),
            clone_depth: default_clone_depth(),
            proxy: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl RepositoryConfig {
    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            root: self.root.clone(),
            remote_url: self.remote_url.clone(),
            branch: self.branch.clone(),
            clone_depth: self.clone_depth,
            proxy: self.proxy.clone(),
        }
    }

    pub fn author(&self) -> crate::sync::Author {
        crate::sync::Author::new(&self.author_name, &self.author_email)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Repository(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Repository(msg) => write!(f, "Repository: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GazetteConfig {
    /// Resolve a relative repository root against `workspace_root`.
    pub fn anchored_at(mut self, workspace_root: &Path) -> Self {
        if self.repository.root.is_relative() {
            self.repository.root = workspace_root.join(&self.repository.root);
        }
        self
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let repo = &self.repository;

        if repo.branch.trim().is_empty() {
            errors.push(ValidationError::Repository("branch cannot be empty".to_string()));
        }
        if let Some(url) = &repo.remote_url {
            if url.trim().is_empty() {
                errors.push(ValidationError::Repository("remote_url cannot be empty".to_string()));
            }
            // Credentials belong to the credential provider, never to the URL.
            let userinfo = url
                .split_once("://")
                .and_then(|(_, rest)| rest.split_once('@'))
                .map(|(userinfo, _)| userinfo);
            if userinfo.is_some_and(|u| u.contains(':')) {
                errors.push(ValidationError::Repository(
                    "remote_url must not embed a password".to_string(),
                ));
            }
        }
        if repo.author_name.trim().is_empty() || repo.author_email.trim().is_empty() {
            errors.push(ValidationError::Repository(
                "author_name and author_email are required".to_string(),
            ));
        }
        if !["json", "text"].contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "invalid format '{}'",
                self.logging.format
            )));
        }
        if !["stdout", "stderr", "file"].contains(&self.logging.output.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "invalid output '{}'",
                self.logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
