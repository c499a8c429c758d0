//! Layered configuration loading.

use super::merge::merge_policy;
use super::sources::global_file;
use super::GazetteConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "GAZETTE";
/// Selects the environment overlay in the workspace `config/` directory.
pub const ENV_NAME: &str = "GAZETTE_ENV";
const DEFAULT_ENV: &str = "development";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Layers, lowest to highest: defaults, global file, workspace files,
    /// `GAZETTE__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<GazetteConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = Self::workspace_files(workspace_root)
            .into_iter()
            .fold(builder, |builder, path| {
                debug!(config_path = %path.display(), "Adding workspace configuration");
                builder.add_source(File::from(path))
            });
        let config: GazetteConfig = builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config.anchored_at(workspace_root))
    }

    /// Load from one explicit file on top of the defaults. Environment overrides still apply;
    /// a relative root resolves against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<GazetteConfig, ConfigError> {
        let config: GazetteConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.anchored_at(base))
    }

    /// `config/config.toml`, then the `config/{GAZETTE_ENV}.toml` overlay; absent files are skipped.
    fn workspace_files(workspace_root: &Path) -> Vec<PathBuf> {
        let dir = workspace_root.join("config");
        let env = std::env::var(ENV_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        [dir.join("config.toml"), dir.join(format!("{}.toml", env))]
            .into_iter()
            .filter(|path| path.is_file())
            .collect()
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
