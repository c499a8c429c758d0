//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_CLONE_DEPTH: i64 = 1;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("repository.root", ".")?
        .set_default("repository.branch", DEFAULT_BRANCH)?
        .set_default("repository.clone_depth", DEFAULT_CLONE_DEPTH)?
        .set_default("repository.author_name", "Gazette Editor")?
        .set_default("repository.author_email", "editor@gazette.invalid")
}
