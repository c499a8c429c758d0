//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; the route table turns commands into API requests.

mod credentials;
mod output;
mod parse;
mod presentation;
mod route;

pub use credentials::PromptCredentials;
pub use output::map_error;
pub use parse::{
    AnnexCommands, BlockArg, Cli, Commands, DatasetCommands, IssueCommands, MessageCommands,
    OutputFormat, SyncCommands,
};
pub use route::RunContext;
