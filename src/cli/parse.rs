//! CLI parse: clap types for Gazette. No behavior; definitions only.

use crate::model::issue::MessageBlock;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Gazette CLI - versioned issue history with annexes and amendments
#[derive(Parser)]
#[command(name = "gazette")]
#[command(about = "Edit and synchronize a versioned gazette repository")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short = 'q', default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Prompt for git credentials when the environment does not provide them
    #[arg(long, default_value = "false")]
    pub ask_credentials: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlockArg {
    General,
    Amendment,
}

impl From<BlockArg> for MessageBlock {
    fn from(block: BlockArg) -> Self {
        match block {
            BlockArg::General => MessageBlock::General,
            BlockArg::Amendment => MessageBlock::Amendment,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Schedule, list and inspect issues
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },
    /// Edit issue messages
    Message {
        #[command(subcommand)]
        command: MessageCommands,
    },
    /// Annex positions and running annexes
    Annex {
        #[command(subcommand)]
        command: AnnexCommands,
    },
    /// Annexed datasets and their amendments
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },
    /// Synchronize the working tree with the remote
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum IssueCommands {
    /// Create an empty issue
    Schedule {
        id: u64,
        #[arg(long)]
        publication_date: NaiveDate,
        #[arg(long)]
        cutoff_date: NaiveDate,
    },
    /// List scheduled issues
    List {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print one issue as JSON
    Show { id: u64 },
}

#[derive(Subcommand)]
pub enum MessageCommands {
    /// Add a message given as a JSON object
    Add {
        issue: u64,
        #[arg(long, value_enum, default_value = "general")]
        block: BlockArg,
        /// Message record, e.g. '{"type":"notice","text":"..."}'
        #[arg(long)]
        json: String,
        /// Insert position; appends when omitted
        #[arg(long)]
        index: Option<usize>,
    },
    /// Delete the message at an index
    Delete {
        issue: u64,
        #[arg(long, value_enum, default_value = "general")]
        block: BlockArg,
        index: usize,
    },
}

#[derive(Subcommand)]
pub enum AnnexCommands {
    /// Annex a publication at an issue
    Set {
        issue: u64,
        publication: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Null out an annex entry
    Clear { issue: u64, publication: String },
    /// Show publications annexed before an issue
    Running {
        target: u64,
        #[arg(long)]
        publication: Option<String>,
        /// Reload the issue index from disk first
        #[arg(long)]
        reload: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
pub enum DatasetCommands {
    /// Print the amendment change lists for a publication's datasets
    Changes {
        publication: String,
        target: u64,
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long)]
        reload: bool,
    },
    /// Print a dataset snapshot with amendments applied
    Materialize {
        publication: String,
        target: u64,
        dataset: String,
        #[arg(long)]
        reload: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Clone the repository or fast-forward it
    Init,
    /// Show sync state
    Status,
    /// List changed files
    Changes,
    /// Commit all changes and push
    Commit {
        #[arg(long, short = 'm')]
        message: String,
    },
    /// Check that the remote accepts the configured credentials
    Probe,
}
