//! CLI argument parsing for bulksend

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bs")]
#[command(author, version, about = "Resumable bulk message dispatcher", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch messages to every contact in a source file
    Send {
        /// Contact source (JSONL, one contact object per line)
        #[arg(required = true)]
        source: PathBuf,

        /// Delay between messages in milliseconds
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Render messages from this template file
        #[arg(short, long)]
        template_file: Option<PathBuf>,

        /// Revalidate contacts already marked REGISTERED
        #[arg(long)]
        force_revalidate: bool,

        /// Validate and log without delivering anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Normalize a raw phone value and print the result
    Check {
        /// Raw phone value
        #[arg(required = true)]
        number: String,
    },

    /// Manage the opt-out registry
    Optout {
        #[command(subcommand)]
        command: OptoutCommand,
    },

    /// Inspect or reset resume progress for a source
    Progress {
        #[command(subcommand)]
        command: ProgressCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum OptoutCommand {
    /// Add numbers to the registry
    Add {
        /// Raw phone values to opt out
        #[arg(required = true)]
        numbers: Vec<String>,
    },

    /// List all opted-out numbers
    List,
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
    /// Show completed rows for a source
    Show {
        /// Contact source file
        #[arg(required = true)]
        source: PathBuf,
    },

    /// Forget completed rows for a source
    Clear {
        /// Contact source file
        #[arg(required = true)]
        source: PathBuf,
    },
}
