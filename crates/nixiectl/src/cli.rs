//! Command line definition.

use clap::{Parser, Subcommand};
use nixie_common::ExecutionMode;

#[derive(Debug, Parser)]
#[command(name = "nixiectl")]
#[command(about = "Nixie - plain-language NixOS administration", long_about = None)]
#[command(version = nixie_common::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Handle one request, e.g. `nixiectl ask install firefox`
    Ask {
        /// The request, in plain words
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// explain, dry-run or execute (default from config)
        #[arg(long, short)]
        mode: Option<ExecutionMode>,

        /// Approve privileged commands without asking
        #[arg(long, short)]
        yes: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session
    Repl {
        /// Starting mode (default from config)
        #[arg(long, short)]
        mode: Option<ExecutionMode>,
    },

    /// Inspect or maintain the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show the effective configuration
    Config {
        /// Print only the config file location
        #[arg(long)]
        path: bool,

        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum CacheAction {
    /// Hit rate and entry counts
    Stats,
    /// Drop expired entries
    Sweep,
    /// Drop everything
    Clear,
}

/// The request words joined back into one string.
pub fn request_text(text: &[String]) -> String {
    text.join(" ")
}
