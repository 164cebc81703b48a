//! nixiectl - plain-language NixOS administration from the terminal.

use anyhow::Result;
use clap::Parser;
use nixie_common::NixieConfig;
use nixiectl::cli::{Cli, Commands};
use nixiectl::{commands, logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NixieConfig::load();
    logging::init(&config.log.level);
    tracing::debug!(version = nixie_common::VERSION, "nixiectl starting");

    match cli.command {
        Commands::Ask { text, mode, yes, json } => {
            let code = commands::ask(config, &text, mode, yes, json)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Repl { mode } => commands::repl(config, mode),
        Commands::Cache { action } => commands::cache(&config, action),
        Commands::Config { path, init } => commands::config(&config, path, init),
    }
}
