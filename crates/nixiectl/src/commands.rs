//! Subcommand handlers.

use crate::cli::{request_text, CacheAction};
use crate::confirm::PromptConfirmer;
use crate::output;
use anyhow::{Context as _, Result};
use nixie_common::config::{config_path, user_config_path};
use nixie_common::executor::ApproveAll;
use nixie_common::{Cache, Context, ExecutionMode, NixieConfig, Pipeline};
use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

fn build_pipeline(config: NixieConfig, yes: bool) -> Pipeline {
    let pipeline = Pipeline::new(Context::from_config(config));
    if yes {
        pipeline.with_confirmer(Arc::new(ApproveAll))
    } else {
        pipeline.with_confirmer(Arc::new(PromptConfirmer::stdin()))
    }
}

/// Handle one request. Returns the process exit code.
pub fn ask(config: NixieConfig, text: &[String], mode: Option<ExecutionMode>, yes: bool, json: bool) -> Result<i32> {
    let pipeline = build_pipeline(config, yes);
    let mode = mode.unwrap_or_else(|| pipeline.default_mode());
    let report = pipeline.process(&request_text(text), mode);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::render(&report));
    }
    Ok(output::exit_code(&report))
}

/// Read-eval loop on stdin. `:mode <m>` switches mode, `exit` leaves.
pub fn repl(config: NixieConfig, mode: Option<ExecutionMode>) -> Result<()> {
    let pipeline = build_pipeline(config, false);
    let mut mode = mode.unwrap_or_else(|| pipeline.default_mode());

    println!("nixie {} ({} mode). Type 'help', ':mode <explain|dry-run|execute>' or 'exit'.", nixie_common::VERSION, mode);
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{} ", format!("nixie[{}]>", mode).cyan());
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" | ":q" => return Ok(()),
            _ => {}
        }
        if let Some(arg) = input.strip_prefix(":mode") {
            match arg.trim().parse::<ExecutionMode>() {
                Ok(m) => {
                    mode = m;
                    println!("mode: {}", mode);
                }
                Err(e) => println!("{}", e.red()),
            }
            continue;
        }

        let report = pipeline.process(input, mode);
        print!("{}", output::render(&report));
    }
}

pub fn cache(config: &NixieConfig, action: CacheAction) -> Result<()> {
    let cache = Cache::from_settings(&config.cache);
    match action {
        CacheAction::Stats => print!("{}", output::render_cache_stats(&cache.stats())),
        CacheAction::Sweep => {
            let removed = cache.sweep().context("cache sweep failed")?;
            println!("[OK] removed {} expired entries", removed);
        }
        CacheAction::Clear => {
            cache.clear().context("cache clear failed")?;
            println!("[OK] cache cleared");
        }
    }
    Ok(())
}

pub fn config(config: &NixieConfig, path_only: bool, init: bool) -> Result<()> {
    if init {
        let path = user_config_path().context("no user config directory")?;
        if path.exists() {
            println!("{} already exists", path.display());
        } else {
            NixieConfig::default().save_to(&path)?;
            println!("[OK] wrote {}", path.display());
        }
        return Ok(());
    }

    let active = config_path();
    if path_only {
        match active {
            Some(path) => println!("{}", path.display()),
            None => println!("(none, using defaults)"),
        }
        return Ok(());
    }

    match &active {
        Some(path) => println!("{}", format!("# {}", path.display()).dimmed()),
        None => println!("{}", "# no config file, showing defaults".dimmed()),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
