//! Natural-language NixOS administration.
//!
//! A request flows through `IntentRecognizer`, `CommandBuilder`,
//! `SecurityValidator` and `SafeExecutor`; `Pipeline` wires them together.

pub mod aliases;
pub mod audit_log;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod intent;
pub mod knowledge;
pub mod pipeline;
pub mod recognizer;
pub mod security;

pub use cache::{Cache, CacheStats};
pub use command::{Command, CommandBuilder};
pub use config::NixieConfig;
pub use error::{CacheError, ConfigError, NixieError, Result};
pub use executor::{ExecutionMode, ExecutionResult, ExecutionStatus, SafeExecutor};
pub use intent::{Intent, IntentKind};
pub use pipeline::{Context, Outcome, Pipeline, PipelineReport};
pub use recognizer::IntentRecognizer;
pub use security::{RiskLevel, SecurityValidator, ValidatedCommand, ValidationResult};

/// Crate version, shared by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
