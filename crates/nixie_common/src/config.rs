//! Nixie Configuration
//!
//! TOML configuration with one table per subsystem. Every field has a
//! default so a missing or partial file is always usable.
//!
//! Search order:
//! 1. `$NIXIE_CONFIG`
//! 2. `$XDG_CONFIG_HOME/nixie/config.toml` (or `~/.config/nixie/config.toml`)
//! 3. `/etc/nixie/config.toml`

use crate::error::ConfigError;
use crate::executor::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System-wide configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/nixie";
const CONFIG_FILE: &str = "config.toml";

/// Environment override for the config file location
pub const CONFIG_ENV: &str = "NIXIE_CONFIG";

// ============================================================================
// Executor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Mode used when the caller does not pick one
    #[serde(default)]
    pub default_mode: ExecutionMode,

    /// Hard timeout for spawned commands (seconds, valid: 1-3600)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Prefix prepended to privileged commands
    #[serde(default = "default_privilege_prefix")]
    pub privilege_prefix: String,

    /// Ask the confirmer before running privileged commands
    #[serde(default = "default_true")]
    pub confirm_privileged: bool,

    /// Captured output limit per stream (bytes)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_privilege_prefix() -> String {
    "sudo".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

impl ExecutorSettings {
    /// Clamp timeout_secs to 1-3600
    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.clamp(1, 3600)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::default(),
            timeout_secs: default_timeout_secs(),
            privilege_prefix: default_privilege_prefix(),
            confirm_privileged: default_true(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Keep a disk tier at all
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Directory holding the disk tier (defaults to the XDG cache dir)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Entries kept in memory before LRU eviction (valid: 16-100000)
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// TTL used when the caller does not give one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL for package search results
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,

    /// TTL for external alias lookups
    #[serde(default = "default_alias_ttl_secs")]
    pub alias_ttl_secs: u64,

    /// Run an expiry sweep every N cache operations
    #[serde(default = "default_sweep_every")]
    pub sweep_every: u64,
}

fn default_memory_capacity() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_search_ttl_secs() -> u64 {
    6 * 3600
}

fn default_alias_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_sweep_every() -> u64 {
    100
}

impl CacheSettings {
    /// Clamp memory_capacity to 16-100000
    pub fn effective_memory_capacity(&self) -> usize {
        self.memory_capacity.clamp(16, 100_000)
    }

    /// Disk tier location, if one is wanted and a directory is known.
    pub fn db_path(&self) -> Option<PathBuf> {
        if !self.persistent {
            return None;
        }
        self.dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("nixie")))
            .map(|d| d.join("cache.db"))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            persistent: default_true(),
            dir: None,
            memory_capacity: default_memory_capacity(),
            default_ttl_secs: default_ttl_secs(),
            search_ttl_secs: default_search_ttl_secs(),
            alias_ttl_secs: default_alias_ttl_secs(),
            sweep_every: default_sweep_every(),
        }
    }
}

// ============================================================================
// Recognizer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerSettings {
    /// Below this the pipeline asks for clarification (valid: 0.0-1.0)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_min_confidence() -> f32 {
    0.5
}

impl RecognizerSettings {
    pub fn effective_min_confidence(&self) -> f32 {
        self.min_confidence.clamp(0.0, 1.0)
    }
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

// ============================================================================
// Log / Audit / Backend
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Write validation and execution decisions to a JSONL file
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit file (defaults to the XDG data dir)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
        }
    }
}

impl AuditSettings {
    pub fn log_path(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("nixie").join("audit.jsonl")))
    }
}

/// Which process backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe the host once at startup
    #[default]
    Auto,
    Subprocess,
    Native,
}

impl BackendChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendChoice::Auto => "auto",
            BackendChoice::Subprocess => "subprocess",
            BackendChoice::Native => "native",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub choice: BackendChoice,

    /// Directory holding the system profile generation links
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("/nix/var/nix/profiles")
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            choice: BackendChoice::default(),
            profiles_dir: default_profiles_dir(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NixieConfig {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub recognizer: RecognizerSettings,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub backend: BackendSettings,
}

impl NixieConfig {
    /// Load from the first config file that exists, defaults otherwise.
    /// A broken file is reported and ignored.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring config file");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// First existing config file in search order.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        if !explicit.is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }
    let system = Some(PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE));
    [user_config_path(), system].into_iter().flatten().find(|p| p.exists())
}

/// Per-user config file location, whether or not it exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nixie").join(CONFIG_FILE))
}
