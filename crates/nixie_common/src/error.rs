//! Error types for Nixie.
//!
//! Expected control flow (unrecognized requests, rejected commands, missing
//! tools) is carried by `pipeline::Outcome`. These types cover internal
//! faults only.

use thiserror::Error;

/// Faults in the audit trail.
#[derive(Error, Debug)]
pub enum NixieError {
    #[error("Audit log error: {0}")]
    Audit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("disk store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("could not encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode value for '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NixieError>;
