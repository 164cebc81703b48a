//! Intent types produced by the recognizer.
//!
//! An `Intent` is immutable once built. `Unknown` is a valid terminal state
//! and always carries confidence 0.0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Entity keys used across the pipeline.
pub mod entity {
    pub const PACKAGE: &str = "package";
    pub const QUERY: &str = "query";
    pub const TOPIC: &str = "topic";
    pub const SERVICE: &str = "service";
    pub const GENERATION: &str = "generation";
    pub const REBUILD_TYPE: &str = "rebuild_type";
    /// Space separated option tokens the operator asked for explicitly
    pub const FLAGS: &str = "flags";
}

/// Closed set of request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Install,
    Remove,
    Search,
    Update,
    Rollback,
    Rebuild,
    Configure,
    Explain,
    Help,
    ListGenerations,
    SwitchGeneration,
    GarbageCollect,
    ListInstalled,
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    ServiceStatus,
    ServiceEnable,
    ServiceDisable,
    ServiceLogs,
    ListServices,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Search => "search",
            Self::Update => "update",
            Self::Rollback => "rollback",
            Self::Rebuild => "rebuild",
            Self::Configure => "configure",
            Self::Explain => "explain",
            Self::Help => "help",
            Self::ListGenerations => "list_generations",
            Self::SwitchGeneration => "switch_generation",
            Self::GarbageCollect => "garbage_collect",
            Self::ListInstalled => "list_installed",
            Self::ServiceStart => "service_start",
            Self::ServiceStop => "service_stop",
            Self::ServiceRestart => "service_restart",
            Self::ServiceStatus => "service_status",
            Self::ServiceEnable => "service_enable",
            Self::ServiceDisable => "service_disable",
            Self::ServiceLogs => "service_logs",
            Self::ListServices => "list_services",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds answered from built-in knowledge rather than a command.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::Help | Self::Explain | Self::Configure)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured interpretation of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: BTreeMap<String, String>,
    pub confidence: f32,
    pub raw_text: String,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f32, raw_text: &str) -> Self {
        Self {
            kind,
            entities: BTreeMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            raw_text: raw_text.to_string(),
        }
    }

    pub fn unknown(raw_text: &str) -> Self {
        Self::new(IntentKind::Unknown, 0.0, raw_text)
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == IntentKind::Unknown
    }

    /// Explicit option tokens, in the order the operator gave them.
    pub fn flags(&self) -> Vec<&str> {
        self.entity(entity::FLAGS)
            .map(|f| f.split_whitespace().collect())
            .unwrap_or_default()
    }
}
