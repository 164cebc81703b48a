//! Audit Log
//!
//! Append-only JSONL trail of validation decisions, confirmations and
//! executions. One JSON object per line. Rotated to `<name>.<timestamp>`
//! once the file passes `max_bytes`.

use crate::error::NixieError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Rotate after 10 MB.
pub const MAX_AUDIT_LOG_SIZE: u64 = 10_485_760;

/// Longest request text stored per entry.
const MAX_REQUEST_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryType {
    /// Text or command validation decision
    Validation,
    /// Privileged command confirmation asked
    Confirmation,
    /// Command run (any mode)
    Execution,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Allowed,
    Blocked,
    Declined,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub entry_type: AuditEntryType,
    pub result: AuditResult,
    pub request_id: Option<String>,
    /// Request text, sanitized and truncated
    pub request: Option<String>,
    pub command: Option<String>,
    pub risk: Option<String>,
    pub reason: Option<String>,
    pub details: Option<serde_json::Value>,
    pub user: Option<String>,
}

impl AuditEntry {
    pub fn new(entry_type: AuditEntryType, result: AuditResult) -> Self {
        Self {
            timestamp: Utc::now(),
            entry_type,
            result,
            request_id: None,
            request: None,
            command: None,
            risk: None,
            reason: None,
            details: None,
            user: std::env::var("USER").ok(),
        }
    }

    pub fn with_request_id(mut self, id: &str) -> Self {
        self.request_id = Some(id.to_string());
        self
    }

    pub fn with_request(mut self, text: &str) -> Self {
        self.request = Some(sanitize_for_audit(text));
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    pub fn with_risk(mut self, risk: &str) -> Self {
        self.risk = Some(risk.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// JSONL audit writer. Shared between threads.
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: MAX_AUDIT_LOG_SIZE,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, entry: &AuditEntry) -> Result<(), NixieError> {
        let _guard = self.write_lock.lock().map_err(|_| NixieError::Audit("audit lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed()?;

        let json = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }

    /// Log and swallow failures. Auditing must not block a request.
    pub fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.log(entry) {
            tracing::warn!(path = %self.path.display(), error = %e, "audit write failed");
        }
    }

    /// Most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let entries: Vec<AuditEntry> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let skip = entries.len().saturating_sub(limit);
        entries.into_iter().skip(skip).collect()
    }

    fn rotate_if_needed(&self) -> Result<(), NixieError> {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return Ok(());
        };
        if metadata.len() < self.max_bytes {
            return Ok(());
        }
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let mut archived = self.path.clone().into_os_string();
        archived.push(format!(".{}", timestamp));
        fs::rename(&self.path, PathBuf::from(archived))?;
        Ok(())
    }
}

/// Collapse whitespace, drop control characters, truncate.
pub fn sanitize_for_audit(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.chars().count() > MAX_REQUEST_CHARS {
        let truncated: String = cleaned.chars().take(MAX_REQUEST_CHARS).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entry_builder() {
        let entry = AuditEntry::new(AuditEntryType::Validation, AuditResult::Blocked)
            .with_request_id("req-1")
            .with_request("install firefox; rm -rf /")
            .with_reason("command_chaining")
            .with_risk("high");
        assert_eq!(entry.request_id.as_deref(), Some("req-1"));
        assert_eq!(entry.risk.as_deref(), Some("high"));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"entry_type\":\"validation\""));
        assert!(json.contains("\"result\":\"blocked\""));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_for_audit("install\nvim\t now"), "install vim now");
        let long = "x".repeat(300);
        let out = sanitize_for_audit(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_REQUEST_CHARS + 3);
    }

    #[test]
    fn test_log_and_read_back() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit").join("audit.jsonl"));
        for i in 0..3 {
            log.log(&AuditEntry::new(AuditEntryType::Execution, AuditResult::Success).with_command(&format!("cmd {}", i)))
                .unwrap();
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].command.as_deref(), Some("cmd 2"));
    }

    #[test]
    fn test_rotation() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl")).with_max_bytes(10);
        log.log(&AuditEntry::new(AuditEntryType::Validation, AuditResult::Allowed)).unwrap();
        log.log(&AuditEntry::new(AuditEntryType::Validation, AuditResult::Allowed)).unwrap();
        assert_eq!(log.recent(10).len(), 1);
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let log = AuditLog::new("/nonexistent/nixie/audit.jsonl");
        assert!(log.recent(5).is_empty());
    }
}
