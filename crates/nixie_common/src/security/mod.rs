//! Security validation.
//!
//! Two layers, both must pass:
//! 1. `validate_text`: denylist over the raw request.
//! 2. `validate_command`: per-program allow-list over the built command.
//!
//! Risk levels:
//! - Low: read-only, or installing into the user profile
//! - Medium: system-mutating but reversible (rebuild, rollback, services, gc)
//! - High: needs a manual override; always invalid
//!
//! Only `SecurityValidator::approve` produces a `ValidatedCommand`, the one
//! type the executor will run.

pub mod allowlist;
pub mod patterns;
pub mod suggestions;

use crate::audit_log::{sanitize_for_audit, AuditEntry, AuditEntryType, AuditLog, AuditResult};
use crate::command::Command;
use patterns::{DenyPattern, MAX_TEXT_CHARS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use allowlist::{validate_name, Refusal};
pub use suggestions::suggestion_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one validation layer. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
    pub risk: RiskLevel,
    /// Always carries `code` on rejection
    pub metadata: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn ok(risk: RiskLevel) -> Self {
        Self {
            valid: true,
            reason: None,
            risk,
            metadata: BTreeMap::new(),
        }
    }

    pub fn reject(code: &str, reason: impl Into<String>, risk: RiskLevel) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("code".to_string(), code.to_string());
        Self {
            valid: false,
            reason: Some(reason.into()),
            risk,
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Machine-readable rejection code.
    pub fn code(&self) -> Option<&str> {
        self.metadata.get("code").map(String::as_str)
    }

    /// Advisory alternative for a rejection.
    pub fn suggestion(&self) -> Option<&'static str> {
        if self.valid {
            return None;
        }
        self.code().and_then(suggestion_for)
    }
}

/// A command that passed both validation layers. Fields are private so the
/// only way to obtain one is `SecurityValidator::approve`.
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    command: Command,
    validation: ValidationResult,
}

impl ValidatedCommand {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }

    pub fn risk(&self) -> RiskLevel {
        self.validation.risk
    }
}

pub struct SecurityValidator {
    denylist: Vec<DenyPattern>,
    audit: Option<Arc<AuditLog>>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityValidator {
    pub fn new() -> Self {
        Self {
            denylist: patterns::compile(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Denylist check over the raw request text.
    pub fn validate_text(&self, text: &str) -> ValidationResult {
        let chars = text.chars().count();
        let result = if chars > MAX_TEXT_CHARS {
            ValidationResult::reject(
                "too_long",
                format!("request of {} characters exceeds the {} character limit", chars, MAX_TEXT_CHARS),
                RiskLevel::High,
            )
        } else if let Some(hit) = patterns::first_match(&self.denylist, text) {
            ValidationResult::reject(
                hit.code,
                format!("dangerous pattern detected: {}", hit.label),
                RiskLevel::High,
            )
        } else {
            ValidationResult::ok(RiskLevel::Low)
        };

        if result.valid {
            tracing::debug!(layer = "text", "validation passed");
        } else {
            tracing::warn!(
                layer = "text",
                text = %sanitize_for_audit(text),
                risk = %result.risk,
                code = result.code().unwrap_or("unknown"),
                reason = result.reason.as_deref().unwrap_or(""),
                "validation rejected"
            );
        }
        result
    }

    /// Allow-list check over a built command.
    pub fn validate_command(&self, cmd: &Command) -> ValidationResult {
        let result = match allowlist::check(cmd) {
            Ok(risk) => ValidationResult::ok(risk),
            Err(refusal) => ValidationResult::reject(refusal.code, refusal.detail, refusal.risk),
        }
        .with_meta("program", cmd.program.clone());

        if result.valid {
            tracing::info!(
                layer = "command",
                command = %cmd,
                risk = %result.risk,
                "validation passed"
            );
        } else {
            tracing::warn!(
                layer = "command",
                command = %cmd,
                risk = %result.risk,
                code = result.code().unwrap_or("unknown"),
                "validation rejected"
            );
        }
        result
    }

    /// Run both layers and hand out a `ValidatedCommand` when they pass.
    pub fn approve(&self, request_id: &str, text: &str, command: Command) -> Result<ValidatedCommand, ValidationResult> {
        let text_result = self.validate_text(text);
        let result = if text_result.valid {
            self.validate_command(&command)
        } else {
            text_result
        };
        self.record(request_id, text, Some(&command), &result);

        if result.valid {
            Ok(ValidatedCommand {
                command,
                validation: result,
            })
        } else {
            Err(result)
        }
    }

    /// Write a decision to the audit log, if one is configured.
    pub fn record(&self, request_id: &str, text: &str, command: Option<&Command>, result: &ValidationResult) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut entry = AuditEntry::new(
            AuditEntryType::Validation,
            if result.valid {
                AuditResult::Allowed
            } else {
                AuditResult::Blocked
            },
        )
        .with_request_id(request_id)
        .with_request(text)
        .with_risk(result.risk.as_str());
        if let Some(cmd) = command {
            entry = entry.with_command(&cmd.display_text());
        }
        if let Some(code) = result.code() {
            entry = entry.with_reason(code);
        }
        audit.record(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_text_rejection_mentions_danger() {
        let validator = SecurityValidator::new();
        let result = validator.validate_text("install firefox; rm -rf /");
        assert!(!result.valid);
        assert_eq!(result.risk, RiskLevel::High);
        assert!(result.reason.as_deref().unwrap_or("").contains("dangerous pattern"));
        assert!(result.suggestion().is_some());
    }

    #[test]
    fn test_text_too_long() {
        let validator = SecurityValidator::new();
        let result = validator.validate_text(&"a".repeat(MAX_TEXT_CHARS + 1));
        assert_eq!(result.code(), Some("too_long"));
    }

    #[test]
    fn test_command_risk() {
        let validator = SecurityValidator::new();
        let result = validator.validate_command(&Command::new("nix-env", &["--install", "firefox"]));
        assert!(result.valid);
        assert_eq!(result.risk, RiskLevel::Low);
        assert_eq!(result.suggestion(), None);
        assert_eq!(result.metadata.get("program").map(String::as_str), Some("nix-env"));
    }

    #[test]
    fn test_high_is_never_valid() {
        let validator = SecurityValidator::new();
        let rejected = [
            Command::new("nixos-rebuild", &["switch", "--rollback", "--install-bootloader"]),
            Command::new("bash", &["-c", "id"]),
            Command::new("nix-collect-garbage", &["-d"]),
        ];
        for cmd in rejected {
            let result = validator.validate_command(&cmd);
            assert_eq!(result.risk, RiskLevel::High, "{}", cmd);
            assert!(!result.valid, "{}", cmd);
        }
    }

    #[test]
    fn test_approve_checks_both_layers() {
        let validator = SecurityValidator::new();
        let cmd = Command::new("nix-env", &["--install", "vim"]);
        let approved = validator.approve("r1", "install vim", cmd.clone()).unwrap();
        assert_eq!(approved.command(), &cmd);
        assert_eq!(approved.risk(), RiskLevel::Low);

        let rejected = validator.approve("r2", "install vim && reboot", cmd).unwrap_err();
        assert_eq!(rejected.code(), Some("command_chaining"));
    }

    #[test]
    fn test_decisions_are_audited() {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path().join("audit.jsonl")));
        let validator = SecurityValidator::new().with_audit(audit.clone());
        let _ = validator.approve("r1", "install vim", Command::new("nix-env", &["--install", "vim"]));
        let _ = validator.approve("r2", "rollback", Command::new("nixos-rebuild", &["switch", "--install-bootloader"]));

        let entries = audit.recent(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result, AuditResult::Allowed);
        assert_eq!(entries[1].result, AuditResult::Blocked);
        assert_eq!(entries[1].reason.as_deref(), Some("bootloader_reinstall"));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_text_rejection_is_logged_with_text_and_risk() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            SecurityValidator::new().validate_text("install vim &&\n reboot");
        });

        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("validation rejected"), "{}", logged);
        assert!(logged.contains("install vim && reboot"), "{}", logged);
        assert!(logged.contains("risk=high"), "{}", logged);
        assert!(logged.contains("command_chaining"), "{}", logged);
    }
}
