//! Safe execution of validated commands.
//!
//! Three modes:
//! - Explain: canned description only, no OS contact
//! - DryRun: native simulation where the tool has one, explanation otherwise
//! - Execute: real run, scrubbed environment, hard timeout
//!
//! Elevation is added here, never upstream. Privileged commands go through a
//! `Confirmer` first when confirmation is configured.

pub mod backend;
pub mod dry_run;
pub mod env;
pub mod explain;

use crate::audit_log::{AuditEntry, AuditEntryType, AuditLog, AuditResult};
use crate::command::Command;
use crate::config::ExecutorSettings;
use crate::security::{RiskLevel, ValidatedCommand};
use backend::{ProcessBackend, SpawnRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Explain,
    DryRun,
    Execute,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Explain => "explain",
            ExecutionMode::DryRun => "dry-run",
            ExecutionMode::Execute => "execute",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explain" => Ok(ExecutionMode::Explain),
            "dry-run" | "dry_run" | "dryrun" | "simulate" => Ok(ExecutionMode::DryRun),
            "execute" | "run" => Ok(ExecutionMode::Execute),
            other => Err(format!("unknown mode '{}' (expected explain, dry-run or execute)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Explain mode, nothing spawned
    Explained,
    /// Dry-run without native simulation, nothing spawned
    Simulated,
    Success,
    NonZeroExit,
    Timeout,
    /// Program missing from the safe PATH
    NotFound,
    SpawnFailed,
    /// Confirmer refused a privileged command
    Declined,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explained => "explained",
            Self::Simulated => "simulated",
            Self::Success => "success",
            Self::NonZeroExit => "non-zero exit",
            Self::Timeout => "timeout",
            Self::NotFound => "command not found",
            Self::SpawnFailed => "spawn failed",
            Self::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: f64,
    pub command_text: String,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    pub stdout_truncated: bool,
    /// Served from the search cache
    pub from_cache: bool,
}

impl ExecutionResult {
    fn without_spawn(mode: ExecutionMode, status: ExecutionStatus, command_text: String, stdout: String, started: Instant) -> Self {
        Self {
            success: status != ExecutionStatus::Declined,
            stdout,
            stderr: None,
            exit_code: None,
            duration_ms: elapsed_ms(started),
            command_text,
            status,
            mode,
            stdout_truncated: false,
            from_cache: false,
        }
    }
}

/// Asked before a privileged command runs for real.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, command: &Command, risk: RiskLevel) -> bool;
}

/// Refuses everything. Used when nobody is around to answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Confirmer for DenyAll {
    fn confirm(&self, _command: &Command, _risk: RiskLevel) -> bool {
        false
    }
}

/// Accepts everything, for `--yes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

impl Confirmer for ApproveAll {
    fn confirm(&self, _command: &Command, _risk: RiskLevel) -> bool {
        true
    }
}

pub struct SafeExecutor {
    backend: Arc<dyn ProcessBackend>,
    confirmer: Arc<dyn Confirmer>,
    settings: ExecutorSettings,
    audit: Option<Arc<AuditLog>>,
}

impl SafeExecutor {
    pub fn new(backend: Arc<dyn ProcessBackend>, settings: ExecutorSettings) -> Self {
        Self {
            backend,
            confirmer: Arc::new(DenyAll),
            settings,
            audit: None,
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Mode-specific rewriting. Must run before validation.
    pub fn prepare(&self, command: Command, mode: ExecutionMode) -> Command {
        match mode {
            ExecutionMode::DryRun => dry_run::inject(command),
            ExecutionMode::Explain | ExecutionMode::Execute => command,
        }
    }

    /// Run a validated command in `mode`.
    pub fn run(&self, request_id: &str, validated: &ValidatedCommand, mode: ExecutionMode) -> ExecutionResult {
        let started = Instant::now();
        let cmd = validated.command();
        let command_text = cmd.display_text();

        let result = match mode {
            ExecutionMode::Explain => ExecutionResult::without_spawn(
                mode,
                ExecutionStatus::Explained,
                command_text,
                explain::explain(cmd),
                started,
            ),
            ExecutionMode::DryRun if !dry_run::is_simulated(cmd) => ExecutionResult::without_spawn(
                mode,
                ExecutionStatus::Simulated,
                command_text,
                explain::explain(cmd),
                started,
            ),
            ExecutionMode::DryRun => self.spawn(cmd, mode, false, started),
            ExecutionMode::Execute => {
                if cmd.requires_privilege && self.settings.confirm_privileged {
                    let approved = self.confirmer.confirm(cmd, validated.risk());
                    self.audit_confirmation(request_id, cmd, approved);
                    if !approved {
                        tracing::info!(command = %cmd, "privileged command declined");
                        return ExecutionResult::without_spawn(
                            mode,
                            ExecutionStatus::Declined,
                            command_text,
                            String::new(),
                            started,
                        );
                    }
                }
                self.spawn(cmd, mode, cmd.requires_privilege, started)
            }
        };

        tracing::info!(
            command = %result.command_text,
            mode = %mode,
            status = result.status.as_str(),
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "execution finished"
        );
        self.audit_execution(request_id, &result, validated.risk());
        result
    }

    /// Build the spawn: elevation prefix, scrubbed env, limits.
    pub fn spawn_request(&self, cmd: &Command, elevate: bool) -> SpawnRequest {
        let prefix = self.settings.privilege_prefix.trim();
        let (program, args) = if elevate && !prefix.is_empty() {
            let mut args = Vec::with_capacity(cmd.args.len() + 1);
            args.push(cmd.program.clone());
            args.extend(cmd.args.iter().cloned());
            (prefix.to_string(), args)
        } else {
            (cmd.program.clone(), cmd.args.clone())
        };
        SpawnRequest {
            program,
            args,
            env: env::scrubbed_env(),
            timeout: Duration::from_secs(self.settings.effective_timeout_secs()),
            max_output_bytes: self.settings.max_output_bytes,
            elevated: elevate && !prefix.is_empty(),
        }
    }

    fn spawn(&self, cmd: &Command, mode: ExecutionMode, elevate: bool, started: Instant) -> ExecutionResult {
        let request = self.spawn_request(cmd, elevate);
        tracing::debug!(spawn = %request.display_text(), backend = self.backend.name(), "spawning");
        let output = self.backend.run(&request);

        ExecutionResult {
            success: output.status == ExecutionStatus::Success,
            stdout: output.stdout,
            stderr: Some(output.stderr).filter(|s| !s.is_empty()),
            exit_code: output.exit_code,
            duration_ms: elapsed_ms(started),
            command_text: request.display_text(),
            status: output.status,
            mode,
            stdout_truncated: output.stdout_truncated,
            from_cache: false,
        }
    }

    /// Account for a result served from the cache in place of a run.
    pub fn record_cached(&self, request_id: &str, validated: &ValidatedCommand, result: &ExecutionResult) {
        tracing::info!(command = %result.command_text, status = result.status.as_str(), "execution served from cache");
        self.audit_execution(request_id, result, validated.risk());
    }

    fn audit_confirmation(&self, request_id: &str, cmd: &Command, approved: bool) {
        if let Some(audit) = &self.audit {
            let entry = AuditEntry::new(
                AuditEntryType::Confirmation,
                if approved { AuditResult::Allowed } else { AuditResult::Declined },
            )
            .with_request_id(request_id)
            .with_command(&cmd.display_text());
            audit.record(&entry);
        }
    }

    fn audit_execution(&self, request_id: &str, result: &ExecutionResult, risk: RiskLevel) {
        let Some(audit) = &self.audit else {
            return;
        };
        let outcome = match result.status {
            ExecutionStatus::Declined => AuditResult::Declined,
            _ if result.success => AuditResult::Success,
            _ => AuditResult::Failure,
        };
        let entry = AuditEntry::new(AuditEntryType::Execution, outcome)
            .with_request_id(request_id)
            .with_command(&result.command_text)
            .with_risk(risk.as_str())
            .with_details(serde_json::json!({
                "mode": result.mode.as_str(),
                "status": result.status.as_str(),
                "exit_code": result.exit_code,
                "duration_ms": result.duration_ms,
                "from_cache": result.from_cache,
            }));
        audit.record(&entry);
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityValidator;
    use backend::ProcessOutput;
    use std::sync::Mutex;

    /// Records spawns instead of running them.
    #[derive(Default)]
    struct Recorder {
        spawned: Mutex<Vec<SpawnRequest>>,
    }

    impl ProcessBackend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn run(&self, request: &SpawnRequest) -> ProcessOutput {
            self.spawned.lock().unwrap().push(request.clone());
            ProcessOutput {
                status: ExecutionStatus::Success,
                exit_code: Some(0),
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                stdout_truncated: false,
            }
        }
    }

    fn setup() -> (Arc<Recorder>, SafeExecutor) {
        let recorder = Arc::new(Recorder::default());
        let executor = SafeExecutor::new(recorder.clone(), ExecutorSettings::default());
        (recorder, executor)
    }

    fn approve(executor: &SafeExecutor, cmd: Command, mode: ExecutionMode) -> ValidatedCommand {
        let prepared = executor.prepare(cmd, mode);
        SecurityValidator::new().approve("test", "request", prepared).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("dry-run".parse::<ExecutionMode>(), Ok(ExecutionMode::DryRun));
        assert_eq!("Execute".parse::<ExecutionMode>(), Ok(ExecutionMode::Execute));
        assert!("yolo".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::default(), ExecutionMode::Explain);
    }

    #[test]
    fn test_explain_never_spawns() {
        let (recorder, executor) = setup();
        let validated = approve(&executor, Command::new("nix-env", &["--install", "vim"]), ExecutionMode::Explain);
        let result = executor.run("r", &validated, ExecutionMode::Explain);
        assert_eq!(result.status, ExecutionStatus::Explained);
        assert!(result.success);
        assert!(result.stdout.contains("nix-env --install vim"));
        assert!(recorder.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_spawns_with_flag() {
        let (recorder, executor) = setup();
        let validated = approve(
            &executor,
            Command::new("nixos-rebuild", &["switch", "--upgrade"]).privileged(),
            ExecutionMode::DryRun,
        );
        let result = executor.run("r", &validated, ExecutionMode::DryRun);
        assert_eq!(result.status, ExecutionStatus::Success);
        let spawned = recorder.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].program, "nixos-rebuild");
        assert_eq!(spawned[0].args, vec!["dry-build"]);
    }

    #[test]
    fn test_dry_run_without_native_support_is_simulated() {
        let (recorder, executor) = setup();
        let validated = approve(
            &executor,
            Command::new("systemctl", &["restart", "nginx"]).privileged(),
            ExecutionMode::DryRun,
        );
        let result = executor.run("r", &validated, ExecutionMode::DryRun);
        assert_eq!(result.status, ExecutionStatus::Simulated);
        assert!(recorder.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_refuses_unprepared_command() {
        let (recorder, executor) = setup();
        // validated for Execute, then run as DryRun
        let validated = approve(&executor, Command::new("nix-env", &["--uninstall", "vim"]), ExecutionMode::Execute);
        let result = executor.run("r", &validated, ExecutionMode::DryRun);
        assert_eq!(result.status, ExecutionStatus::Simulated);
        assert!(recorder.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_privileged_declined_by_default() {
        let (recorder, executor) = setup();
        let validated = approve(
            &executor,
            Command::new("systemctl", &["restart", "nginx"]).privileged(),
            ExecutionMode::Execute,
        );
        let result = executor.run("r", &validated, ExecutionMode::Execute);
        assert_eq!(result.status, ExecutionStatus::Declined);
        assert!(!result.success);
        assert!(recorder.spawned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_privileged_gets_prefix_when_approved() {
        let (recorder, executor) = setup();
        let executor = executor.with_confirmer(Arc::new(ApproveAll));
        let validated = approve(
            &executor,
            Command::new("systemctl", &["restart", "nginx"]).privileged(),
            ExecutionMode::Execute,
        );
        let result = executor.run("r", &validated, ExecutionMode::Execute);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.command_text, "sudo systemctl restart nginx");
        let spawned = recorder.spawned.lock().unwrap();
        assert_eq!(spawned[0].program, "sudo");
        assert_eq!(spawned[0].args, vec!["systemctl", "restart", "nginx"]);
        assert!(spawned[0].elevated);
        assert!(spawned[0].env.iter().any(|(k, v)| k == "PATH" && v == env::SAFE_PATH));
    }

    #[test]
    fn test_unprivileged_runs_without_prefix() {
        let (recorder, executor) = setup();
        let validated = approve(&executor, Command::new("nix", &["search", "nixpkgs", "python"]), ExecutionMode::Execute);
        let result = executor.run("r", &validated, ExecutionMode::Execute);
        assert!(result.success);
        assert_eq!(result.stdout, "ok\n");
        assert_eq!(recorder.spawned.lock().unwrap()[0].program, "nix");
        assert!(!recorder.spawned.lock().unwrap()[0].elevated);
    }

    #[test]
    fn test_timeout_setting_is_clamped() {
        let mut settings = ExecutorSettings::default();
        settings.timeout_secs = 0;
        let executor = SafeExecutor::new(Arc::new(Recorder::default()), settings);
        let request = executor.spawn_request(&Command::new("nix", &["search", "nixpkgs", "x"]), false);
        assert_eq!(request.timeout, Duration::from_secs(1));
    }
}
