//! End-to-end request scenarios through `Pipeline::process`.
//!
//! Spawns go to a recording backend; nothing touches the host.

use nixie_common::executor::backend::{ProcessBackend, ProcessOutput, SpawnRequest};
use nixie_common::executor::{ApproveAll, ExecutionMode, ExecutionStatus};
use nixie_common::intent::entity;
use nixie_common::{Cache, Context, IntentKind, NixieConfig, Outcome, Pipeline, RiskLevel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

const SEARCH_OUTPUT: &str = "* legacyPackages.x86_64-linux.python3 (3.11.9)\n  A high-level dynamically-typed programming language\n";

#[derive(Default)]
struct RecordingBackend {
    spawned: Mutex<Vec<SpawnRequest>>,
}

impl RecordingBackend {
    fn spawned(&self) -> Vec<SpawnRequest> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ProcessBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn run(&self, request: &SpawnRequest) -> ProcessOutput {
        self.spawned.lock().unwrap().push(request.clone());
        let stdout = if request.args.first().map(String::as_str) == Some("search") {
            SEARCH_OUTPUT.to_string()
        } else {
            String::new()
        };
        ProcessOutput {
            status: ExecutionStatus::Success,
            exit_code: Some(0),
            stdout,
            stderr: String::new(),
            stdout_truncated: false,
        }
    }
}

fn setup() -> (Arc<RecordingBackend>, Pipeline) {
    let backend = Arc::new(RecordingBackend::default());
    let cache = Arc::new(Cache::in_memory(128, Duration::from_secs(60)));
    let ctx = Context::new(NixieConfig::default(), cache, backend.clone());
    let pipeline = Pipeline::new(ctx).with_confirmer(Arc::new(ApproveAll));
    (backend, pipeline)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_install_firefox_explain() {
    let (backend, p) = setup();
    let report = p.process("install firefox", ExecutionMode::Explain);

    assert_eq!(report.intent.kind, IntentKind::Install);
    assert_eq!(report.intent.entity(entity::PACKAGE), Some("firefox"));
    assert!(report.intent.confidence >= 0.9);

    let command = report.command.expect("command built");
    assert_eq!(command.program, "nix-env");
    assert_eq!(command.args.last().map(String::as_str), Some("firefox"));

    let validation = report.validation.expect("validated");
    assert!(validation.valid);
    assert_eq!(validation.risk, RiskLevel::Low);

    match report.outcome {
        Outcome::Completed { result } => assert_eq!(result.status, ExecutionStatus::Explained),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(backend.spawned().is_empty());
}

#[test]
fn test_injection_rejected_in_every_mode() {
    let (backend, p) = setup();
    for mode in [ExecutionMode::Explain, ExecutionMode::DryRun, ExecutionMode::Execute] {
        let report = p.process("install firefox; rm -rf /", mode);
        let validation = report.validation.expect("text validation recorded");
        assert!(!validation.valid);
        assert!(validation.reason.unwrap().contains("dangerous"));
        assert!(report.command.is_none());
        assert!(matches!(report.outcome, Outcome::Rejected { .. }));
    }
    assert!(backend.spawned().is_empty());
}

#[test]
fn test_search_python_execute() {
    let (backend, p) = setup();
    let report = p.process("search python", ExecutionMode::Execute);

    assert_eq!(report.intent.kind, IntentKind::Search);
    assert_eq!(report.intent.entity(entity::QUERY), Some("python"));
    let validation = report.validation.expect("validated");
    assert!(validation.valid);
    assert_eq!(validation.risk, RiskLevel::Low);

    match report.outcome {
        Outcome::Completed { result } => {
            assert!(result.success);
            assert!(result.stdout.contains("python3"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let spawned = backend.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].program, "nix");
    assert_eq!(spawned[0].args, vec!["search", "nixpkgs", "python"]);
}

#[test]
fn test_rollback_with_bootloader_reinstall_is_high_risk() {
    let (backend, p) = setup();
    for text in ["rollback system --install-bootloader", "roll back and reinstall the bootloader"] {
        let report = p.process(text, ExecutionMode::Execute);
        assert_eq!(report.intent.kind, IntentKind::Rollback, "{}", text);
        let validation = report.validation.expect("validated");
        assert!(!validation.valid, "{}", text);
        assert_eq!(validation.risk, RiskLevel::High);
        assert_eq!(validation.code(), Some("bootloader_reinstall"));
        match report.outcome {
            Outcome::Rejected { suggestion, .. } => assert!(suggestion.is_some()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert!(backend.spawned().is_empty());
}

#[test]
fn test_empty_input_short_circuits() {
    let (backend, p) = setup();
    let report = p.process("", ExecutionMode::Execute);
    assert_eq!(report.intent.kind, IntentKind::Unknown);
    assert_eq!(report.intent.confidence, 0.0);
    assert!(report.command.is_none());
    assert!(matches!(report.outcome, Outcome::Clarify { .. }));
    assert!(backend.spawned().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_explain_is_idempotent() {
    let (_, p) = setup();
    for text in ["install firefox", "rollback", "restart nginx", "search rust analyzer", "gibberish words here"] {
        let first = p.process(text, ExecutionMode::Explain);
        let second = p.process(text, ExecutionMode::Explain);
        assert_eq!(first.intent, second.intent, "{}", text);
        assert_eq!(first.validation, second.validation, "{}", text);
        assert_eq!(first.command, second.command, "{}", text);
        assert_ne!(first.request_id, second.request_id);
    }
}

#[test]
fn test_dry_run_spawns_carry_simulation_flag() {
    let (backend, p) = setup();
    let requests = [
        "install firefox",
        "remove vim",
        "update firefox",
        "update the system",
        "rebuild the system",
        "collect garbage",
        "switch to generation 12",
    ];
    for text in requests {
        let report = p.process(text, ExecutionMode::DryRun);
        assert!(
            report.validation.as_ref().map(|v| v.valid).unwrap_or(false),
            "{} was not validated: {:?}",
            text,
            report.validation
        );
    }

    let spawned = backend.spawned();
    assert!(!spawned.is_empty());
    for request in &spawned {
        // dry-run never elevates
        assert_ne!(request.program, "sudo");
        match request.program.as_str() {
            "nix-env" | "nix-collect-garbage" => {
                assert!(request.args.iter().any(|a| a == "--dry-run"), "{:?}", request)
            }
            "nixos-rebuild" => {
                assert_eq!(request.args.first().map(String::as_str), Some("dry-build"));
                assert!(!request.args.iter().any(|a| a == "--upgrade"));
            }
            other => panic!("unexpected spawn of {}", other),
        }
    }
}

#[test]
fn test_dry_run_rollback_is_simulated_only() {
    let (backend, p) = setup();
    let report = p.process("rollback", ExecutionMode::DryRun);
    match report.outcome {
        Outcome::Completed { result } => {
            assert_eq!(result.status, ExecutionStatus::Simulated);
            assert!(result.success);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(backend.spawned().is_empty());
}

#[test]
fn test_dry_run_service_restart_is_simulated_only() {
    let (backend, p) = setup();
    let report = p.process("restart nginx", ExecutionMode::DryRun);
    match report.outcome {
        Outcome::Completed { result } => assert_eq!(result.status, ExecutionStatus::Simulated),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(backend.spawned().is_empty());
}

#[test]
fn test_execute_privileged_uses_prefix() {
    let (backend, p) = setup();
    let report = p.process("restart nginx", ExecutionMode::Execute);
    assert!(matches!(report.outcome, Outcome::Completed { .. }));
    let spawned = backend.spawned();
    assert_eq!(spawned[0].program, "sudo");
    assert_eq!(spawned[0].args, vec!["systemctl", "restart", "nginx"]);
}
