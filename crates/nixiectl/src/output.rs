//! Terminal rendering of pipeline reports. ASCII only.

use nixie_common::executor::ExecutionStatus;
use nixie_common::{CacheStats, ExecutionResult, Outcome, PipelineReport, RiskLevel};
use owo_colors::OwoColorize;

/// Process exit code for a report.
pub fn exit_code(report: &PipelineReport) -> i32 {
    match &report.outcome {
        Outcome::Answer { .. } => 0,
        Outcome::Completed { result } if result.success => 0,
        Outcome::Completed { .. } => 1,
        Outcome::Clarify { .. } => 2,
        Outcome::Rejected { .. } => 3,
        Outcome::Unavailable { .. } => 4,
        Outcome::Declined { .. } => 5,
    }
}

fn risk_tag(risk: RiskLevel) -> String {
    let tag = format!("[{}]", risk.as_str().to_uppercase());
    match risk {
        RiskLevel::Low => tag.green().to_string(),
        RiskLevel::Medium => tag.yellow().to_string(),
        RiskLevel::High => tag.bright_red().bold().to_string(),
    }
}

/// Human-readable report.
pub fn render(report: &PipelineReport) -> String {
    let mut out = String::new();

    if let Some(cmd) = &report.command {
        out.push_str(&format!("{} {}\n", "Command:".dimmed(), cmd.display_text().bold()));
        if let Some(validation) = report.validation.as_ref().filter(|v| v.valid) {
            out.push_str(&format!("{} {}\n", "Risk:".dimmed(), risk_tag(validation.risk)));
        }
    }

    match &report.outcome {
        Outcome::Clarify { message } => {
            out.push_str(&format!("{} {}\n", "[?]".yellow(), message));
        }
        Outcome::Answer { text } => {
            out.push_str(text);
            out.push('\n');
        }
        Outcome::Rejected {
            reason,
            risk,
            suggestion,
        } => {
            out.push_str(&format!("{} {} {}\n", "[REFUSED]".red().bold(), risk_tag(*risk), reason));
            if let Some(suggestion) = suggestion {
                out.push_str(&format!("{} {}\n", "[HINT]".cyan(), suggestion));
            }
        }
        Outcome::Unavailable { program } => {
            out.push_str(&format!(
                "{} '{}' is not installed or not on the system PATH\n",
                "[UNAVAILABLE]".red(),
                program
            ));
        }
        Outcome::Declined { command } => {
            out.push_str(&format!("{} {} was not run\n", "[DECLINED]".yellow(), command));
        }
        Outcome::Completed { result } => render_result(&mut out, result),
    }
    out
}

fn render_result(out: &mut String, result: &ExecutionResult) {
    if result.status == ExecutionStatus::Simulated {
        out.push_str(&format!("{} no native dry-run; nothing was run\n", "[SIMULATED]".cyan()));
    }
    if matches!(result.status, ExecutionStatus::Explained | ExecutionStatus::Simulated) {
        out.push_str(&result.stdout);
        return;
    }

    out.push_str(&result.stdout);
    if !result.stdout.is_empty() && !result.stdout.ends_with('\n') {
        out.push('\n');
    }
    if result.stdout_truncated {
        out.push_str(&format!("{}\n", "[output truncated]".dimmed()));
    }
    if let Some(stderr) = &result.stderr {
        if !result.success {
            out.push_str(&format!("{}\n", stderr.red()));
        }
    }

    let status = match result.status {
        ExecutionStatus::Success => "[OK]".green().to_string(),
        ExecutionStatus::Timeout => "[TIMEOUT]".red().to_string(),
        _ => format!("[{}]", result.status.as_str().to_uppercase()).red().to_string(),
    };
    let exit = result.exit_code.map(|c| format!(" exit {}", c)).unwrap_or_default();
    let cached = if result.from_cache { " (cached)" } else { "" };
    out.push_str(&format!(
        "{} {}{} in {:.0} ms{}\n",
        status,
        result.command_text,
        exit,
        result.duration_ms,
        cached.dimmed()
    ));
}

pub fn render_cache_stats(stats: &CacheStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<16} {}/{}\n", "memory entries", stats.memory_entries, stats.memory_capacity));
    match (&stats.disk_path, stats.disk_entries) {
        (Some(path), Some(entries)) => {
            out.push_str(&format!("{:<16} {} ({})\n", "disk entries", entries, path.display()));
        }
        (Some(path), None) => {
            out.push_str(&format!("{:<16} unreadable ({})\n", "disk entries", path.display()));
        }
        _ => out.push_str(&format!("{:<16} {}\n", "disk tier", "off".dimmed())),
    }
    out.push_str(&format!(
        "{:<16} {} hits, {} misses ({:.0}%)\n",
        "this session",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nixie_common::{ExecutionMode, Intent, IntentKind};

    fn report(outcome: Outcome) -> PipelineReport {
        PipelineReport {
            request_id: "r".to_string(),
            mode: ExecutionMode::Explain,
            intent: Intent::unknown(""),
            command: None,
            validation: None,
            outcome,
        }
    }

    fn completed(status: ExecutionStatus, success: bool) -> ExecutionResult {
        ExecutionResult {
            success,
            stdout: "output".to_string(),
            stderr: Some("boom".to_string()),
            exit_code: Some(if success { 0 } else { 2 }),
            duration_ms: 12.0,
            command_text: "nix search nixpkgs python".to_string(),
            status,
            mode: ExecutionMode::Execute,
            stdout_truncated: false,
            from_cache: false,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&report(Outcome::Answer { text: "hi".into() })), 0);
        assert_eq!(
            exit_code(&report(Outcome::Completed {
                result: completed(ExecutionStatus::NonZeroExit, false)
            })),
            1
        );
        assert_eq!(exit_code(&report(Outcome::Clarify { message: "?".into() })), 2);
        assert_eq!(
            exit_code(&report(Outcome::Unavailable {
                program: "nix".into()
            })),
            4
        );
    }

    #[test]
    fn test_rejection_shows_hint() {
        let text = render(&report(Outcome::Rejected {
            reason: "dangerous pattern detected: command chaining".into(),
            risk: RiskLevel::High,
            suggestion: Some("Send one request at a time.".into()),
        }));
        assert!(text.contains("command chaining"));
        assert!(text.contains("one request at a time"));
    }

    #[test]
    fn test_failure_shows_stderr_and_exit() {
        let text = render(&report(Outcome::Completed {
            result: completed(ExecutionStatus::NonZeroExit, false),
        }));
        assert!(text.contains("boom"));
        assert!(text.contains("exit 2"));
    }

    #[test]
    fn test_intent_kind_irrelevant_to_answer() {
        let mut r = report(Outcome::Answer { text: "Generations are snapshots".into() });
        r.intent = Intent::new(IntentKind::Explain, 0.9, "explain generations");
        assert!(render(&r).starts_with("Generations are snapshots"));
    }
}
