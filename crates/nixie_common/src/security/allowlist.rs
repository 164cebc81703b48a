//! Command-level allow-list.
//!
//! Each permitted program lists the verbs it may run with, the option
//! tokens it accepts, options that force a rejection, and literal values
//! accepted verbatim. Everything else must be a well-formed name.

use super::RiskLevel;
use crate::command::{Command, GC_MAX_AGE, LOG_LINES, SYSTEM_PROFILE};

/// Longest single argument accepted at all.
pub const MAX_ARG_CHARS: usize = 10_000;

/// Longest package or unit name.
pub const MAX_NAME_CHARS: usize = 100;

/// Longest combined search query.
pub const MAX_QUERY_CHARS: usize = 200;

/// Names never accepted as a package or unit.
const FORBIDDEN_NAMES: &[&str] = &["..", ".", "/", "sudo", "rm"];

/// How positional (non-option, non-literal) arguments are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Positional {
    None,
    /// Package, unit or generation name
    Names(usize),
    /// Free search words, bounded by total length
    Query,
}

pub struct ProgramRule {
    pub program: &'static str,
    pub verbs: &'static [&'static str],
    /// Verbs that cannot change system state
    pub read_only_verbs: &'static [&'static str],
    pub options: &'static [&'static str],
    /// (option, reason code)
    pub dangerous: &'static [(&'static str, &'static str)],
    pub fixed_values: &'static [&'static str],
    pub positional: Positional,
    /// Needs elevation to do anything mutating
    pub system_scope: bool,
}

/// Options rejected for every program.
const ALWAYS_DANGEROUS: &[(&str, &str)] = &[
    ("--option", "nix_option_override"),
    ("--impure", "impure_evaluation"),
    ("--no-sandbox", "sandbox_escape"),
    ("--sandbox-fallback", "sandbox_escape"),
    ("--eval", "arbitrary_evaluation"),
    ("--expr", "arbitrary_evaluation"),
    ("-E", "arbitrary_evaluation"),
];

pub const RULES: &[ProgramRule] = &[
    ProgramRule {
        program: "nix-env",
        verbs: &[
            "--install",
            "--uninstall",
            "--upgrade",
            "--query",
            "--list-generations",
            "--switch-generation",
        ],
        read_only_verbs: &["--query", "--list-generations"],
        options: &["--profile", "--installed", "--dry-run"],
        dangerous: &[
            ("--delete-generations", "mass_removal"),
            ("--remove-all", "mass_removal"),
            ("--set", "profile_override"),
            ("--set-flag", "profile_override"),
        ],
        fixed_values: &[SYSTEM_PROFILE],
        positional: Positional::Names(1),
        system_scope: false,
    },
    ProgramRule {
        program: "nix",
        verbs: &["search"],
        read_only_verbs: &["search"],
        options: &["--json"],
        dangerous: &[],
        fixed_values: &["nixpkgs"],
        positional: Positional::Query,
        system_scope: false,
    },
    ProgramRule {
        program: "nixos-rebuild",
        verbs: &["switch", "boot", "test", "build", "dry-build", "dry-activate"],
        read_only_verbs: &["build", "dry-build", "dry-activate"],
        options: &["--upgrade", "--upgrade-all", "--rollback", "--show-trace"],
        dangerous: &[
            ("--install-bootloader", "bootloader_reinstall"),
            ("--flake", "unreviewed_source"),
            ("-I", "unreviewed_source"),
            ("--override-input", "unreviewed_source"),
        ],
        fixed_values: &[],
        positional: Positional::None,
        system_scope: true,
    },
    ProgramRule {
        program: "nix-collect-garbage",
        verbs: &["--delete-older-than", "--dry-run"],
        read_only_verbs: &["--dry-run"],
        options: &["--dry-run"],
        dangerous: &[("-d", "mass_removal"), ("--delete-old", "mass_removal")],
        fixed_values: &[GC_MAX_AGE],
        positional: Positional::None,
        system_scope: true,
    },
    ProgramRule {
        program: "systemctl",
        verbs: &[
            "start",
            "stop",
            "restart",
            "enable",
            "disable",
            "status",
            "list-units",
            "is-active",
        ],
        read_only_verbs: &["status", "list-units", "is-active"],
        options: &["--no-pager", "--type=service"],
        dangerous: &[
            ("--force", "forced_operation"),
            ("--now", "forced_operation"),
            ("--root", "unreviewed_source"),
        ],
        fixed_values: &[],
        positional: Positional::Names(1),
        system_scope: true,
    },
    ProgramRule {
        program: "journalctl",
        verbs: &["-u"],
        read_only_verbs: &["-u"],
        options: &["-n", "--no-pager"],
        dangerous: &[("--vacuum-time", "log_deletion"), ("--vacuum-size", "log_deletion"), ("--rotate", "log_deletion")],
        fixed_values: &[LOG_LINES],
        positional: Positional::Names(1),
        system_scope: false,
    },
];

pub fn rule_for(program: &str) -> Option<&'static ProgramRule> {
    RULES.iter().find(|r| r.program == program)
}

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub code: &'static str,
    pub detail: String,
    pub risk: RiskLevel,
}

impl Refusal {
    fn high(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            risk: RiskLevel::High,
        }
    }

    fn medium(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            risk: RiskLevel::Medium,
        }
    }
}

/// Check `cmd` against its rule. Ok carries the risk of running it.
pub fn check(cmd: &Command) -> Result<RiskLevel, Refusal> {
    let Some(rule) = rule_for(&cmd.program) else {
        return Err(Refusal::high(
            "program_not_allowed",
            format!("'{}' is not an allowed program", cmd.program),
        ));
    };

    if let Some(arg) = cmd.args.iter().find(|a| a.chars().count() > MAX_ARG_CHARS) {
        return Err(Refusal::high(
            "too_long",
            format!("argument of {} characters exceeds the limit", arg.chars().count()),
        ));
    }

    for arg in &cmd.args {
        if let Some((_, code)) = ALWAYS_DANGEROUS
            .iter()
            .chain(rule.dangerous.iter())
            .find(|(flag, _)| flag_matches(arg, flag))
        {
            return Err(Refusal::high(code, format!("'{}' is not allowed", arg)));
        }
        if arg.contains('*') || arg.contains('?') {
            return Err(Refusal::high("mass_removal", format!("wildcard argument '{}'", arg)));
        }
    }

    let Some(verb) = cmd.verb() else {
        return Err(Refusal::high("verb_not_allowed", format!("{} needs a subcommand", rule.program)));
    };
    if !rule.verbs.contains(&verb) {
        return Err(Refusal::high(
            "verb_not_allowed",
            format!("'{} {}' is not allowed", rule.program, verb),
        ));
    }

    let mut positionals: Vec<&str> = Vec::new();
    for arg in &cmd.args[1..] {
        let arg = arg.as_str();
        if rule.fixed_values.contains(&arg) || rule.options.contains(&arg) || rule.verbs.contains(&arg) {
            continue;
        }
        if arg.starts_with('-') {
            return Err(Refusal::high("flag_not_allowed", format!("option '{}' is not allowed", arg)));
        }
        positionals.push(arg);
    }
    check_positionals(rule, &positionals)?;

    Ok(risk_of(rule, cmd, verb))
}

fn check_positionals(rule: &ProgramRule, positionals: &[&str]) -> Result<(), Refusal> {
    match rule.positional {
        Positional::None => match positionals.first() {
            Some(extra) => Err(Refusal::high(
                "unexpected_argument",
                format!("{} takes no argument '{}'", rule.program, extra),
            )),
            None => Ok(()),
        },
        Positional::Names(max) => {
            if positionals.len() > max {
                return Err(Refusal::high(
                    "unexpected_argument",
                    format!("{} takes at most {} name(s)", rule.program, max),
                ));
            }
            for name in positionals {
                validate_name(name)?;
            }
            Ok(())
        }
        Positional::Query => {
            if positionals.is_empty() {
                return Err(Refusal::medium("invalid_argument", "search needs at least one word"));
            }
            let total: usize = positionals.iter().map(|w| w.chars().count()).sum::<usize>() + positionals.len() - 1;
            if total > MAX_QUERY_CHARS {
                return Err(Refusal::medium(
                    "invalid_argument",
                    format!("search query of {} characters exceeds {}", total, MAX_QUERY_CHARS),
                ));
            }
            for word in positionals {
                if !word.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+')) {
                    return Err(Refusal::medium("invalid_argument", format!("'{}' is not a valid search word", word)));
                }
            }
            Ok(())
        }
    }
}

/// Package, unit or generation name check.
pub fn validate_name(name: &str) -> Result<(), Refusal> {
    if FORBIDDEN_NAMES.contains(&name) {
        return Err(Refusal::high("forbidden_name", format!("'{}' cannot be used as a name", name)));
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(Refusal::medium(
            "invalid_argument",
            format!("names must be 1-{} characters", MAX_NAME_CHARS),
        ));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(Refusal::medium("invalid_argument", format!("'{}' may not start with '.' or '-'", name)));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'));
    if !valid_chars {
        return Err(Refusal::medium("invalid_argument", format!("'{}' contains invalid characters", name)));
    }
    Ok(())
}

fn flag_matches(arg: &str, flag: &str) -> bool {
    arg == flag || (flag.starts_with("--") && arg.starts_with(flag) && arg[flag.len()..].starts_with('='))
}

fn risk_of(rule: &ProgramRule, cmd: &Command, verb: &str) -> RiskLevel {
    let simulated = cmd.has_arg("--dry-run");
    if rule.read_only_verbs.contains(&verb) || simulated {
        return RiskLevel::Low;
    }
    if rule.program == "nix-env" && verb == "--install" {
        return RiskLevel::Low;
    }
    RiskLevel::Medium
}
