//! Command descriptors and the intent-to-command mapping.
//!
//! A `Command` is a program plus an argument vector. It is never joined into
//! a shell string for execution. Privilege elevation is not part of the
//! descriptor; the executor adds it.

use crate::intent::{entity, Intent, IntentKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// System profile the generation commands operate on
pub const SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";

/// Age passed to the garbage collector
pub const GC_MAX_AGE: &str = "30d";

/// Lines of journal shown for a service
pub const LOG_LINES: &str = "50";

/// Concrete invocation built from an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    /// Read-only or user-profile scoped
    pub safe: bool,
    pub requires_privilege: bool,
    pub description: String,
}

impl Command {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            safe: true,
            requires_privilege: false,
            description: String::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.requires_privilege = true;
        self.safe = false;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.safe = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// First argument, the subcommand or verb for most tools.
    pub fn verb(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Human-readable rendering, for display and logs only.
    pub fn display_text(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// Pure mapping from intents to commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the command for `intent`. None for informational and unknown
    /// intents, or when a required entity is missing.
    pub fn build(&self, intent: &Intent) -> Option<Command> {
        let flags = intent.flags();
        let cmd = match intent.kind {
            IntentKind::Install => {
                let pkg = intent.entity(entity::PACKAGE)?;
                Command::new("nix-env", &["--install"])
                    .arg(pkg)
                    .describe(format!("Install {} into your user profile", pkg))
            }
            IntentKind::Remove => {
                let pkg = intent.entity(entity::PACKAGE)?;
                Command::new("nix-env", &["--uninstall"])
                    .arg(pkg)
                    .mutating()
                    .describe(format!("Remove {} from your user profile", pkg))
            }
            IntentKind::Search => {
                let query = intent.entity(entity::QUERY)?;
                query
                    .split_whitespace()
                    .fold(Command::new("nix", &["search", "nixpkgs"]), |cmd, word| cmd.arg(word))
                    .describe(format!("Search nixpkgs for '{}'", query))
            }
            IntentKind::Update => match intent.entity(entity::PACKAGE) {
                Some(pkg) => Command::new("nix-env", &["--upgrade"])
                    .arg(pkg)
                    .mutating()
                    .describe(format!("Upgrade {} in your user profile", pkg)),
                None => with_args(Command::new("nixos-rebuild", &["switch", "--upgrade"]), &flags)
                    .privileged()
                    .describe("Update channels and rebuild the system"),
            },
            IntentKind::Rollback => {
                with_args(Command::new("nixos-rebuild", &["switch", "--rollback"]), &flags)
                    .privileged()
                    .describe("Switch back to the previous system generation")
            }
            IntentKind::Rebuild => {
                let rebuild_type = intent.entity(entity::REBUILD_TYPE).unwrap_or("switch");
                with_args(Command::new("nixos-rebuild", &[rebuild_type]), &flags)
                    .privileged()
                    .describe(format!("Rebuild the system configuration ({})", rebuild_type))
            }
            IntentKind::ListGenerations => {
                Command::new("nix-env", &["--list-generations", "--profile", SYSTEM_PROFILE])
                    .describe("List system generations")
            }
            IntentKind::SwitchGeneration => {
                let generation = intent.entity(entity::GENERATION)?;
                Command::new("nix-env", &["--switch-generation"])
                    .arg(generation)
                    .arg("--profile")
                    .arg(SYSTEM_PROFILE)
                    .privileged()
                    .describe(format!("Switch the system profile to generation {}", generation))
            }
            IntentKind::GarbageCollect => {
                Command::new("nix-collect-garbage", &["--delete-older-than", GC_MAX_AGE])
                    .privileged()
                    .describe(format!("Delete generations older than {} and collect garbage", GC_MAX_AGE))
            }
            IntentKind::ListInstalled => {
                Command::new("nix-env", &["--query", "--installed"]).describe("List packages in your user profile")
            }
            IntentKind::ServiceStart => service_command(intent, "start", "Start {}")?,
            IntentKind::ServiceStop => service_command(intent, "stop", "Stop {}")?,
            IntentKind::ServiceRestart => service_command(intent, "restart", "Restart {}")?,
            IntentKind::ServiceEnable => service_command(intent, "enable", "Start {} at boot")?,
            IntentKind::ServiceDisable => service_command(intent, "disable", "Stop starting {} at boot")?,
            IntentKind::ServiceStatus => {
                let unit = intent.entity(entity::SERVICE)?;
                Command::new("systemctl", &["status"])
                    .arg(unit)
                    .arg("--no-pager")
                    .describe(format!("Show the status of {}", unit))
            }
            IntentKind::ServiceLogs => {
                let unit = intent.entity(entity::SERVICE)?;
                Command::new("journalctl", &["-u"])
                    .arg(unit)
                    .arg("-n")
                    .arg(LOG_LINES)
                    .arg("--no-pager")
                    .describe(format!("Show recent logs for {}", unit))
            }
            IntentKind::ListServices => Command::new("systemctl", &["list-units", "--type=service", "--no-pager"])
                .describe("List loaded services"),
            IntentKind::Configure | IntentKind::Explain | IntentKind::Help | IntentKind::Unknown => {
                return None;
            }
        };
        Some(cmd)
    }
}

/// `template` holds one `{}` for the unit name.
fn service_command(intent: &Intent, verb: &str, template: &str) -> Option<Command> {
    let unit = intent.entity(entity::SERVICE)?;
    Some(
        Command::new("systemctl", &[verb])
            .arg(unit)
            .privileged()
            .describe(template.replacen("{}", unit, 1)),
    )
}

fn with_args(cmd: Command, extra: &[&str]) -> Command {
    extra.iter().fold(cmd, |cmd, a| cmd.arg(*a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(intent: Intent) -> Option<Command> {
        CommandBuilder::new().build(&intent)
    }

    #[test]
    fn test_install() {
        let cmd = build(Intent::new(IntentKind::Install, 0.95, "install firefox").with_entity(entity::PACKAGE, "firefox")).unwrap();
        assert_eq!(cmd.program, "nix-env");
        assert_eq!(cmd.args, vec!["--install", "firefox"]);
        assert!(cmd.safe);
        assert!(!cmd.requires_privilege);
        assert_eq!(cmd.display_text(), "nix-env --install firefox");
    }

    #[test]
    fn test_search_splits_words() {
        let cmd = build(Intent::new(IntentKind::Search, 0.95, "").with_entity(entity::QUERY, "markdown editor")).unwrap();
        assert_eq!(cmd.args, vec!["search", "nixpkgs", "markdown", "editor"]);
    }

    #[test]
    fn test_update_system_vs_package() {
        let system = build(Intent::new(IntentKind::Update, 0.95, "update")).unwrap();
        assert_eq!(system.program, "nixos-rebuild");
        assert_eq!(system.args, vec!["switch", "--upgrade"]);
        assert!(system.requires_privilege);

        let pkg = build(Intent::new(IntentKind::Update, 0.9, "").with_entity(entity::PACKAGE, "git")).unwrap();
        assert_eq!(pkg.args, vec!["--upgrade", "git"]);
        assert!(!pkg.requires_privilege);
    }

    #[test]
    fn test_rollback_carries_flags() {
        let cmd = build(
            Intent::new(IntentKind::Rollback, 0.95, "").with_entity(entity::FLAGS, "--install-bootloader"),
        )
        .unwrap();
        assert_eq!(cmd.args, vec!["switch", "--rollback", "--install-bootloader"]);
    }

    #[test]
    fn test_generations() {
        let list = build(Intent::new(IntentKind::ListGenerations, 0.95, "")).unwrap();
        assert_eq!(list.args, vec!["--list-generations", "--profile", SYSTEM_PROFILE]);
        let switch = build(Intent::new(IntentKind::SwitchGeneration, 0.95, "").with_entity(entity::GENERATION, "12")).unwrap();
        assert_eq!(switch.args, vec!["--switch-generation", "12", "--profile", SYSTEM_PROFILE]);
        assert!(switch.requires_privilege);
    }

    #[test]
    fn test_services() {
        let restart = build(Intent::new(IntentKind::ServiceRestart, 0.9, "").with_entity(entity::SERVICE, "nginx")).unwrap();
        assert_eq!(restart.display_text(), "systemctl restart nginx");
        assert!(restart.requires_privilege);
        let logs = build(Intent::new(IntentKind::ServiceLogs, 0.9, "").with_entity(entity::SERVICE, "nginx")).unwrap();
        assert_eq!(logs.display_text(), "journalctl -u nginx -n 50 --no-pager");
        assert!(logs.safe);
    }

    #[test]
    fn test_no_command_for_informational() {
        for kind in [IntentKind::Help, IntentKind::Explain, IntentKind::Configure, IntentKind::Unknown] {
            assert!(build(Intent::new(kind, 0.9, "")).is_none());
        }
    }

    #[test]
    fn test_missing_entity_builds_nothing() {
        assert!(build(Intent::new(IntentKind::Install, 0.95, "install")).is_none());
        assert!(build(Intent::new(IntentKind::ServiceStart, 0.9, "start")).is_none());
    }
}
