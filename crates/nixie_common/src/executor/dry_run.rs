//! Native simulation support per program.
//!
//! Injection happens before validation so the validator sees exactly what
//! will be spawned.

use crate::command::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunSupport {
    /// Append a flag, e.g. `--dry-run`
    AppendFlag(&'static str),
    /// Swap the mutating verb for a simulating one and drop options that
    /// mutate on their own. Commands carrying a `blocking` option have no
    /// simulated form.
    ReplaceVerb {
        from: &'static [&'static str],
        to: &'static str,
        strip: &'static [&'static str],
        blocking: &'static [&'static str],
    },
    /// No native simulation; dry-run falls back to an explanation
    Unsupported,
}

pub fn support_for(program: &str) -> DryRunSupport {
    match program {
        "nix-env" | "nix-collect-garbage" => DryRunSupport::AppendFlag("--dry-run"),
        "nixos-rebuild" => DryRunSupport::ReplaceVerb {
            from: &["switch", "boot", "test"],
            to: "dry-build",
            // --upgrade refreshes channels even during a dry build
            strip: &["--upgrade", "--upgrade-all"],
            // dry-build refuses --rollback
            blocking: &["--rollback"],
        },
        _ => DryRunSupport::Unsupported,
    }
}

/// Rewrite `cmd` into its simulated form. Unsupported programs are returned
/// unchanged.
pub fn inject(mut cmd: Command) -> Command {
    match support_for(&cmd.program) {
        DryRunSupport::AppendFlag(flag) => {
            if !cmd.has_arg(flag) {
                cmd.args.push(flag.to_string());
            }
        }
        DryRunSupport::ReplaceVerb { blocking, .. } if has_any(&cmd, blocking) => {}
        DryRunSupport::ReplaceVerb { from, to, strip, .. } => {
            if let Some(verb) = cmd.args.first_mut() {
                if from.contains(&verb.as_str()) {
                    *verb = to.to_string();
                }
            }
            cmd.args.retain(|a| !strip.contains(&a.as_str()));
        }
        DryRunSupport::Unsupported => {}
    }
    cmd
}

/// True when `cmd` carries its program's simulation marker.
pub fn is_simulated(cmd: &Command) -> bool {
    match support_for(&cmd.program) {
        DryRunSupport::AppendFlag(flag) => cmd.has_arg(flag),
        DryRunSupport::ReplaceVerb { to, strip, blocking, .. } => {
            cmd.verb() == Some(to) && !has_any(cmd, strip) && !has_any(cmd, blocking)
        }
        DryRunSupport::Unsupported => false,
    }
}

fn has_any(cmd: &Command, options: &[&str]) -> bool {
    cmd.args.iter().any(|a| options.contains(&a.as_str()))
}
