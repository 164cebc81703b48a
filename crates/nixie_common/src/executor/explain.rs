//! Canned explanations keyed by program and verb. No OS contact.

use crate::command::Command;

/// What running `cmd` would do, in a few sentences.
pub fn explain(cmd: &Command) -> String {
    let mut text = format!("Would run: {}\n", cmd.display_text());
    text.push_str(summary(cmd));
    text.push('\n');

    if cmd.has_arg("--dry-run") || cmd.verb() == Some("dry-build") {
        text.push_str("This is a simulation; nothing will change.\n");
    }
    if cmd.requires_privilege {
        text.push_str("Requires administrator privileges.\n");
    }
    text
}

fn summary(cmd: &Command) -> &'static str {
    let verb = cmd.verb().unwrap_or("");
    match (cmd.program.as_str(), verb) {
        ("nix-env", "--install") => {
            "Installs the package into your user profile. Nothing system-wide changes, and 'remove <package>' undoes it."
        }
        ("nix-env", "--uninstall") => {
            "Removes the package from your user profile. Its store path stays on disk until garbage collection."
        }
        ("nix-env", "--upgrade") => "Upgrades the package in your user profile to the version in your current channel.",
        ("nix-env", "--query") => "Lists the packages installed in your user profile.",
        ("nix-env", "--list-generations") => {
            "Lists the system generations with their creation dates. The active one is marked (current)."
        }
        ("nix-env", "--switch-generation") => {
            "Points the system profile at the chosen generation. It becomes active on the next activation or boot."
        }
        ("nix", "search") => "Searches the nixpkgs package set for matching names and descriptions. Read-only.",
        ("nixos-rebuild", "switch") if cmd.has_arg("--rollback") => {
            "Activates the previous system generation without building anything. Run a rebuild to move forward again."
        }
        ("nixos-rebuild", "switch") if cmd.has_arg("--upgrade") => {
            "Updates the NixOS channels, rebuilds the system from /etc/nixos/configuration.nix and activates it. The previous generation stays available for rollback."
        }
        ("nixos-rebuild", "switch") => {
            "Builds the system from /etc/nixos/configuration.nix and activates it now. The previous generation stays available for rollback."
        }
        ("nixos-rebuild", "boot") => "Builds the system and makes it the default for the next boot, without activating it now.",
        ("nixos-rebuild", "test") => {
            "Builds and activates the system without adding a boot entry. A reboot returns to the previous configuration."
        }
        ("nixos-rebuild", "dry-build") => "Shows which derivations would be built or downloaded for the system configuration.",
        ("nixos-rebuild", _) => "Builds the system configuration.",
        ("nix-collect-garbage", _) => {
            "Deletes old generations and removes store paths nothing refers to. Deleted generations can no longer be rolled back to."
        }
        ("systemctl", "start") => "Starts the service now. It will not start at boot unless it is enabled.",
        ("systemctl", "stop") => "Stops the service now. It may start again at boot if it is enabled.",
        ("systemctl", "restart") => "Stops and starts the service, picking up new configuration.",
        ("systemctl", "enable") => {
            "Marks the service to start at boot. On NixOS, declare it in configuration.nix to make this permanent."
        }
        ("systemctl", "disable") => "Stops the service from starting at boot.",
        ("systemctl", "status") => "Shows whether the service is running along with its most recent log lines.",
        ("systemctl", "list-units") => "Lists loaded services and their state.",
        ("journalctl", _) => "Shows the most recent journal entries for the service.",
        _ => "Runs an allowed NixOS management command.",
    }
}
