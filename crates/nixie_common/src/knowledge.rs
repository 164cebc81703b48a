//! Built-in answers for Help, Explain and Configure requests.
//!
//! Topics are matched by keyword against the captured phrase. First topic
//! whose keyword appears wins, so more specific topics come first.

use crate::intent::{entity, Intent, IntentKind};

pub const HELP_TEXT: &str = "\
I understand plain requests about your NixOS system. For example:
  install firefox            remove vim
  search for python          update firefox / update the system
  rebuild the system         rollback
  list generations           switch to generation 42
  collect garbage            list installed packages
  restart nginx              status of sshd
  show logs for nginx        list services
  explain generations        how do I configure networking

Requests run in explain mode unless you pick dry-run or execute.";

struct Topic {
    keywords: &'static [&'static str],
    explain: &'static str,
    configure: &'static str,
}

const TOPICS: &[Topic] = &[
    Topic {
        keywords: &["garbage", "gc", "store cleanup"],
        explain: "Garbage collection deletes store paths that no generation or GC root refers to. \
                  Deleting old generations first frees more space but removes them as rollback targets.",
        configure: "Set nix.gc.automatic = true; and nix.gc.options = \"--delete-older-than 30d\"; \
                    in /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["generation", "rollback", "roll back"],
        explain: "Every rebuild creates a new system generation, a complete snapshot of the system. \
                  Older generations stay in the boot menu and can be switched back to until they are garbage collected.",
        configure: "Limit boot menu entries with boot.loader.systemd-boot.configurationLimit (or the grub equivalent) \
                    in /etc/nixos/configuration.nix.",
    },
    Topic {
        keywords: &["channel", "upgrade", "update"],
        explain: "Channels pin the nixpkgs revision your system builds from. \
                  'nixos-rebuild switch --upgrade' refreshes them before building.",
        configure: "Set system.autoUpgrade.enable = true; in /etc/nixos/configuration.nix for unattended upgrades, \
                    or manage channels with nix-channel.",
    },
    Topic {
        keywords: &["flake"],
        explain: "Flakes describe a configuration together with locked inputs in flake.nix and flake.lock, \
                  making builds reproducible across machines.",
        configure: "Enable them with nix.settings.experimental-features = [ \"nix-command\" \"flakes\" ]; \
                    then rebuild.",
    },
    Topic {
        keywords: &["network", "wifi", "wi-fi", "ethernet", "dns"],
        explain: "NixOS configures networking declaratively under the networking.* options; \
                  NetworkManager or systemd-networkd does the runtime work.",
        configure: "Set networking.hostName and networking.networkmanager.enable = true; \
                    in /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["firewall", "port"],
        explain: "The NixOS firewall is enabled by default and drops unsolicited incoming traffic.",
        configure: "Open ports with networking.firewall.allowedTCPPorts = [ 22 80 ]; \
                    in /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["ssh", "sshd", "openssh"],
        explain: "OpenSSH is provided by the services.openssh module, which manages sshd and its host keys.",
        configure: "Set services.openssh.enable = true; in /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["user", "account", "group"],
        explain: "Users and groups are declared under users.users and users.groups and created on activation.",
        configure: "Add users.users.<name> = { isNormalUser = true; extraGroups = [ \"wheel\" ]; }; \
                    to /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["service", "systemd", "daemon", "unit"],
        explain: "Services are systemd units generated from NixOS modules. \
                  Starting or stopping one lasts until the next boot; enabling belongs in configuration.nix.",
        configure: "Enable a service through its module, for example services.nginx.enable = true;, then rebuild.",
    },
    Topic {
        keywords: &["profile", "nix-env", "package", "install"],
        explain: "Packages installed with nix-env go into your user profile and affect only you. \
                  System-wide packages belong in environment.systemPackages.",
        configure: "Add packages to environment.systemPackages = with pkgs; [ ... ]; \
                    in /etc/nixos/configuration.nix, then rebuild.",
    },
    Topic {
        keywords: &["configuration.nix", "configuration", "rebuild", "nixos"],
        explain: "/etc/nixos/configuration.nix declares the whole system. \
                  'nixos-rebuild switch' builds it and activates the result as a new generation.",
        configure: "Edit /etc/nixos/configuration.nix and run a rebuild. 'nixos-rebuild test' tries it without a boot entry.",
    },
];

/// Answer for an informational intent. None for any other kind.
pub fn answer(intent: &Intent) -> Option<String> {
    match intent.kind {
        IntentKind::Help => Some(HELP_TEXT.to_string()),
        IntentKind::Explain | IntentKind::Configure => {
            let topic = intent.entity(entity::TOPIC).unwrap_or("");
            Some(topic_answer(intent.kind, topic))
        }
        _ => None,
    }
}

fn topic_answer(kind: IntentKind, topic: &str) -> String {
    let lower = topic.to_lowercase();
    let found = TOPICS.iter().find(|t| t.keywords.iter().any(|k| lower.contains(k)));

    match (found, kind) {
        (Some(t), IntentKind::Configure) => t.configure.to_string(),
        (Some(t), _) => t.explain.to_string(),
        (None, IntentKind::Configure) => format!(
            "I don't have notes on configuring '{}'. Search the NixOS options for it and add the setting to \
             /etc/nixos/configuration.nix, then rebuild.",
            topic
        ),
        (None, _) => format!(
            "I don't have notes on '{}'. Try 'help' for what I can do.",
            topic
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(kind: IntentKind, topic: &str) -> String {
        answer(&Intent::new(kind, 0.9, "q").with_entity(entity::TOPIC, topic)).unwrap()
    }

    #[test]
    fn test_help_lists_examples() {
        let text = answer(&Intent::new(IntentKind::Help, 0.95, "help")).unwrap();
        assert!(text.contains("install firefox"));
        assert!(text.contains("dry-run"));
    }

    #[test]
    fn test_explain_and_configure_differ() {
        let explain = ask(IntentKind::Explain, "generations");
        let configure = ask(IntentKind::Configure, "generations");
        assert!(explain.contains("snapshot"));
        assert!(configure.contains("configurationLimit"));
    }

    #[test]
    fn test_specific_topic_before_generic() {
        // "garbage collection" must not fall through to the nixos topic
        assert!(ask(IntentKind::Explain, "nixos garbage collection").contains("store paths"));
        assert!(ask(IntentKind::Configure, "the ssh server").contains("services.openssh"));
    }

    #[test]
    fn test_unknown_topic_still_answers() {
        let text = ask(IntentKind::Explain, "quantum tunnelling");
        assert!(text.contains("quantum tunnelling"));
    }

    #[test]
    fn test_non_informational_is_none() {
        assert!(answer(&Intent::new(IntentKind::Install, 0.9, "install vim")).is_none());
        assert!(answer(&Intent::unknown("???")).is_none());
    }
}
