//! Advisory text attached to rejections, keyed by reason code.
//! Suggestions are never acted on automatically.

pub fn suggestion_for(code: &str) -> Option<&'static str> {
    let text = match code {
        "command_chaining" | "background_job" => {
            "Ask for one thing at a time, for example 'install firefox' and then 'install vim'."
        }
        "shell_pipe" | "redirection" => "Pipes and redirects are not supported. Ask for the result you want directly.",
        "command_substitution" | "variable_expansion" | "process_substitution" => {
            "Remove shell syntax such as $(...) or ${...} from the request and name things literally."
        }
        "path_traversal" => "Refer to packages and services by name rather than by path.",
        "fork_bomb" | "destructive_command" | "device_write" => {
            "This looks destructive and will not be run. Describe what you want to achieve instead."
        }
        "control_characters" => "Put the request on a single line without control characters.",
        "too_long" => "Shorten the request.",
        "bootloader_reinstall" => {
            "Reinstalling the bootloader needs manual review. Run 'sudo nixos-rebuild switch --install-bootloader' yourself if you are sure."
        }
        "mass_removal" => {
            "Remove packages one at a time, or ask to 'collect garbage' for age-based cleanup of old generations."
        }
        "invalid_argument" => {
            "Names may only contain letters, digits, '.', '_', '@' and '-'. Try 'search <name>' to find the exact package."
        }
        "forbidden_name" => "That name is reserved. Try 'search <name>' to find the package you meant.",
        "program_not_allowed" => {
            "Only NixOS package, generation and service tools can be run. Elevation is added automatically when needed."
        }
        "nix_option_override" | "impure_evaluation" | "sandbox_escape" | "arbitrary_evaluation"
        | "unreviewed_source" | "profile_override" | "forced_operation" | "flag_not_allowed" => {
            "Advanced options are not passed through. Run the tool manually if you need them."
        }
        "log_deletion" => "Journal cleanup is not automated. Use journalctl --vacuum-time manually.",
        "verb_not_allowed" | "unexpected_argument" => "Try rephrasing the request, or ask for 'help' to see what is supported.",
        _ => return None,
    };
    Some(text)
}
