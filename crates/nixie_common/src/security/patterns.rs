//! Text-level denylist.
//!
//! Applied to the raw request before anything else. A single match rejects.
//! New attack shapes need new entries here.

use regex::Regex;

/// Longest request accepted, in characters.
pub const MAX_TEXT_CHARS: usize = 1000;

/// (code, label, pattern). Checked in order; the first hit is reported.
pub(crate) const DENYLIST: &[(&str, &str, &str)] = &[
    ("fork_bomb", "fork bomb", r":\s*\(\s*\)\s*\{[^}]*:\s*\|\s*:"),
    ("destructive_command", "recursive delete of the filesystem root", r"\brm\s+(?:-[a-zA-Z]*\s+)*-[a-zA-Z]*[rR][a-zA-Z]*\s+(?:-[a-zA-Z]*\s+)*/(?:\s|\*|$)"),
    ("device_write", "raw device write", r"(?:>\s*/dev/(?:sd|hd|vd|nvme|mmcblk)|\bdd\s+if=|\bmkfs(?:\.\w+)?\s)"),
    ("command_chaining", "command chaining", r"(?:;\s*\S|&&|\|\|)"),
    ("shell_pipe", "pipe into another program", r"\|"),
    ("command_substitution", "command substitution", r"(?:`|\$\()"),
    ("variable_expansion", "shell variable expansion", r"\$\{|\$[A-Za-z_]"),
    ("process_substitution", "process substitution", r"[<>]\("),
    ("path_traversal", "path traversal", r"(?:\.\./|\.\.\\|~/\.\.)"),
    ("background_job", "background execution", r"&\s*$|&\s+\S"),
    ("redirection", "output redirection", r">>?\s*[/~]"),
    ("control_characters", "control characters or line breaks", r"[\x00-\x08\x0a-\x1f\x7f]"),
];

pub(crate) struct DenyPattern {
    pub code: &'static str,
    pub label: &'static str,
    pub regex: Regex,
}

pub(crate) fn compile() -> Vec<DenyPattern> {
    DENYLIST
        .iter()
        .filter_map(|(code, label, source)| match Regex::new(source) {
            Ok(regex) => Some(DenyPattern { code, label, regex }),
            Err(e) => {
                tracing::error!(code = %code, error = %e, "denylist pattern failed to compile");
                None
            }
        })
        .collect()
}

/// First denylist entry matching `text`.
pub(crate) fn first_match<'p>(patterns: &'p [DenyPattern], text: &str) -> Option<&'p DenyPattern> {
    patterns.iter().find(|p| p.regex.is_match(text))
}
