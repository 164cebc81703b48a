//! Scrubbed environment for spawned commands.
//!
//! The child starts from an empty environment. PATH is fixed to the NixOS
//! system locations and only a short list of variables is forwarded.

/// setuid wrappers first so `sudo` resolves to the NixOS wrapper
pub const SAFE_PATH: &str =
    "/run/wrappers/bin:/run/current-system/sw/bin:/nix/var/nix/profiles/default/bin:/usr/bin:/bin";

pub const FORWARDED_VARS: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "LANG",
    "LC_ALL",
    "TZ",
    "TERM",
    "NIX_PATH",
    "NIX_REMOTE",
    "NIX_CONF_DIR",
    "LOCALE_ARCHIVE",
];

/// Environment for a child, built from the current process environment.
pub fn scrubbed_env() -> Vec<(String, String)> {
    scrub(std::env::vars())
}

/// Keep forwarded variables from `vars` and pin PATH.
pub fn scrub(vars: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(key, _)| FORWARDED_VARS.contains(&key.as_str()))
        .collect();
    env.sort();
    env.push(("PATH".to_string(), SAFE_PATH.to_string()));
    env
}
