//! Diagnostic logging setup.
//!
//! Logs go to stderr so `--json` output on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive, e.g. `nixie_common=debug`
pub const LOG_ENV: &str = "NIXIE_LOG";

/// Filter from `NIXIE_LOG` when set and valid, else `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    if std::env::var_os(LOG_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
            return filter;
        }
    }
    EnvFilter::try_new(default_level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
