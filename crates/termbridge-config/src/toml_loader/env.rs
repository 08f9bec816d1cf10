//! Environment variable overrides applied on top of the file config.

use crate::schema::BridgeConfig;

/// Port override, matching the convention of most hosting platforms.
pub const ENV_PORT: &str = "PORT";
/// Shell program override.
pub const ENV_SHELL: &str = "TERMBRIDGE_SHELL";

/// Apply overrides from the process environment.
///
/// Returns a description of every override that was ignored.
pub fn apply_env_overrides(config: &mut BridgeConfig) -> Vec<String> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// Invalid values leave the config untouched and are reported back, since
/// this usually runs before logging is set up.
pub fn apply_overrides_from<F>(config: &mut BridgeConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored = Vec::new();

    if let Some(raw) = lookup(ENV_PORT) {
        match raw.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => ignored.push(format!("ignoring {ENV_PORT}={raw:?}: {e}")),
        }
    }

    if let Some(shell) = lookup(ENV_SHELL) {
        if !shell.trim().is_empty() {
            config.shell.program = shell;
        }
    }

    ignored
}
