//! Full configuration validation.
//!
//! Each section has its own function; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::{BridgeConfig, RuleKind};
use helpers::{validate_non_empty, validate_range};
use termbridge_common::ConfigError;

/// Upper bound for `server.max_sessions`.
pub const MAX_SESSIONS: usize = 65_536;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_shell(&mut errors, config);
    validate_filter(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &BridgeConfig) {
    validate_non_empty(errors, "server.host", &config.server.host);

    if config.server.max_sessions > MAX_SESSIONS {
        errors.push(format!(
            "server.max_sessions = {} exceeds {MAX_SESSIONS}",
            config.server.max_sessions
        ));
    }

    let health = &config.server.health_path;
    if !health.is_empty() && !health.starts_with('/') {
        errors.push(format!("server.health_path = {health:?} must start with '/'"));
    }
}

fn validate_shell(errors: &mut Vec<String>, config: &BridgeConfig) {
    validate_range(errors, "shell.cols", u32::from(config.shell.cols), 1, 1000);
    validate_range(errors, "shell.rows", u32::from(config.shell.rows), 1, 500);
    validate_non_empty(errors, "shell.term", &config.shell.term);
}

fn validate_filter(errors: &mut Vec<String>, config: &BridgeConfig) {
    validate_non_empty(
        errors,
        "filter.rejection_message",
        &config.filter.rejection_message,
    );

    for (i, rule) in config.filter.rules.iter().enumerate() {
        if rule.pattern.is_empty() {
            errors.push(format!("filter.rules[{i}].pattern must not be empty"));
            continue;
        }
        if rule.kind == RuleKind::Regex {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                errors.push(format!("filter.rules[{i}].pattern is not a valid regex: {e}"));
            }
        }
    }
}
