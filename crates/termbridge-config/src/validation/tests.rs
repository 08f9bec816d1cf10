//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = BridgeConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_zero_cols() {
    let mut config = BridgeConfig::default();
    config.shell.cols = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("shell.cols"));
}

#[test]
fn catches_rows_too_large() {
    let mut config = BridgeConfig::default();
    config.shell.rows = 900;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("shell.rows"));
}

#[test]
fn catches_empty_host() {
    let mut config = BridgeConfig::default();
    config.server.host = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.host"));
}

#[test]
fn catches_relative_health_path() {
    let mut config = BridgeConfig::default();
    config.server.health_path = "health".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.health_path"));
}

#[test]
fn catches_oversized_session_cap() {
    let mut config = BridgeConfig::default();
    config.server.max_sessions = MAX_SESSIONS + 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.max_sessions"));
}

#[test]
fn empty_health_path_is_allowed() {
    let mut config = BridgeConfig::default();
    config.server.health_path = String::new();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_empty_rejection_message() {
    let mut config = BridgeConfig::default();
    config.filter.rejection_message = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("filter.rejection_message"));
}

#[test]
fn catches_invalid_regex_rule() {
    let mut config = BridgeConfig::default();
    config.filter.rules.push(RuleConfig {
        kind: RuleKind::Regex,
        pattern: "(unclosed".into(),
        reason: "test".into(),
    });
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("filter.rules[0]"));
}

#[test]
fn literal_rule_with_regex_metacharacters_is_fine() {
    let mut config = BridgeConfig::default();
    config.filter.rules.push(RuleConfig {
        kind: RuleKind::Literal,
        pattern: "(unclosed".into(),
        reason: "test".into(),
    });
    assert!(validate(&config).is_ok());
}

#[test]
fn collects_multiple_errors() {
    let mut config = BridgeConfig::default();
    config.shell.cols = 0;
    config.shell.rows = 0;
    config.filter.rejection_message = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("shell.cols"));
    assert!(err.contains("shell.rows"));
    assert!(err.contains("filter.rejection_message"));
}
