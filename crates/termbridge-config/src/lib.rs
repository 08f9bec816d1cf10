//! termbridge configuration system.
//!
//! TOML-based configuration with environment overrides and validation.
//! All sections use sensible defaults so partial configs work out of the
//! box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use termbridge_config::{load_config, config_to_json};
//!
//! let loaded = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&loaded.config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BridgeConfig, FilterConfig, LoggingConfig, RuleConfig, RuleKind, ServerConfig,
    SessionConfig, ShellConfig,
};

use std::path::Path;
use termbridge_common::ConfigError;

/// A validated config plus the environment overrides that were rejected.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BridgeConfig,
    /// One message per ignored override, for the caller to log.
    pub ignored_overrides: Vec<String>,
}

/// Load, override and validate the bridge config.
///
/// Reads `path` when given, otherwise the platform default path (creating a
/// commented default file if none exists). Environment overrides (`PORT`,
/// `TERMBRIDGE_SHELL`) are applied before validation.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    let ignored_overrides = toml_loader::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(LoadedConfig {
        config,
        ignored_overrides,
    })
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &BridgeConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&BridgeConfig::default());
        assert!(json.contains("\"server\""));
        assert!(json.contains("\"shell\""));
        assert!(json.contains("\"session\""));
        assert!(json.contains("\"filter\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[shell]\ncols = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_config_missing_explicit_path_fails() {
        let err = load_config(Some(Path::new("/tmp/termbridge_missing_cfg.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let json = config_to_json(&BridgeConfig::default());
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.port, 3001);
        assert_eq!(parsed.filter.rejection_message, "Blocked unsafe command.");
    }
}
