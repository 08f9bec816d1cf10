//! Command denylist configuration types.

use serde::{Deserialize, Serialize};

/// How a rule pattern is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum RuleKind {
    /// Plain substring.
    Literal,
    #[default]
    Regex,
}

/// An operator-supplied denylist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    #[serde(default)]
    pub kind: RuleKind,
    pub pattern: String,
    /// Shown to the client when the rule blocks a line.
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "matches a blocked pattern".into()
}

/// Command filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Include the built-in denylist (rm, sudo, shutdown, fork bombs, ...).
    pub use_builtin: bool,
    pub case_sensitive: bool,
    /// Text sent back to the client in place of the blocked input.
    pub rejection_message: String,
    /// Extra rules applied after the built-in ones.
    pub rules: Vec<RuleConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_builtin: true,
            case_sensitive: true,
            rejection_message: "Blocked unsafe command.".into(),
            rules: Vec::new(),
        }
    }
}
