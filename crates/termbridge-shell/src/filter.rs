//! Advisory command denylist.
//!
//! [`CommandFilter`] looks at client input line by line before it is written
//! to a shell and refuses lines that match a known-dangerous pattern. It is
//! a guard against accidents, not a security boundary: command substitution,
//! aliases or a quoted `r''m` all get past it. Real isolation needs OS-level
//! sandboxing.
//!
//! The rule set is built once at startup and shared read-only by every
//! session.

use regex::{Regex, RegexBuilder};
use termbridge_config::{FilterConfig, RuleKind};

/// Built-in rules: `(regex, reason)`.
const BUILTIN_RULES: &[(&str, &str)] = &[
    (r"\brm\b", "destructive filesystem operation (rm)"),
    (r"\bmkfs(\.[a-z0-9]+)?\b", "filesystem formatting (mkfs)"),
    (r"\bdd\b.*\bof=/dev/", "raw write to a device (dd)"),
    (r"\b(sudo|doas)\b", "privilege escalation"),
    (r"(^|[\s;&|(])su(\s|$)", "privilege escalation (su)"),
    (
        r"\b(shutdown|reboot|halt|poweroff)\b",
        "system shutdown or reboot",
    ),
    (r"\binit\s+[06]\b", "system shutdown or reboot (init)"),
    (
        r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "fork bomb",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Outcome of checking one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Allowed,
    Blocked { reason: String },
}

impl FilterDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterDecision::Allowed)
    }
}

/// One immutable denylist entry.
#[derive(Debug, Clone)]
pub struct FilterRule {
    kind: RuleKind,
    pattern: String,
    reason: String,
    matcher: Regex,
}

impl FilterRule {
    pub fn new(
        kind: RuleKind,
        pattern: &str,
        reason: &str,
        case_sensitive: bool,
    ) -> Result<Self, FilterError> {
        let source = match kind {
            RuleKind::Literal => regex::escape(pattern),
            RuleKind::Regex => pattern.to_string(),
        };
        let matcher = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            reason: reason.to_string(),
            matcher,
        })
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn matches(&self, line: &str) -> bool {
        self.matcher.is_match(line)
    }
}

/// The process-wide denylist.
#[derive(Debug, Clone)]
pub struct CommandFilter {
    enabled: bool,
    rules: Vec<FilterRule>,
}

impl CommandFilter {
    /// Build the rule set from config: built-ins first (if enabled), then
    /// the operator's extra rules in file order.
    pub fn from_config(config: &FilterConfig) -> Result<Self, FilterError> {
        let mut rules = Vec::new();

        if config.use_builtin {
            for (pattern, reason) in BUILTIN_RULES {
                rules.push(FilterRule::new(
                    RuleKind::Regex,
                    pattern,
                    reason,
                    config.case_sensitive,
                )?);
            }
        }

        for rule in &config.rules {
            rules.push(FilterRule::new(
                rule.kind,
                &rule.pattern,
                &rule.reason,
                config.case_sensitive,
            )?);
        }

        Ok(Self {
            enabled: config.enabled,
            rules,
        })
    }

    /// A filter that lets everything through.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            rules: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Check a single line against the denylist. The first matching rule
    /// decides the reason.
    pub fn check(&self, line: &str) -> FilterDecision {
        if !self.enabled {
            return FilterDecision::Allowed;
        }
        match self.rules.iter().find(|rule| rule.matches(line)) {
            Some(rule) => FilterDecision::Blocked {
                reason: rule.reason.clone(),
            },
            None => FilterDecision::Allowed,
        }
    }

    /// Check every line of a client payload. One blocked line blocks the
    /// whole payload.
    pub fn check_input(&self, input: &str) -> FilterDecision {
        input
            .split(|c| c == '\n' || c == '\r')
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.check(line))
            .find(|decision| !decision.is_allowed())
            .unwrap_or(FilterDecision::Allowed)
    }
}

impl Default for CommandFilter {
    fn default() -> Self {
        // Built-in patterns are constants covered by tests.
        Self::from_config(&FilterConfig::default()).unwrap_or_else(|_| Self::disabled())
    }
}
