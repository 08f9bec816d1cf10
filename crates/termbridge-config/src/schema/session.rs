use serde::{Deserialize, Serialize};

/// Per-session input handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct SessionConfig {
    /// Terminate each client payload with `\n` when it lacks one.
    /// Line-oriented clients want this; keystroke-streaming terminals do not.
    pub append_newline: bool,
}
