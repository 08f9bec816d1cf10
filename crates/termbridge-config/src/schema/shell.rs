//! Shell process configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shell process settings.
///
/// Controls which shell to launch, its arguments, working directory,
/// extra environment variables, login shell behavior and the initial
/// terminal size reported to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program path. Empty string means auto-detect from `$SHELL`.
    pub program: String,
    /// Extra arguments passed to the shell.
    pub args: Vec<String>,
    /// Launch as a login shell.
    pub login_shell: bool,
    /// Initial working directory. Empty means inherit from the server.
    pub working_directory: String,
    /// Value exported as `TERM`.
    pub term: String,
    /// Extra environment variables injected on top of the inherited ones.
    pub env: HashMap<String, String>,
    /// Initial terminal width in columns.
    pub cols: u16,
    /// Initial terminal height in rows.
    pub rows: u16,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            login_shell: true,
            working_directory: String::new(),
            term: "xterm-256color".into(),
            env: HashMap::new(),
            cols: 80,
            rows: 24,
        }
    }
}
