//! Shell detection and argument helpers.
//!
//! Detects the user's default shell from environment variables and provides
//! appropriate command-line arguments for login sessions.

/// Detect the user's default shell.
///
/// - On Unix: reads the `SHELL` environment variable, falling back to `/bin/sh`.
/// - On Windows: reads the `COMSPEC` environment variable, falling back to `cmd.exe`.
pub fn detect_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }

    #[cfg(not(any(unix, windows)))]
    {
        "/bin/sh".to_string()
    }
}

/// Resolve the program to launch: the configured one, or the detected default.
pub fn resolve_shell(configured: &str) -> String {
    if configured.trim().is_empty() {
        detect_shell()
    } else {
        configured.to_string()
    }
}

/// Return the login flag for the given shell binary.
///
/// Only shells known to accept `--login` get it; anything else is launched
/// as a plain interactive shell.
pub fn login_args(shell: &str) -> Vec<String> {
    let name = shell.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(shell);
    match name {
        "bash" | "zsh" | "fish" => vec!["--login".to_string()],
        _ => vec![],
    }
}
