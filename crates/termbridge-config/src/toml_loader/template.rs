//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# termbridge configuration
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "0.0.0.0"
# port = 3001              # overridden by $PORT
# max_sessions = 0         # 0 = no cap; every client gets its own shell
# health_path = "/health"  # "" disables the HTTP health probe

[shell]
# program = ""             # "" = $SHELL, falling back to /bin/sh
# args = []
# login_shell = true
# working_directory = ""   # "" = inherit from the server
# term = "xterm-256color"
# cols = 80                # 1-1000
# rows = 24                # 1-500

[shell.env]
# EDITOR = "vi"

[session]
# append_newline = false   # true for line-oriented clients

[filter]
# enabled = true
# use_builtin = true       # rm, mkfs, dd, sudo/su/doas, shutdown/reboot, fork bombs
# case_sensitive = true
# rejection_message = "Blocked unsafe command."

# The filter is advisory: it catches accidents, not a determined user.
# [[filter.rules]]
# kind = "regex"           # regex, literal
# pattern = "\\bcurl\\b.*\\|\\s*(ba)?sh"
# reason = "piping downloads into a shell"

[logging]
# level = "info"           # any tracing EnvFilter directive; RUST_LOG wins
"##
    .to_string()
}
