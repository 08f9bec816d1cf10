//! Shell spawning: one PTY-backed shell per session.

use std::path::PathBuf;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use termbridge_config::ShellConfig;

use crate::pty::{ShellError, ShellProcess};
use crate::shell::{login_args, resolve_shell};

/// Knows how to launch the deployment's shell.
///
/// Built once from [`ShellConfig`] at startup; every [`spawn`](Self::spawn)
/// produces an independent process.
#[derive(Debug, Clone)]
pub struct ShellProcessManager {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    env: Vec<(String, String)>,
    size: PtySize,
}

impl ShellProcessManager {
    pub fn new(config: &ShellConfig) -> Self {
        let program = resolve_shell(&config.program);

        let mut args = Vec::new();
        if config.login_shell {
            args.extend(login_args(&program));
        }
        args.extend(config.args.iter().cloned());

        let mut env = vec![("TERM".to_string(), config.term.clone())];
        let mut extra: Vec<_> = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        extra.sort();
        env.extend(extra);

        let working_directory = Some(config.working_directory.trim())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Self {
            program,
            args,
            working_directory,
            env,
            size: PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            },
        }
    }

    /// The shell binary every session runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Launch a new shell inside a fresh PTY.
    ///
    /// The child inherits the server's environment, with `TERM` and the
    /// configured extras layered on top.
    pub fn spawn(&self) -> Result<ShellProcess, ShellError> {
        let pair = native_pty_system()
            .openpty(self.size)
            .map_err(|e| ShellError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(self.command())
            .map_err(|e| ShellError::SpawnFailed(format!("'{}': {e}", self.program)))?;

        // Only the master is kept; the reader sees EOF once the shell's side closes.
        drop(pair.slave);

        let process = ShellProcess::start(pair.master, child, self.size)?;
        tracing::debug!(pid = ?process.pid(), shell = %self.program, "shell spawned");
        Ok(process)
    }

    /// Request termination of `handle`. Never fails, may be repeated.
    pub fn kill(handle: &mut ShellProcess) {
        handle.kill();
    }

    fn command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_directory {
            cmd.cwd(dir);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn explicit_program_and_login_flag() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            program: "/bin/bash".into(),
            args: vec!["--noprofile".into()],
            ..Default::default()
        });
        assert_eq!(mgr.program(), "/bin/bash");
        assert_eq!(mgr.args(), &["--login".to_string(), "--noprofile".to_string()]);
    }

    #[test]
    fn login_flag_skipped_when_disabled() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            program: "/bin/bash".into(),
            login_shell: false,
            ..Default::default()
        });
        assert!(mgr.args().is_empty());
    }

    #[test]
    fn term_comes_first_then_sorted_extras() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            program: "/bin/sh".into(),
            env: HashMap::from([
                ("ZED".to_string(), "1".to_string()),
                ("ALPHA".to_string(), "2".to_string()),
            ]),
            ..Default::default()
        });
        let keys: Vec<_> = mgr.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["TERM", "ALPHA", "ZED"]);
    }

    #[test]
    fn blank_working_directory_inherits() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            working_directory: "  ".into(),
            ..Default::default()
        });
        assert!(mgr.working_directory.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn spawn_missing_binary_fails() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            program: "/nonexistent/termbridge-shell".into(),
            ..Default::default()
        });
        let err = mgr.spawn().err().expect("spawn should fail");
        assert!(matches!(err, ShellError::SpawnFailed(_)));
        assert!(err.to_string().contains("/nonexistent/termbridge-shell"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn spawned_shells_are_independent() {
        let mgr = ShellProcessManager::new(&ShellConfig {
            program: "/bin/sh".into(),
            login_shell: false,
            ..Default::default()
        });
        let mut a = mgr.spawn().expect("spawn a");
        let mut b = mgr.spawn().expect("spawn b");
        assert_ne!(a.pid(), b.pid());

        ShellProcessManager::kill(&mut a);
        tokio::time::timeout(std::time::Duration::from_secs(5), a.wait_exit())
            .await
            .expect("a should exit");

        assert!(!b.has_exited());
        b.kill();
    }
}
