//! A shell child process running inside a pseudo-terminal.
//!
//! [`ShellProcess`] owns the master side of the PTY and the child. Blocking
//! PTY I/O happens on three helper threads so the async side never waits
//! on the kernel:
//!
//! - `pty-reader` pushes output chunks into a bounded channel,
//! - `pty-writer` drains queued input into the PTY,
//! - `pty-waiter` reaps the child and publishes its exit status.
//!
//! Killing a shell adds a short-lived `pty-reaper` thread that SIGKILLs the
//! process group if SIGHUP was not enough.
//!
//! stdout and stderr share the PTY, so they arrive merged in the order the
//! shell wrote them.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use portable_pty::{Child, ChildKiller, MasterPty, PtySize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub const PTY_READ_CHUNK: usize = 8192;

/// Output chunks buffered between the reader thread and the session.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// How long output is still forwarded after the child has been reaped.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Time a shell gets to honour SIGHUP before its process group is SIGKILLed.
pub const KILL_GRACE: Duration = Duration::from_millis(500);

/// `pty-reaper` threads that have not finished yet.
static PENDING_KILLS: AtomicUsize = AtomicUsize::new(0);

/// Block until every kill in flight has been escalated or has become
/// unnecessary, or `timeout` passes. Returns `true` if none are left.
///
/// Call before the process exits so dropped shells are not left running.
pub fn wait_for_pending_kills(timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if PENDING_KILLS.load(Ordering::Acquire) == 0 {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors originating from shell process operations.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to resize terminal: {0}")]
    ResizeFailed(String),

    #[error("shell input is closed")]
    InputClosed,
}

// ---------------------------------------------------------------------------
// State and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Reaped. The code is `None` when the wait itself failed.
    Exited(Option<u32>),
}

/// What the shell produced next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Output(Vec<u8>),
    /// End of stream. Returned for every call once the shell is gone.
    Exited(Option<u32>),
}

// ---------------------------------------------------------------------------
// ShellProcess
// ---------------------------------------------------------------------------

/// Handle to one running shell.
///
/// Dropping the handle kills the process.
pub struct ShellProcess {
    pid: Option<u32>,
    master: Box<dyn MasterPty + Send>,
    input_tx: std_mpsc::Sender<Vec<u8>>,
    output_rx: mpsc::Receiver<Vec<u8>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    state_rx: watch::Receiver<ProcessState>,
    drain_deadline: Option<Instant>,
    kill_requested: bool,
    size: PtySize,
}

impl ShellProcess {
    /// Wire up the helper threads for a freshly spawned child.
    ///
    /// On failure the child is killed before the error is returned.
    pub(crate) fn start(
        master: Box<dyn MasterPty + Send>,
        mut child: Box<dyn Child + Send + Sync>,
        size: PtySize,
    ) -> Result<Self, ShellError> {
        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let io = master
            .try_clone_reader()
            .and_then(|reader| master.take_writer().map(|writer| (reader, writer)));
        let (reader, writer) = match io {
            Ok(pair) => pair,
            Err(e) => {
                let _ = child.kill();
                return Err(ShellError::SpawnFailed(format!(
                    "failed to attach to PTY: {e}"
                )));
            }
        };

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = std_mpsc::channel();
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);

        if let Err(e) = spawn_helpers(reader, writer, child, output_tx, input_rx, state_tx) {
            let _ = killer.kill();
            return Err(ShellError::SpawnFailed(format!(
                "failed to start PTY threads: {e}"
            )));
        }

        Ok(Self {
            pid,
            master,
            input_tx,
            output_rx,
            killer,
            state_rx,
            drain_deadline: None,
            kill_requested: false,
            size,
        })
    }

    /// OS process id of the shell, when the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current terminal size as `(cols, rows)`.
    pub fn size(&self) -> (u16, u16) {
        (self.size.cols, self.size.rows)
    }

    /// Queue bytes for the shell's input stream.
    pub fn write(&self, data: &[u8]) -> Result<(), ShellError> {
        if self.has_exited() {
            return Err(ShellError::InputClosed);
        }
        self.input_tx
            .send(data.to_vec())
            .map_err(|_| ShellError::InputClosed)
    }

    /// Inform the kernel (and thus the shell) that the terminal size changed.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), ShellError> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .resize(size)
            .map_err(|e| ShellError::ResizeFailed(e.to_string()))?;
        self.size = size;
        Ok(())
    }

    pub fn state(&self) -> ProcessState {
        *self.state_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        matches!(self.state(), ProcessState::Exited(_))
    }

    pub fn exit_code(&self) -> Option<u32> {
        match self.state() {
            ProcessState::Exited(code) => code,
            ProcessState::Running => None,
        }
    }

    /// Ask the shell to terminate.
    ///
    /// The shell's process group gets SIGHUP, then SIGKILL if it is still
    /// alive after [`KILL_GRACE`]. Safe to call any number of times; a
    /// process that is already gone is left alone so a recycled pid is never
    /// signalled.
    pub fn kill(&mut self) {
        if self.has_exited() || self.kill_requested {
            return;
        }
        self.kill_requested = true;

        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid() {
                if let Err(e) = signal_group(pgid, nix::sys::signal::Signal::SIGHUP) {
                    tracing::debug!(pid = ?self.pid, "SIGHUP failed, signalling shell only: {e}");
                    let _ = self.killer.kill();
                }
                self.escalate(pgid);
                return;
            }
        }

        if let Err(e) = self.killer.kill() {
            tracing::debug!(pid = ?self.pid, "kill request failed: {e}");
        }
    }

    /// portable-pty runs the shell under `setsid`, so its pid is its pgid.
    #[cfg(unix)]
    fn pgid(&self) -> Option<i32> {
        self.pid
            .and_then(|pid| i32::try_from(pid).ok())
            .filter(|pid| *pid > 0)
    }

    /// SIGKILL the group once the grace period runs out, unless the shell
    /// has been reaped by then.
    #[cfg(unix)]
    fn escalate(&self, pgid: i32) {
        let state_rx = self.state_rx.clone();
        let exited = move || matches!(*state_rx.borrow(), ProcessState::Exited(_));

        PENDING_KILLS.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name("pty-reaper".into())
            .spawn(move || {
                let deadline = std::time::Instant::now() + KILL_GRACE;
                while !exited() && std::time::Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(20));
                }
                if !exited() {
                    match signal_group(pgid, nix::sys::signal::Signal::SIGKILL) {
                        Ok(()) => tracing::debug!(pgid, "shell ignored SIGHUP, sent SIGKILL"),
                        Err(e) => tracing::debug!(pgid, "SIGKILL failed: {e}"),
                    }
                }
                PENDING_KILLS.fetch_sub(1, Ordering::AcqRel);
            });

        if let Err(e) = spawned {
            PENDING_KILLS.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!(pgid, "no reaper thread, killing immediately: {e}");
            let _ = signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
        }
    }

    /// Wait until the child has been reaped and return its exit code.
    pub async fn wait_exit(&mut self) -> Option<u32> {
        match self
            .state_rx
            .wait_for(|s| matches!(s, ProcessState::Exited(_)))
            .await
        {
            Ok(state) => match *state {
                ProcessState::Exited(code) => code,
                ProcessState::Running => None,
            },
            Err(_) => None,
        }
    }

    /// Next chunk of output, or the end-of-stream marker.
    ///
    /// Output that is still in flight when the child exits is delivered for
    /// up to [`EXIT_DRAIN_GRACE`] before `Exited` is reported.
    pub async fn next_event(&mut self) -> ShellEvent {
        loop {
            if let Some(deadline) = self.drain_deadline {
                return match tokio::time::timeout_at(deadline, self.output_rx.recv()).await {
                    Ok(Some(chunk)) => ShellEvent::Output(chunk),
                    _ => ShellEvent::Exited(self.exit_code()),
                };
            }

            tokio::select! {
                biased;
                chunk = self.output_rx.recv() => {
                    match chunk {
                        Some(chunk) => return ShellEvent::Output(chunk),
                        None => {
                            // Reader hit EOF; the waiter usually reaps right after.
                            let _ = tokio::time::timeout(EXIT_DRAIN_GRACE, self.wait_exit()).await;
                            self.drain_deadline = Some(Instant::now());
                            return ShellEvent::Exited(self.exit_code());
                        }
                    }
                }
                _ = self.state_rx.changed() => {
                    self.drain_deadline = Some(Instant::now() + EXIT_DRAIN_GRACE);
                }
            }
        }
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pgid), signal)
}

fn spawn_helpers(
    mut reader: Box<dyn Read + Send>,
    mut writer: Box<dyn Write + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    output_tx: mpsc::Sender<Vec<u8>>,
    input_rx: std_mpsc::Receiver<Vec<u8>>,
    state_tx: watch::Sender<ProcessState>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("pty-waiter".into())
        .spawn(move || {
            let code = match child.wait() {
                Ok(status) => Some(status.exit_code()),
                Err(e) => {
                    tracing::debug!("waiting on shell failed: {e}");
                    None
                }
            };
            let _ = state_tx.send(ProcessState::Exited(code));
        })?;

    thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            let mut buf = [0u8; PTY_READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO once the shell side closes on Linux.
                        tracing::trace!("PTY reader stopped: {e}");
                        break;
                    }
                }
            }
        })?;

    thread::Builder::new()
        .name("pty-writer".into())
        .spawn(move || {
            for data in input_rx {
                if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    tracing::debug!("PTY write failed: {e}");
                    break;
                }
            }
        })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::manager::ShellProcessManager;
    use termbridge_config::ShellConfig;

    fn sh() -> ShellProcessManager {
        ShellProcessManager::new(&ShellConfig {
            program: "/bin/sh".into(),
            login_shell: false,
            ..Default::default()
        })
    }

    async fn read_until(shell: &mut ShellProcess, needle: &str) -> String {
        let mut output = String::new();
        let deadline = Duration::from_secs(5);
        let _ = tokio::time::timeout(deadline, async {
            while let ShellEvent::Output(chunk) = shell.next_event().await {
                output.push_str(&String::from_utf8_lossy(&chunk));
                if output.contains(needle) {
                    break;
                }
            }
        })
        .await;
        output
    }

    #[tokio::test]
    async fn spawn_and_echo() {
        let mut shell = sh().spawn().expect("spawn sh");
        shell.write(b"echo hello-from-pty\n").expect("write");

        let output = read_until(&mut shell, "hello-from-pty\r\n").await;
        assert!(
            output.contains("hello-from-pty"),
            "expected echo output, got: {output:?}"
        );
    }

    #[tokio::test]
    async fn exit_produces_end_of_stream() {
        let mut shell = sh().spawn().expect("spawn sh");
        shell.write(b"exit 3\n").expect("write");

        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let ShellEvent::Exited(code) = shell.next_event().await {
                    return code;
                }
            }
        })
        .await
        .expect("shell should exit");

        assert_eq!(ended, Some(3));
        assert!(shell.has_exited());
        assert!(matches!(shell.write(b"echo late\n"), Err(ShellError::InputClosed)));
    }

    #[tokio::test]
    async fn kill_terminates_and_is_idempotent() {
        let mut shell = sh().spawn().expect("spawn sh");
        assert!(shell.pid().is_some());

        shell.kill();
        tokio::time::timeout(Duration::from_secs(5), shell.wait_exit())
            .await
            .expect("shell should die after kill");
        assert!(shell.has_exited());

        shell.kill();
        shell.kill();
    }

    #[tokio::test]
    async fn kill_escalates_when_hangup_is_ignored() {
        let mut shell = sh().spawn().expect("spawn sh");
        shell
            .write(b"trap '' HUP; echo armed-$((1+1)); sleep 30\n")
            .expect("write");
        let output = read_until(&mut shell, "armed-2").await;
        assert!(output.contains("armed-2"), "got: {output:?}");

        shell.kill();
        let code = tokio::time::timeout(KILL_GRACE + Duration::from_secs(5), shell.wait_exit())
            .await
            .expect("SIGKILL should follow the ignored SIGHUP");
        assert!(shell.has_exited());
        assert_ne!(code, Some(0));
    }

    #[tokio::test]
    async fn dropped_shell_is_killed_before_pending_kills_drain() {
        let mut shell = sh().spawn().expect("spawn sh");
        let pid = shell.pid().expect("pid");
        shell
            .write(b"trap '' HUP; echo armed-$((2+2)); sleep 30\n")
            .expect("write");
        let output = read_until(&mut shell, "armed-4").await;
        assert!(output.contains("armed-4"), "got: {output:?}");

        drop(shell);
        assert!(wait_for_pending_kills(KILL_GRACE + Duration::from_secs(5)));

        // The waiter thread reaps right after SIGKILL lands.
        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(gone.is_ok(), "shell {pid} survived its handle");
    }

    #[tokio::test]
    async fn resize_updates_reported_size() {
        let mut shell = sh().spawn().expect("spawn sh");
        assert_eq!(shell.size(), (80, 24));

        shell.resize(132, 43).expect("resize");
        assert_eq!(shell.size(), (132, 43));

        shell.write(b"stty size\n").expect("write");
        let output = read_until(&mut shell, "43 132").await;
        assert!(output.contains("43 132"), "stty reported: {output:?}");
    }
}
