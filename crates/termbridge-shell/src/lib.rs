//! Shell process management and input filtering for termbridge.
//!
//! [`ShellProcessManager`] spawns one interactive shell per session inside a
//! pseudo-terminal and hands back a [`ShellProcess`] that owns it.
//! [`CommandFilter`] is the advisory denylist applied to client input before
//! it reaches a shell.

pub mod filter;
pub mod manager;
pub mod pty;
pub mod shell;

pub use filter::{CommandFilter, FilterDecision, FilterError, FilterRule};
pub use manager::ShellProcessManager;
pub use pty::{wait_for_pending_kills, ProcessState, ShellError, ShellEvent, ShellProcess, KILL_GRACE};
