//! termbridge: WebSocket bridge to per-connection interactive shells.
//!
//! Every accepted WebSocket gets its own shell in a pseudo-terminal. Shell
//! output is streamed back verbatim; client input passes through the
//! advisory [`CommandFilter`](termbridge_shell::CommandFilter) first. When
//! either side goes away the other is torn down.

pub mod protocol;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use server::SessionServer;
pub use session::{ConnectionSession, SessionEnd, SessionOptions};
