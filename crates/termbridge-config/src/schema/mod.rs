//! Configuration schema types for termbridge.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod filter;
mod logging;
mod server;
mod session;
mod shell;

pub use filter::*;
pub use logging::*;
pub use server::*;
pub use session::*;
pub use shell::*;

use serde::{Deserialize, Serialize};

/// Root configuration for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub shell: ShellConfig,
    pub session: SessionConfig,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}
