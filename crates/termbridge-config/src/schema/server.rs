//! Listener and admission settings.

use serde::{Deserialize, Serialize};

/// Where the bridge listens and how many sessions it admits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Maximum concurrent sessions. `0` means no cap.
    pub max_sessions: usize,
    /// Path answered with a plain HTTP health response. Empty disables it.
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            max_sessions: 0,
            health_path: "/health".into(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
