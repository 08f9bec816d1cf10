//! Listening socket and accept loop.
//!
//! Every accepted connection is handled on its own task: an optional HTTP
//! health probe, the WebSocket handshake, admission, then a
//! [`ConnectionSession`] that lives until either end goes away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use termbridge_common::{BridgeError, ConfigError};
use termbridge_config::BridgeConfig;
use termbridge_shell::{CommandFilter, ShellProcessManager};

use crate::session::{close_with_error, ConnectionSession, SessionOptions};

/// Upper bound on the handshake (and health probe sniffing).
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection task needs, shared read-only.
struct ServerContext {
    shells: ShellProcessManager,
    filter: Arc<CommandFilter>,
    options: Arc<SessionOptions>,
    admission: Option<Arc<Semaphore>>,
    health_path: Option<String>,
}

/// Accepts client channels and gives each one a [`ConnectionSession`].
pub struct SessionServer {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl SessionServer {
    /// Build the shared filter and bind the listening socket.
    ///
    /// A port that cannot be bound is reported as [`BridgeError::Bind`];
    /// callers treat it as fatal.
    pub async fn bind(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let filter = CommandFilter::from_config(&config.filter)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let addr = config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let shells = ShellProcessManager::new(&config.shell);
        let admission = match config.server.max_sessions {
            0 => None,
            cap => Some(Arc::new(Semaphore::new(cap))),
        };
        let health_path = Some(config.server.health_path.clone()).filter(|p| !p.is_empty());

        info!(
            addr = %listener.local_addr()?,
            shell = %shells.program(),
            rules = filter.rules().len(),
            max_sessions = config.server.max_sessions,
            "termbridge listening"
        );
        if admission.is_none() {
            debug!("no session cap configured; every connection spawns a shell");
        }

        Ok(Self {
            listener,
            ctx: Arc::new(ServerContext {
                shells,
                filter: Arc::new(filter),
                options: Arc::new(SessionOptions::from_config(config)),
                admission,
                health_path,
            }),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        handle_stream(stream, peer, ctx).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

async fn handle_stream(mut stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    if let Some(path) = &ctx.health_path {
        if is_health_probe(&stream, path).await {
            if let Err(e) = answer_health_probe(&mut stream).await {
                debug!(peer = %peer, error = %e, "health probe response failed");
            }
            return;
        }
    }

    let ws = match tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "WS handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "WS handshake timeout ({}s)", HANDSHAKE_TIMEOUT.as_secs());
            return;
        }
    };

    ctx.on_connect(ws, peer).await;
}

impl ServerContext {
    /// One accepted channel: admit it, spawn its shell, relay until done.
    async fn on_connect(&self, mut ws: WebSocketStream<TcpStream>, peer: SocketAddr) {
        // Held for the whole session; released on drop.
        let _permit = match &self.admission {
            Some(slots) => match slots.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(peer = %peer, "Session cap reached, refusing connection");
                    let _ = close_with_error(&mut ws, "server is at capacity", CloseCode::Again).await;
                    return;
                }
            },
            None => None,
        };

        let session = match ConnectionSession::open(
            ws,
            &self.shells,
            self.filter.clone(),
            self.options.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(peer = %peer, error = %e, "Shell spawn failed, connection closed");
                return;
            }
        };

        info!(
            peer = %peer,
            session = %session.id().short(),
            pid = ?session.shell_pid(),
            "Connection opened"
        );
        let session_id = session.id().clone();
        let end = session.run().await;
        info!(peer = %peer, session = %session_id.short(), reason = %end, "Connection closed");
    }
}

/// Sniff the request line without consuming it.
async fn is_health_probe(stream: &TcpStream, path: &str) -> bool {
    let mut buf = [0u8; 1024];
    let n = match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.peek(&mut buf)).await {
        Ok(Ok(n)) => n,
        _ => return false,
    };

    let head = String::from_utf8_lossy(&buf[..n]);
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    if request_line.next() != Some("GET") || request_line.next() != Some(path) {
        return false;
    }
    !head.to_ascii_lowercase().contains("upgrade: websocket")
}

async fn answer_health_probe(stream: &mut TcpStream) -> std::io::Result<()> {
    // Drain the request so closing the socket sends FIN, not RST.
    let mut discard = [0u8; 1024];
    let _ = stream.read(&mut discard).await?;

    let body = serde_json::json!({ "status": "ok" }).to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
