//! Shared helpers for session and server tests.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use termbridge_config::ShellConfig;
use termbridge_shell::ShellProcessManager;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Plain `/bin/sh`, no login scripts.
pub(crate) fn sh_config() -> ShellConfig {
    ShellConfig {
        program: "/bin/sh".into(),
        login_shell: false,
        ..Default::default()
    }
}

pub(crate) fn sh_manager() -> ShellProcessManager {
    ShellProcessManager::new(&sh_config())
}

/// In-memory WebSocket pair: `(server side, client side)`.
pub(crate) async fn ws_pair() -> (
    WebSocketStream<DuplexStream>,
    WebSocketStream<DuplexStream>,
) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
    (server, client)
}

/// Accumulate text frames until `needle` shows up or the timeout passes.
pub(crate) async fn read_until<S>(ws: &mut WebSocketStream<S>, needle: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut output = String::new();
    let _ = tokio::time::timeout(READ_TIMEOUT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                output.push_str(text.as_str());
                if output.contains(needle) {
                    break;
                }
            }
        }
    })
    .await;
    output
}

/// Every text frame received within `window`, stopping early on close.
pub(crate) async fn collect_for<S>(ws: &mut WebSocketStream<S>, window: Duration) -> Vec<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut texts = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => texts.push(text.as_str().to_owned()),
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
    .await;
    texts
}

/// True once the server has closed the channel.
pub(crate) async fn wait_closed<S>(ws: &mut WebSocketStream<S>) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(READ_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap_or(false)
}

/// Poll `/proc` until the process is reaped.
#[cfg(target_os = "linux")]
pub(crate) async fn process_gone(pid: u32) -> bool {
    let path = format!("/proc/{pid}");
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if !std::path::Path::new(&path).exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Pull the first run of digits following `prefix` out of shell output.
pub(crate) fn number_after(output: &str, prefix: &str) -> Option<u32> {
    output.match_indices(prefix).find_map(|(i, _)| {
        let digits: String = output[i + prefix.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}
