//! One client channel bound to one shell process.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use termbridge_common::SessionId;
use termbridge_config::BridgeConfig;
use termbridge_shell::{
    CommandFilter, FilterDecision, ShellError, ShellEvent, ShellProcess, ShellProcessManager,
};

use crate::protocol::{self, ClientMessage, InputLine, Utf8Decoder};

/// Per-session behaviour shared by every session of a server.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Terminate input payloads with `\n` when they lack one.
    pub append_newline: bool,
    /// Prefix of the notice sent when input is blocked.
    pub rejection_message: String,
}

impl SessionOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            append_newline: config.session.append_newline,
            rejection_message: config.filter.rejection_message.clone(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent a close frame or hung up.
    ClientClosed,
    /// The transport failed; handled like a client close.
    ChannelError(String),
    /// The shell exited on its own.
    ShellExited(Option<u32>),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ClientClosed => write!(f, "client closed"),
            SessionEnd::ChannelError(e) => write!(f, "channel error: {e}"),
            SessionEnd::ShellExited(Some(code)) => write!(f, "shell exited with {code}"),
            SessionEnd::ShellExited(None) => write!(f, "shell exited"),
        }
    }
}

/// Ctrl-U: erase the line being edited.
const LINE_KILL: &[u8] = b"\x15";

enum Flow {
    Continue,
    Close,
}

/// Bridges exactly one WebSocket to exactly one shell.
///
/// The session owns both ends. Whichever side finishes first, the other is
/// closed before [`run`](Self::run) returns, so no channel outlives its
/// shell and no shell outlives its channel.
pub struct ConnectionSession<S> {
    id: SessionId,
    sink: SplitSink<WebSocketStream<S>, Message>,
    stream: SplitStream<WebSocketStream<S>>,
    shell: ShellProcess,
    filter: Arc<CommandFilter>,
    options: Arc<SessionOptions>,
    decoder: Utf8Decoder,
    line: InputLine,
    created_at: Instant,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Spawn a shell for `ws`.
    ///
    /// If the shell cannot be started the client gets one error line, the
    /// channel is closed and the spawn error is returned.
    pub async fn open(
        ws: WebSocketStream<S>,
        shells: &ShellProcessManager,
        filter: Arc<CommandFilter>,
        options: Arc<SessionOptions>,
    ) -> Result<Self, ShellError> {
        let (mut sink, stream) = ws.split();

        let shell = match shells.spawn() {
            Ok(shell) => shell,
            Err(e) => {
                let detail = format!("failed to start shell: {e}");
                if let Err(send_err) = close_with_error(&mut sink, &detail, CloseCode::Error).await {
                    debug!("could not report spawn failure: {send_err}");
                }
                return Err(e);
            }
        };

        Ok(Self {
            id: SessionId::new(),
            sink,
            stream,
            shell,
            filter,
            options,
            decoder: Utf8Decoder::default(),
            line: InputLine::default(),
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn shell_pid(&self) -> Option<u32> {
        self.shell.pid()
    }

    /// Relay until either side finishes, then tear down the other side.
    pub async fn run(mut self) -> SessionEnd {
        let end = loop {
            tokio::select! {
                event = self.shell.next_event() => match event {
                    ShellEvent::Output(bytes) => {
                        if let Err(e) = self.on_shell_output(&bytes).await {
                            break SessionEnd::ChannelError(e.to_string());
                        }
                    }
                    ShellEvent::Exited(code) => break SessionEnd::ShellExited(code),
                },
                frame = self.stream.next() => match frame {
                    Some(Ok(msg)) => match self.on_client_message(msg).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close) => break SessionEnd::ClientClosed,
                        Err(e) => break SessionEnd::ChannelError(e.to_string()),
                    },
                    Some(Err(e)) => break SessionEnd::ChannelError(e.to_string()),
                    None => break SessionEnd::ClientClosed,
                },
            }
        };

        self.shutdown(&end).await;

        info!(
            session = %self.id.short(),
            pid = ?self.shell.pid(),
            reason = %end,
            uptime_ms = self.created_at.elapsed().as_millis() as u64,
            "Session closed"
        );
        end
    }

    /// Forward shell output verbatim, in order.
    async fn on_shell_output(&mut self, bytes: &[u8]) -> Result<(), WsError> {
        let text = self.decoder.decode(bytes);
        if text.is_empty() {
            return Ok(());
        }
        self.sink.send(Message::Text(text.into())).await
    }

    async fn on_client_message(&mut self, msg: Message) -> Result<Flow, WsError> {
        match msg {
            Message::Text(text) => self.on_payload(text.as_bytes()).await,
            Message::Binary(data) => self.on_payload(&data).await,
            Message::Ping(data) => {
                self.sink.send(Message::Pong(data)).await?;
                Ok(Flow::Continue)
            }
            Message::Close(_) => Ok(Flow::Close),
            Message::Pong(_) | Message::Frame(_) => Ok(Flow::Continue),
        }
    }

    /// Control envelopes are recognised in text and binary frames alike.
    async fn on_payload(&mut self, raw: &[u8]) -> Result<Flow, WsError> {
        let message = std::str::from_utf8(raw)
            .map(protocol::classify)
            .unwrap_or(ClientMessage::Input);

        match message {
            ClientMessage::Resize { cols, rows } => {
                match self.shell.resize(cols, rows) {
                    Ok(()) => debug!(session = %self.id.short(), cols, rows, "resized"),
                    Err(e) => warn!(session = %self.id.short(), "resize failed: {e}"),
                }
                Ok(Flow::Continue)
            }
            ClientMessage::Invalid(reason) => {
                warn!(session = %self.id.short(), "ignoring control message: {reason}");
                Ok(Flow::Continue)
            }
            ClientMessage::Unknown(kind) => {
                debug!(session = %self.id.short(), kind = %kind, "ignoring unknown control message");
                Ok(Flow::Continue)
            }
            ClientMessage::Input => self.forward_input(raw).await,
        }
    }

    /// Filter, then write to the shell. Blocked input is answered with a
    /// notice and the shell receives nothing.
    ///
    /// Lines are judged when they are terminated, as assembled across
    /// frames, so a command typed one keystroke at a time is checked before
    /// the keystroke that would run it reaches the shell. The shell's copy
    /// of a blocked partial line is discarded with Ctrl-U.
    async fn forward_input(&mut self, raw: &[u8]) -> Result<Flow, WsError> {
        let mut bytes = raw.to_vec();
        if self.options.append_newline && !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let mut lines = self.line.lines_with(&text);
        // The unterminated tail is checked once its line ends.
        lines.pop();
        if let FilterDecision::Blocked { reason } = self.filter.check_input(&lines.join("\n")) {
            info!(session = %self.id.short(), reason = %reason, "Input blocked");
            if !self.line.is_empty() {
                let _ = self.shell.write(LINE_KILL);
            }
            self.line.clear();
            let notice = protocol::rejection_notice(&self.options.rejection_message, &reason);
            self.sink.send(Message::Text(notice.into())).await?;
            return Ok(Flow::Continue);
        }
        self.line.advance(&text);

        // A dead shell surfaces through `next_event` on the next turn.
        if let Err(e) = self.shell.write(&bytes) {
            debug!(session = %self.id.short(), "input dropped: {e}");
        }
        Ok(Flow::Continue)
    }

    async fn shutdown(&mut self, end: &SessionEnd) {
        match end {
            SessionEnd::ShellExited(_) => {
                let tail = self.decoder.finish();
                if !tail.is_empty() {
                    let _ = self.sink.send(Message::Text(tail.into())).await;
                }
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "shell exited".into(),
                };
                let _ = self.sink.send(Message::Close(Some(frame))).await;
                let _ = self.sink.close().await;
            }
            SessionEnd::ClientClosed => {
                self.shell.kill();
                let _ = self.sink.close().await;
            }
            SessionEnd::ChannelError(_) => {
                self.shell.kill();
            }
        }
    }
}

/// Send one error line followed by a close frame.
pub async fn close_with_error<Si>(sink: &mut Si, detail: &str, code: CloseCode) -> Result<(), WsError>
where
    Si: Sink<Message, Error = WsError> + Unpin,
{
    sink.send(Message::Text(protocol::error_notice(detail).into()))
        .await?;
    let frame = CloseFrame {
        code,
        reason: "".into(),
    };
    sink.send(Message::Close(Some(frame))).await?;
    sink.close().await
}
