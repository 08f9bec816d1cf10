//! Bridge wire protocol.
//!
//! Client frames are raw shell input, except text frames holding a JSON
//! object with a string `type` field. Those are control envelopes and are
//! never written to a shell. Server frames are raw shell output plus plain
//! text notices.

use serde::Deserialize;
use serde_json::Value;

/// Control envelopes the bridge understands.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlRequest {
    Resize { cols: u16, rows: u16 },
}

/// How a client text frame should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `{"type":"resize","cols":N,"rows":M}`
    Resize { cols: u16, rows: u16 },
    /// An envelope with a `type` nobody handles.
    Unknown(String),
    /// A recognised envelope with bad fields.
    Invalid(String),
    /// Plain shell input.
    Input,
}

/// Classify one client text frame.
pub fn classify(text: &str) -> ClientMessage {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return ClientMessage::Input;
    }

    let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) else {
        return ClientMessage::Input;
    };
    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return ClientMessage::Input;
    };

    match serde_json::from_value::<ControlRequest>(value) {
        Ok(ControlRequest::Resize { cols, rows }) => {
            if cols == 0 || rows == 0 {
                ClientMessage::Invalid("resize dimensions must be > 0".into())
            } else {
                ClientMessage::Resize { cols, rows }
            }
        }
        Err(_) if kind != "resize" => ClientMessage::Unknown(kind),
        Err(e) => ClientMessage::Invalid(format!("malformed {kind} envelope: {e}")),
    }
}

/// Line sent back in place of blocked input.
pub fn rejection_notice(message: &str, reason: &str) -> String {
    format!("{message} ({reason})\r\n")
}

/// Single line sent before the server closes a channel on error.
pub fn error_notice(detail: &str) -> String {
    format!("Error: {detail}\r\n")
}

/// The line currently being typed into the shell, tracked across frames.
///
/// Keystroke clients send one character per frame, so a command only
/// becomes checkable once the frames are put back together. Backspace,
/// Ctrl-C and Ctrl-U edit the tracked line the way a line editor would;
/// other control bytes are ignored.
#[derive(Debug, Default)]
pub struct InputLine {
    pending: String,
}

impl InputLine {
    /// The lines `chunk` would produce: the carried partial line extended by
    /// `chunk`, every line it completes, and the new partial line last.
    pub fn lines_with(&self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = self.pending.clone();
        for c in chunk.chars() {
            match c {
                '\r' | '\n' => lines.push(std::mem::take(&mut current)),
                '\u{7f}' | '\u{8}' => {
                    current.pop();
                }
                '\u{3}' | '\u{15}' => current.clear(),
                '\t' => current.push(c),
                c if c.is_control() => {}
                c => current.push(c),
            }
        }
        lines.push(current);
        lines
    }

    /// Accept `chunk` as delivered to the shell.
    pub fn advance(&mut self, chunk: &str) {
        self.pending = self.lines_with(chunk).pop().unwrap_or_default();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Incremental UTF-8 decoding for shell output.
///
/// PTY reads can split a multi-byte character; the incomplete tail is held
/// until the next chunk instead of being replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left, lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
