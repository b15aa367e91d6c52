use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const FRAME_TERMINATOR: u8 = b'\0';
pub const ACCEPT_VERSION: &str = "1.2";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
    Unknown(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
            Command::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "CONNECT" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => Command::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without terminator: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame has no command line")]
    MissingCommand,
    #[error("frame text contains the terminator byte")]
    EmbeddedTerminator,
}

/// One protocol message: a command, its headers in wire order, and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    pub fn new(command: Command, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            command,
            headers,
            body: body.into(),
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// First value recorded for `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Wire text without the terminator; the transport appends it.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            out.push_str(key);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

fn header(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

pub fn connect(host: &str, login: &str, passcode: &str) -> Frame {
    Frame::new(
        Command::Connect,
        vec![
            header("accept-version", ACCEPT_VERSION),
            header("host", host),
            header("login", login),
            header("passcode", passcode),
        ],
        "",
    )
}

pub fn subscribe(destination: &str, subscription_id: u64, receipt_id: u64) -> Frame {
    Frame::new(
        Command::Subscribe,
        vec![
            header("destination", destination),
            header("id", subscription_id),
            header("receipt", receipt_id),
        ],
        "",
    )
}

pub fn unsubscribe(subscription_id: u64, receipt_id: u64) -> Frame {
    Frame::new(
        Command::Unsubscribe,
        vec![header("id", subscription_id), header("receipt", receipt_id)],
        "",
    )
}

pub fn disconnect(receipt_id: u64) -> Frame {
    Frame::new(Command::Disconnect, vec![header("receipt", receipt_id)], "")
}

pub fn send(destination: &str, body: impl Into<String>) -> Frame {
    Frame::new(Command::Send, vec![header("destination", destination)], body)
}

/// Parses one frame already split from the stream on its terminator.
///
/// The body is everything after the first blank line, verbatim; it is never
/// scanned for headers. Unknown commands and header names are kept.
pub fn decode(text: &str) -> Result<Frame, FrameError> {
    let text = text.strip_suffix(FRAME_TERMINATOR as char).unwrap_or(text);
    let (command_line, mut rest) = match text.split_once('\n') {
        Some((line, rest)) => (line, rest),
        None => (text, ""),
    };
    let command_line = command_line.trim_end_matches('\r');
    if command_line.trim().is_empty() {
        return Err(FrameError::MissingCommand);
    }

    let mut headers = Vec::new();
    loop {
        if rest.is_empty() {
            break;
        }
        let (line, tail) = match rest.split_once('\n') {
            Some((line, tail)) => (line, tail),
            None => (rest, ""),
        };
        rest = tail;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((key, value)) => headers.push((key.to_string(), value.to_string())),
            None => headers.push((line.to_string(), String::new())),
        }
    }

    Ok(Frame::new(Command::parse(command_line), headers, rest))
}

/// Frame bytes as written to the stream: text plus one terminator.
pub fn to_wire(text: &str, max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    if text.as_bytes().contains(&FRAME_TERMINATOR) {
        return Err(FrameError::EmbeddedTerminator);
    }
    if text.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: text.len(),
            max: max_frame_bytes,
        });
    }
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(FRAME_TERMINATOR);
    Ok(bytes)
}

#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub frames: Vec<String>,
    pub errors: Vec<FrameError>,
}

/// Splits an inbound byte stream on the terminator byte.
pub struct NulFrameDecoder {
    max_frame_bytes: usize,
    pending: Vec<u8>,
}

impl NulFrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(idx) = self.pending.iter().position(|byte| *byte == FRAME_TERMINATOR) {
            let mut frame = self.pending.drain(..=idx).collect::<Vec<u8>>();
            frame.pop();
            // Servers commonly emit a newline between frames.
            let start = frame
                .iter()
                .position(|byte| !matches!(byte, b'\n' | b'\r'))
                .unwrap_or(frame.len());
            if start == frame.len() {
                continue;
            }
            let frame = &frame[start..];
            if frame.len() > self.max_frame_bytes {
                report.errors.push(FrameError::OversizedFrame {
                    size: frame.len(),
                    max: self.max_frame_bytes,
                });
                continue;
            }
            report
                .frames
                .push(String::from_utf8_lossy(frame).into_owned());
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        report
    }
}

impl Default for NulFrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
