//! Local bus shared by the daemon and its clients.
//!
//! The daemon owns the serial link and listens on a Unix domain socket named
//! after [`BUS_NAME`]. Messages are newline-delimited JSON. A client first
//! addresses the service at [`OBJECT_PATH`], then issues one call per line:
//!
//! ```text
//! {"call":"hello","object_path":"/com/pseudoberries/Bulby"}
//! {"call":"color","red":255,"green":0,"blue":0}
//! {"call":"tone","frequency":440}
//! ```
//!
//! Every line is answered with `{"reply":"ok"}` or
//! `{"reply":"err","message":"..."}`. Connections are served one at a time,
//! so a client running an animation has the device to itself until it
//! disconnects; other clients wait in the listen backlog.

use core::fmt;
use core::time::Duration;
use std::io::{self, Read, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::colors::Color;
use crate::command::{DeviceCommand, MAX_TONE_HZ};
use crate::error::{LinkError, RangeError};
use crate::interrupt::CancelToken;
use crate::sequencer::{DeviceLink, Sequencer};
use crate::time::Pacer;

/// Name the service is registered under.
pub const BUS_NAME: &str = "com.pseudoberries.Bulby";

/// Object path clients address.
pub const OBJECT_PATH: &str = "/com/pseudoberries/Bulby";

/// How often blocked accepts and reads recheck for cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest message line accepted.
pub const MAX_LINE_LEN: usize = 256;

const METHODS: [&str; 3] = ["hello", "color", "tone"];

/// Socket path for the bus: `$XDG_RUNTIME_DIR/<BUS_NAME>.sock`, or the
/// temporary directory when no runtime directory is set.
pub fn default_socket_path() -> PathBuf {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("{BUS_NAME}.sock"))
}

// ============================================================================
// Messages
// ============================================================================

/// Calls sent by bus clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum BusCall {
    /// Addresses the service. Must be the first message of a connection.
    Hello { object_path: String },

    /// Sets a color. Channels above 255 are clamped.
    Color { red: u32, green: u32, blue: u32 },

    /// Plays a tone in Hz, 0 silences.
    Tone { frequency: u32 },
}

impl BusCall {
    /// The greeting addressing [`OBJECT_PATH`].
    pub fn hello() -> Self {
        BusCall::Hello {
            object_path: OBJECT_PATH.to_string(),
        }
    }

    /// Decodes a request line.
    ///
    /// Requests naming a method this service does not provide fail with
    /// [`BusError::UnknownMethod`], so callers can skip them and go on.
    pub fn parse(line: &str) -> Result<Self, BusError> {
        let value: serde_json::Value = serde_json::from_str(line).map_err(BusError::Malformed)?;
        let method = value
            .get("call")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        serde_json::from_value(value).map_err(|err| match method {
            Some(method) if METHODS.contains(&method.as_str()) => BusError::BadArguments {
                method,
                reason: err.to_string(),
            },
            Some(method) => BusError::UnknownMethod(method),
            None => BusError::Malformed(err),
        })
    }
}

impl From<DeviceCommand> for BusCall {
    fn from(command: DeviceCommand) -> Self {
        match command {
            DeviceCommand::Color([r, g, b]) => BusCall::Color {
                red: r.into(),
                green: g.into(),
                blue: b.into(),
            },
            DeviceCommand::Tone(frequency) => BusCall::Tone {
                frequency: frequency.into(),
            },
        }
    }
}

impl fmt::Display for BusCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusCall::Hello { object_path } => write!(f, "hello {object_path}"),
            BusCall::Color { red, green, blue } => write!(f, "color {red} {green} {blue}"),
            BusCall::Tone { frequency } => write!(f, "tone {frequency}"),
        }
    }
}

/// Answers sent by the daemon, one per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum BusReply {
    Ok,
    Err { message: String },
}

impl From<Result<(), BusError>> for BusReply {
    fn from(result: Result<(), BusError>) -> Self {
        match result {
            Ok(()) => BusReply::Ok,
            Err(err) => BusReply::Err {
                message: err.to_string(),
            },
        }
    }
}

/// Errors answered to bus clients.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("malformed request: {0}")]
    Malformed(serde_json::Error),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("bad arguments for '{method}': {reason}")]
    BadArguments { method: String, reason: String },

    #[error("unknown object path '{0}'")]
    UnknownObject(String),

    #[error("connection must first address {}", OBJECT_PATH)]
    NotAddressed,

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

// ============================================================================
// Line framing
// ============================================================================

enum Line {
    Text(String),
    Eof,
    Cancelled,
}

/// Splits a byte stream into trimmed lines.
///
/// Reads that time out recheck the cancel token, so sockets read through it
/// need a read timeout to stay cancellable. A last line without a newline is
/// returned at end of stream.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn next_line<R: Read>(&mut self, reader: &mut R, cancel: &CancelToken) -> io::Result<Line> {
        let mut buf = [0u8; MAX_LINE_LEN];
        loop {
            if let Some(end) = self.pending.iter().position(|&byte| byte == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(Line::Text(String::from_utf8_lossy(&raw).trim().to_string()));
            }
            if self.pending.len() > MAX_LINE_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line longer than {MAX_LINE_LEN} bytes"),
                ));
            }

            match reader.read(&mut buf) {
                Ok(0) if self.pending.is_empty() => return Ok(Line::Eof),
                Ok(0) => {
                    let raw = std::mem::take(&mut self.pending);
                    return Ok(Line::Text(String::from_utf8_lossy(&raw).trim().to_string()));
                }
                Ok(read) => self.pending.extend_from_slice(&buf[..read]),
                Err(err)
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    if cancel.is_cancelled() {
                        return Ok(Line::Cancelled);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }
}

fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

// ============================================================================
// Daemon
// ============================================================================

/// The daemon side of the bus: forwards calls to a sequencer.
pub struct BusService<L: DeviceLink, P: Pacer> {
    sequencer: Sequencer<L, P>,
    cancel: CancelToken,
}

impl<L: DeviceLink, P: Pacer> BusService<L, P> {
    /// Creates a service stopping when the sequencer's cancel token fires.
    pub fn new(sequencer: Sequencer<L, P>) -> Self {
        let cancel = sequencer.cancel_token().clone();
        Self { sequencer, cancel }
    }

    /// Executes one call. Color channels are clamped to 0-255, tones above
    /// 65535 are rejected.
    pub fn call(&mut self, call: BusCall) -> Result<(), BusError> {
        match call {
            BusCall::Hello { object_path } if object_path == OBJECT_PATH => {}
            BusCall::Hello { object_path } => return Err(BusError::UnknownObject(object_path)),
            BusCall::Color { red, green, blue } => {
                let [r, g, b] = [red, green, blue].map(|c| c.min(255) as u8);
                self.sequencer.set_color(Color::from_rgb8(r, g, b))?;
            }
            BusCall::Tone { frequency } => {
                let frequency =
                    RangeError::check(i64::from(frequency), 0, i64::from(MAX_TONE_HZ))?;
                self.sequencer.set_tone(frequency as u16)?;
            }
        }
        Ok(())
    }

    /// Decodes and executes a request line, producing its reply.
    pub fn handle_line(&mut self, line: &str) -> BusReply {
        let result = BusCall::parse(line).and_then(|call| self.call(call));
        if let Err(err) = &result {
            match err {
                BusError::UnknownMethod(method) => {
                    tracing::warn!(method = %method, "ignoring unknown bus method")
                }
                _ => tracing::warn!(request = line, error = %err, "bus call failed"),
            }
        }
        BusReply::from(result)
    }

    /// Serves one client until it disconnects or the service is cancelled.
    ///
    /// Give sockets a read timeout, idle reads recheck cancellation when they
    /// time out.
    pub fn serve_connection<S: Read + Write>(&mut self, mut stream: S) -> io::Result<()> {
        let mut lines = LineBuffer::default();
        let mut addressed = false;

        while !self.cancel.is_cancelled() {
            let line = match lines.next_line(&mut stream, &self.cancel)? {
                Line::Text(line) => line,
                Line::Eof | Line::Cancelled => return Ok(()),
            };
            if line.is_empty() {
                continue;
            }

            if addressed {
                let reply = self.handle_line(&line);
                write_message(&mut stream, &reply)?;
                continue;
            }

            let greeting = match BusCall::parse(&line) {
                Ok(BusCall::Hello { object_path }) if object_path == OBJECT_PATH => Ok(()),
                Ok(BusCall::Hello { object_path }) => Err(BusError::UnknownObject(object_path)),
                Ok(_) => Err(BusError::NotAddressed),
                Err(err) => Err(err),
            };
            if let Err(err) = &greeting {
                tracing::warn!(error = %err, "rejecting client");
            }
            addressed = greeting.is_ok();
            write_message(&mut stream, &BusReply::from(greeting))?;
            if !addressed {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Accepts and serves clients one at a time until cancelled.
    pub fn serve(&mut self, listener: &BusListener) -> io::Result<()> {
        listener.inner.set_nonblocking(true)?;
        tracing::info!(socket = %listener.path.display(), "bus service listening");

        while !self.cancel.is_cancelled() {
            match listener.inner.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(POLL_INTERVAL))?;
                    tracing::info!("client connected");
                    if let Err(err) = self.serve_connection(&stream) {
                        tracing::warn!(error = %err, "client connection failed");
                    }
                    tracing::info!("client disconnected");
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }

        tracing::info!("bus service stopping");
        Ok(())
    }

    /// Resets the device and closes the link.
    pub fn shutdown(mut self) -> Result<(), LinkError> {
        let reset = self.sequencer.reset();
        let close = self.sequencer.close();
        reset.and(close)
    }
}

/// A bound bus socket. The socket file is removed on drop.
pub struct BusListener {
    inner: UnixListener,
    path: PathBuf,
}

impl BusListener {
    /// Binds `path`, replacing a stale socket left by a previous daemon.
    ///
    /// Fails if a daemon still answers on `path`, or if `path` exists and is
    /// not a socket.
    pub fn bind(path: &Path) -> io::Result<Self> {
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if !metadata.file_type().is_socket() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a socket", path.display()),
                ));
            }
            if UnixStream::connect(path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("a daemon is already listening on {}", path.display()),
                ));
            }
            tracing::debug!(socket = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
        }

        let inner = UnixListener::bind(path)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BusListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ============================================================================
// Client
// ============================================================================

/// The client side of the bus: a [`DeviceLink`] forwarding to the daemon.
///
/// Waiting for a reply gives up with [`LinkError::Cancelled`] once `cancel`
/// fires, for example while the daemon is still busy with another client.
pub struct BusLink {
    stream: UnixStream,
    lines: LineBuffer,
    socket: PathBuf,
    cancel: CancelToken,
}

impl BusLink {
    /// Connects to the daemon at `socket` and addresses [`OBJECT_PATH`].
    pub fn connect(socket: &Path, cancel: &CancelToken) -> Result<Self, LinkError> {
        let connect_error = |source| LinkError::Connect {
            target: format!("bus socket {}", socket.display()),
            source,
        };

        let stream = UnixStream::connect(socket).map_err(connect_error)?;
        stream
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(connect_error)?;
        let mut link = Self {
            stream,
            lines: LineBuffer::default(),
            socket: socket.to_path_buf(),
            cancel: cancel.clone(),
        };

        link.request(&BusCall::hello())?;
        tracing::debug!(socket = %link.socket.display(), "connected to bus");
        Ok(link)
    }

    /// Path of the daemon socket.
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn request(&mut self, call: &BusCall) -> Result<(), LinkError> {
        let write_error = |source| LinkError::Write {
            command: call.to_string(),
            source,
        };

        write_message(&mut self.stream, call).map_err(write_error)?;

        let line = loop {
            match self
                .lines
                .next_line(&mut self.stream, &self.cancel)
                .map_err(write_error)?
            {
                Line::Text(line) if line.is_empty() => continue,
                Line::Text(line) => break line,
                Line::Eof => return Err(LinkError::Disconnected),
                Line::Cancelled => return Err(LinkError::Cancelled),
            }
        };

        match serde_json::from_str(&line).map_err(LinkError::MalformedReply)? {
            BusReply::Ok => Ok(()),
            BusReply::Err { message } => Err(LinkError::Rejected {
                command: call.to_string(),
                message,
            }),
        }
    }
}

impl DeviceLink for BusLink {
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
        self.request(&BusCall::from(*command))
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}
