//! Transport abstraction layer for mobcast.
//!
//! Provides the [`Transport`] trait that abstracts over the two ways a
//! controller can reach the host: a raw TCP byte stream
//! ([`StreamTransport`]) or a WebSocket message socket
//! ([`MessageTransport`]). [`Backend`] picks one at startup from the
//! runtime's [`Capabilities`].
//!
//! Backends fail fast. Connect refusals, read errors and abrupt closes
//! all surface as a single failure signal for the session layer to act on.

#![allow(async_fn_in_trait)]

mod backend;
mod error;
mod message;
mod stream;

pub use backend::Backend;
pub use error::TransportError;
pub use message::MessageTransport;
pub use stream::StreamTransport;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Default TCP port of the host's stream listener.
pub const DEFAULT_STREAM_PORT: u16 = 7777;

/// Default port of the host's WebSocket listener.
pub const DEFAULT_MESSAGE_PORT: u16 = 7778;

/// Default request path of the host's WebSocket listener.
pub const DEFAULT_MESSAGE_PATH: &str = "/mobile";

/// Upper bound on bytes read per delivery unit (1 MiB).
///
/// The stream backend reads into a buffer of this size; the message
/// backend drains at most this many bytes per tick.
pub const READ_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Which concrete backend carries a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Raw bidirectional TCP stream.
    Stream,
    /// Persistent message socket (WebSocket).
    Message,
}

impl TransportKind {
    /// Picks the backend kind a runtime with the given capabilities should use.
    pub fn preferred(caps: Capabilities) -> Self {
        if caps.raw_sockets {
            Self::Stream
        } else {
            Self::Message
        }
    }

    /// The host's default port for this kind.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Stream => DEFAULT_STREAM_PORT,
            Self::Message => DEFAULT_MESSAGE_PORT,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Message => f.write_str("message"),
        }
    }
}

/// What the current runtime environment can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether raw TCP sockets are reachable from this process.
    pub raw_sockets: bool,
}

impl Capabilities {
    /// Inspects the running environment.
    ///
    /// Browser-hosted (wasm) runtimes only expose message sockets.
    pub fn detect() -> Self {
        Self {
            raw_sockets: !cfg!(target_family = "wasm"),
        }
    }
}

/// A remote host endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Backend that should carry the connection.
    pub kind: TransportKind,
    /// Host address (dotted-quad IPv4 when parsed from user input).
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Request path. Only meaningful for [`TransportKind::Message`].
    pub path: String,
}

impl Endpoint {
    /// Creates a stream endpoint.
    pub fn stream(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: TransportKind::Stream,
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    /// Creates a message endpoint with the given request path.
    pub fn message(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            kind: TransportKind::Message,
            host: host.into(),
            port,
            path,
        }
    }

    /// `host:port`, as handed to the socket layer.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL for message endpoints.
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportKind::Stream => write!(f, "{}:{}", self.host, self.port),
            TransportKind::Message => f.write_str(&self.url()),
        }
    }
}

/// Readiness of a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A [`ReadyState`] shared between a backend and its background task.
#[derive(Debug, Clone)]
pub(crate) struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub(crate) fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    pub(crate) fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ReadyState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// How a backend reports its lifecycle to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signalling {
    /// Lifecycle changes arrive as [`TransportEvent::Opened`],
    /// [`TransportEvent::Failed`] and [`TransportEvent::Closed`].
    Push,
    /// Only [`TransportEvent::Data`] is pushed; the session must poll
    /// [`Transport::ready_state`] once per tick to see open/close.
    Polled,
}

/// Something a backend produced since the last drain.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection finished opening.
    Opened,
    /// One delivery unit of inbound bytes.
    Data(Vec<u8>),
    /// The connection failed (connect refusal, read error).
    Failed(TransportError),
    /// The remote side closed the connection.
    Closed,
}

/// A client-side connection backend.
///
/// Opening is non-blocking: [`open`](Transport::open) starts the attempt
/// and its outcome is observed later through [`drain`](Transport::drain)
/// or [`ready_state`](Transport::ready_state), depending on
/// [`signalling`](Transport::signalling). At most one connection is live
/// per backend; opening again tears down the previous one.
pub trait Transport: Send + 'static {
    /// The backend kind, used to build endpoints and pick framing.
    fn kind(&self) -> TransportKind;

    /// How this backend reports open/close.
    fn signalling(&self) -> Signalling;

    /// Starts connecting to `endpoint`.
    ///
    /// Returns an error only if the attempt could not even be started.
    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Writes one frame, flushing it before returning.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Closes the live connection, if any. Pending inbound data is discarded.
    fn close(&mut self);

    /// Current readiness.
    fn ready_state(&self) -> ReadyState;

    /// Takes everything produced since the previous drain, oldest first.
    fn drain(&mut self) -> Vec<TransportEvent>;
}
