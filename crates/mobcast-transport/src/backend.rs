//! Runtime-selected backend.

use tokio::runtime::Handle;

use crate::{
    Capabilities, Endpoint, MessageTransport, ReadyState, Signalling,
    StreamTransport, Transport, TransportError, TransportEvent, TransportKind,
};

/// One of the concrete backends, chosen once at startup.
pub enum Backend {
    Stream(StreamTransport),
    Message(MessageTransport),
}

impl Backend {
    /// Builds the backend for `kind` on the given runtime.
    pub fn for_kind(kind: TransportKind, runtime: Handle) -> Self {
        match kind {
            TransportKind::Stream => Self::Stream(StreamTransport::new(runtime)),
            TransportKind::Message => {
                Self::Message(MessageTransport::new(runtime))
            }
        }
    }

    /// Builds the backend the current environment supports.
    pub fn for_capabilities(caps: Capabilities, runtime: Handle) -> Self {
        let kind = TransportKind::preferred(caps);
        tracing::debug!(%kind, raw_sockets = caps.raw_sockets, "selected transport backend");
        Self::for_kind(kind, runtime)
    }
}

impl Transport for Backend {
    fn kind(&self) -> TransportKind {
        match self {
            Self::Stream(t) => t.kind(),
            Self::Message(t) => t.kind(),
        }
    }

    fn signalling(&self) -> Signalling {
        match self {
            Self::Stream(t) => t.signalling(),
            Self::Message(t) => t.signalling(),
        }
    }

    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        match self {
            Self::Stream(t) => t.open(endpoint),
            Self::Message(t) => t.open(endpoint),
        }
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Stream(t) => t.send(frame).await,
            Self::Message(t) => t.send(frame).await,
        }
    }

    fn close(&mut self) {
        match self {
            Self::Stream(t) => t.close(),
            Self::Message(t) => t.close(),
        }
    }

    fn ready_state(&self) -> ReadyState {
        match self {
            Self::Stream(t) => t.ready_state(),
            Self::Message(t) => t.ready_state(),
        }
    }

    fn drain(&mut self) -> Vec<TransportEvent> {
        match self {
            Self::Stream(t) => t.drain(),
            Self::Message(t) => t.drain(),
        }
    }
}
