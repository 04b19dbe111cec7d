//! Unified error type for the mobcast meta-crate.

use mobcast_protocol::ProtocolError;
use mobcast_session::SessionError;
use mobcast_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// The `#[from]` conversions let `?` lift sub-crate errors, so callers
/// of the meta-crate only match on this one type.
#[derive(Debug, thiserror::Error)]
pub enum MobcastError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Bad connection string or deep link.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Another [`Controller`](crate::Controller) is still alive in this
    /// process.
    #[error("a controller is already active in this process")]
    AlreadyActive,

    #[error("logging already initialised: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
