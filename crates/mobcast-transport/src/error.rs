/// Errors that can occur in the transport layer.
///
/// Every variant is reported to the session as the same "transport failed"
/// signal. Backends never retry on their own.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote endpoint could not be reached.
    #[error("connect to {endpoint} failed: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A send was attempted before the connection finished opening.
    #[error("transport is not open")]
    NotOpen,

    /// No Tokio runtime was available to drive the backend.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}
