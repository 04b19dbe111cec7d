//! Error types for the protocol layer.
//!
//! None of these are fatal. The frame decoder logs a `ProtocolError`
//! and drops the offending frame; the connection-string and deep-link
//! parsers hand theirs back to whoever supplied the input.

/// Errors that can occur while decoding frames or parsing user input.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame's tag is not one the controller understands.
    #[error("unknown frame tag {0:?}")]
    UnknownTag(String),

    /// The frame has a known tag but its fields don't fit the format.
    #[error("malformed {tag} frame: {reason}")]
    Malformed { tag: String, reason: String },

    /// A binary frame declared more payload than its delivery unit holds.
    #[error("{tag} frame declares {declared} payload bytes but only {available} arrived")]
    LengthMismatch {
        tag: String,
        declared: usize,
        available: usize,
    },

    /// A base64 payload (binary frame or deep link) did not decode.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A connection string failed validation.
    #[error("invalid connection string {input:?}: {reason}")]
    InvalidConnectionString { input: String, reason: String },

    /// A deep link could not be turned into a connection string.
    #[error("invalid deep link: {0}")]
    InvalidDeepLink(String),
}

impl ProtocolError {
    pub(crate) fn malformed(tag: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            tag: tag.to_owned(),
            reason: reason.into(),
        }
    }
}
