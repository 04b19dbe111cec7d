//! Error types for the session layer.
//!
//! Connection problems never show up here: the session turns them into
//! lifecycle events. What remains is the durable identity storage.

use std::path::PathBuf;

/// Errors from reading or writing the persisted player identity.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity file could not be read or written.
    #[error("identity storage I/O failed at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The identity file exists but is not the expected JSON object.
    #[error("identity storage is corrupt: {0}")]
    StorageFormat(#[from] serde_json::Error),

    /// The platform has no per-user data directory to keep the identity in.
    #[error("no data directory available for identity storage")]
    NoStorageLocation,
}
