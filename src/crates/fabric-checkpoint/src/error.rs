//! Error types for checkpoint store operations.

use thiserror::Error;

/// Result type for checkpoint store operations.
pub type Result<T> = std::result::Result<T, CheckpointStoreError>;

/// Errors that can occur while loading or persisting a node's checkpoint marker.
///
/// Per the store's failure semantics, a missing entry is not an error (see
/// [`crate::CheckpointStore::load`]); these variants cover genuine I/O and
/// protocol failures, which are fatal to the owning node.
#[derive(Error, Debug)]
pub enum CheckpointStoreError {
    /// The marker file could not be read or written.
    #[error("checkpoint I/O error for {name}: {source}")]
    Io {
        /// Node identity the checkpoint belongs to.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The atomic rename step of a write failed after the temp file was written.
    #[error("checkpoint rename failed for {name}: {source}")]
    Rename {
        /// Node identity the checkpoint belongs to.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}
