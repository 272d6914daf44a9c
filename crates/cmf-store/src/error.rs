//! Error types for object store operations.

use cmf_core::{HashAlgo, ObjectId};

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The id was produced by a different hash algorithm than the store uses.
    #[error("object {id} is a {found} id, store uses {expected}")]
    AlgoMismatch {
        id: ObjectId,
        expected: HashAlgo,
        found: HashAlgo,
    },

    /// Stored bytes could not be decoded (bad header, short content).
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
