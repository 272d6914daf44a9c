//! Error types for manifest parsing and streaming.

use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use cmf_store::StoreError;
use std::io;

/// Errors in the manifest wire format. Always fatal to the current parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("manifest has no terminated version line")]
    MissingVersion,

    /// Version below 1 or not a decimal number: the manifest is corrupt.
    #[error("invalid manifest version {0:?}")]
    InvalidVersion(String),

    /// Version newer than anything this build understands.
    #[error("unsupported manifest version {found} (newest supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("manifest has no terminated size line")]
    MissingSize,

    #[error("manifest has no terminated chunk count line")]
    MissingChunkCount,

    #[error("invalid {field} {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// A non-empty chunk line that is not a canonical hash.
    #[error("malformed chunk hash at byte {offset}: {line:?}")]
    MalformedHash { offset: usize, line: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest format error: {0}")]
    Format(#[from] FormatError),

    #[error("object {id} is a {found}, expected a {expected}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },

    /// A chunk id does not use the hash algorithm of the manifest being built.
    #[error("chunk {id} is a {found} id, manifest uses {expected}")]
    MixedAlgo {
        id: ObjectId,
        expected: HashAlgo,
        found: HashAlgo,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("manifest {id} declares {expected} bytes but only {actual} could be read")]
    Truncated {
        id: ObjectId,
        expected: u64,
        actual: u64,
    },

    #[error("manifest {id} declares {size} bytes, too large to buffer in memory")]
    TooLarge { id: ObjectId, size: u64 },

    #[error("stream filter failed: {0}")]
    Filter(#[source] io::Error),

    #[error("writing output: {0}")]
    Io(#[source] io::Error),
}

impl From<ManifestError> for io::Error {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::Store(StoreError::Io(e)) | ManifestError::Io(e) => e,
            other => {
                let kind = match &other {
                    ManifestError::Store(StoreError::NotFound(_)) => io::ErrorKind::NotFound,
                    ManifestError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
                    ManifestError::Format(_)
                    | ManifestError::TypeMismatch { .. }
                    | ManifestError::Store(StoreError::Corrupt { .. }) => io::ErrorKind::InvalidData,
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, other)
            }
        }
    }
}
