//! Core trait and types for object storage.

use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use std::fmt;
use std::io::{self, Read};

use crate::error::StoreError;

/// A primitive streaming reader over one stored object.
///
/// Reading returns 0 at end of object. Dropping the stream closes it.
pub struct ObjectStream {
    kind: ObjectKind,
    size: u64,
    reader: Box<dyn Read + Send>,
}

impl ObjectStream {
    pub fn new(kind: ObjectKind, size: u64, reader: impl Read + Send + 'static) -> Self {
        Self {
            kind,
            size,
            reader: Box::new(reader),
        }
    }

    /// Type tag recorded for the object
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Declared content size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Trait for storing and retrieving type-tagged objects by content hash.
///
/// All calls are blocking. Implementations must be `Send + Sync` so callers
/// can fan writes out over a thread pool.
pub trait ObjectStore: Send + Sync {
    /// Hash algorithm every id in this store uses.
    fn algo(&self) -> HashAlgo;

    /// Look up an object's type tag and content size.
    fn type_and_size(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError>;

    /// Read an object's full content.
    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError>;

    /// Persist `data` as an object of `kind`, returning its id.
    /// Writing an object that already exists is a no-op.
    fn write_object(&self, data: &[u8], kind: ObjectKind) -> Result<ObjectId, StoreError>;

    /// Compute the id `data` would get, without persisting anything.
    fn hash_object(&self, data: &[u8], kind: ObjectKind) -> ObjectId {
        cmf_chunks::hash_object(self.algo(), kind, data)
    }

    /// Check whether an object exists.
    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Open a streaming reader over one object's content.
    fn open_stream(&self, id: &ObjectId) -> Result<ObjectStream, StoreError>;
}

/// Reject ids minted by another hash algorithm before touching storage.
pub(crate) fn check_algo(store_algo: HashAlgo, id: &ObjectId) -> Result<(), StoreError> {
    if id.algo() != store_algo {
        return Err(StoreError::AlgoMismatch {
            id: *id,
            expected: store_algo,
            found: id.algo(),
        });
    }
    Ok(())
}
