//! In-memory object storage backend.

use bytes::Bytes;
use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{check_algo, ObjectStore, ObjectStream};

/// In-memory object store backed by a `RwLock<HashMap>`.
///
/// Used by tests and by dry runs that must not touch disk.
pub struct MemoryStore {
    algo: HashAlgo,
    objects: RwLock<HashMap<ObjectId, (ObjectKind, Bytes)>>,
}

impl MemoryStore {
    pub fn new(algo: HashAlgo) -> Self {
        Self {
            algo,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: &ObjectId) -> Result<(ObjectKind, Bytes), StoreError> {
        check_algo(self.algo, id)?;
        let map = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(HashAlgo::default())
    }
}

impl ObjectStore for MemoryStore {
    fn algo(&self) -> HashAlgo {
        self.algo
    }

    fn type_and_size(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError> {
        let (kind, data) = self.get(id)?;
        Ok((kind, data.len() as u64))
    }

    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let (kind, data) = self.get(id)?;
        Ok((kind, data.to_vec()))
    }

    fn write_object(&self, data: &[u8], kind: ObjectKind) -> Result<ObjectId, StoreError> {
        let id = self.hash_object(data, kind);
        let mut map = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(id).or_insert_with(|| {
            debug!(%id, %kind, size = data.len(), "storing object in memory");
            (kind, Bytes::copy_from_slice(data))
        });
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        check_algo(self.algo, id)?;
        let map = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.contains_key(id))
    }

    fn open_stream(&self, id: &ObjectId) -> Result<ObjectStream, StoreError> {
        let (kind, data) = self.get(id)?;
        let size = data.len() as u64;
        Ok(ObjectStream::new(kind, size, Cursor::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_write_read_roundtrip() {
        let store = MemoryStore::default();
        let id = store.write_object(b"hello object", ObjectKind::Blob).unwrap();

        let (kind, data) = store.read_object(&id).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(data, b"hello object");
        assert_eq!(store.type_and_size(&id).unwrap(), (ObjectKind::Blob, 12));
    }

    #[test]
    fn test_write_is_idempotent() {
        let store = MemoryStore::default();
        let a = store.write_object(b"dup", ObjectKind::Blob).unwrap();
        let b = store.write_object(b"dup", ObjectKind::Blob).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_object() {
        let store = MemoryStore::default();
        let id = store.hash_object(b"never written", ObjectKind::Blob);
        assert!(!store.contains(&id).unwrap());
        assert!(matches!(store.read_object(&id), Err(StoreError::NotFound(_))));
        assert!(store.is_empty(), "hash_object must not persist");
    }

    #[test]
    fn test_foreign_algo_rejected() {
        let store = MemoryStore::new(HashAlgo::Blake3);
        let id = cmf_chunks::hash_object(HashAlgo::Sha256, ObjectKind::Blob, b"x");
        assert!(matches!(
            store.type_and_size(&id),
            Err(StoreError::AlgoMismatch { .. })
        ));
    }

    #[test]
    fn test_stream_reads_content() {
        let store = MemoryStore::default();
        let id = store.write_object(b"streamed bytes", ObjectKind::Blob).unwrap();

        let mut stream = store.open_stream(&id).unwrap();
        assert_eq!(stream.kind(), ObjectKind::Blob);
        assert_eq!(stream.size(), 14);
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "streamed bytes");
    }
}
