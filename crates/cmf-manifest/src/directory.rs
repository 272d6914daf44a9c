//! Host-side bookkeeping for manifests already seen.
//!
//! A directory hands out one [`Handle`] per manifest id and remembers whether
//! that manifest's buffer has been parsed, so it is never parsed twice.
//! [`ManifestArena`] is the in-process implementation: records live in a
//! `Vec` and handles are indices into it.

use bytes::Bytes;
use cmf_core::{ObjectId, ObjectKind};
use cmf_store::ObjectStore;
use std::collections::HashMap;
use tracing::trace;

use crate::codec::{parse_header, Header};
use crate::error::{FormatError, ManifestError};
use crate::walk::ChunkRefs;
use crate::writer::ManifestBuilder;

/// Index of a record inside an [`ObjectDirectory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

/// What the manifest layer needs from a host object graph.
pub trait ObjectDirectory {
    /// Handle for `id`, creating an empty unparsed record if none exists.
    fn get_or_create(&mut self, id: ObjectId) -> Handle;

    fn is_parsed(&self, handle: Handle) -> bool;

    fn mark_parsed(&mut self, handle: Handle);

    /// Store a manifest buffer and its parsed header on the record.
    fn attach(&mut self, handle: Handle, buffer: Bytes, header: Header);
}

/// A manifest known to a [`ManifestArena`]
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    id: ObjectId,
    buffer: Bytes,
    header: Option<Header>,
    parsed: bool,
}

impl ManifestRecord {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Walk the record's chunk list. `None` until a buffer is attached.
    pub fn chunk_refs(&self) -> Option<ChunkRefs> {
        let header = self.header.as_ref()?;
        Some(ChunkRefs::from_header(&self.buffer, header, self.id.algo()))
    }
}

#[derive(Debug, Default)]
pub struct ManifestArena {
    records: Vec<ManifestRecord>,
    index: HashMap<ObjectId, Handle>,
}

impl ManifestArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Handle for `id` if a record exists
    pub fn find(&self, id: &ObjectId) -> Option<Handle> {
        self.index.get(id).copied()
    }

    pub fn record(&self, handle: Handle) -> Option<&ManifestRecord> {
        self.records.get(handle.0)
    }

    /// Drop a record's buffer and header. The record can be loaded again
    /// afterwards. Releasing twice does nothing.
    pub fn release(&mut self, handle: Handle) {
        if let Some(rec) = self.records.get_mut(handle.0) {
            if rec.parsed || !rec.buffer.is_empty() {
                trace!(id = %rec.id, "released manifest buffer");
            }
            rec.buffer = Bytes::new();
            rec.header = None;
            rec.parsed = false;
        }
    }
}

impl ObjectDirectory for ManifestArena {
    fn get_or_create(&mut self, id: ObjectId) -> Handle {
        if let Some(&handle) = self.index.get(&id) {
            return handle;
        }
        let handle = Handle(self.records.len());
        self.records.push(ManifestRecord {
            id,
            buffer: Bytes::new(),
            header: None,
            parsed: false,
        });
        self.index.insert(id, handle);
        handle
    }

    fn is_parsed(&self, handle: Handle) -> bool {
        self.records.get(handle.0).is_some_and(|r| r.parsed)
    }

    fn mark_parsed(&mut self, handle: Handle) {
        if let Some(rec) = self.records.get_mut(handle.0) {
            rec.parsed = true;
        }
    }

    fn attach(&mut self, handle: Handle, buffer: Bytes, header: Header) {
        if let Some(rec) = self.records.get_mut(handle.0) {
            rec.buffer = buffer;
            rec.header = Some(header);
        }
    }
}

/// Find or create the directory entry for manifest `id`.
pub fn lookup_manifest<D: ObjectDirectory + ?Sized>(dir: &mut D, id: ObjectId) -> Handle {
    dir.get_or_create(id)
}

/// Attach `buffer` to an unparsed record.
///
/// Returns `Ok(false)` without touching the record if it was already parsed.
/// The header is validated before anything is attached.
pub fn parse_manifest_buffer<D: ObjectDirectory + ?Sized>(
    dir: &mut D,
    handle: Handle,
    buffer: Bytes,
) -> Result<bool, FormatError> {
    if dir.is_parsed(handle) {
        return Ok(false);
    }
    let header = parse_header(&buffer)?;
    dir.attach(handle, buffer, header);
    dir.mark_parsed(handle);
    Ok(true)
}

/// Look up manifest `id`, reading and parsing it from `store` on first use.
pub fn load_manifest<S, D>(store: &S, dir: &mut D, id: ObjectId) -> Result<Handle, ManifestError>
where
    S: ObjectStore + ?Sized,
    D: ObjectDirectory + ?Sized,
{
    let handle = lookup_manifest(dir, id);
    if dir.is_parsed(handle) {
        return Ok(handle);
    }

    let (kind, data) = store.read_object(&id)?;
    if kind != ObjectKind::Manifest {
        return Err(ManifestError::TypeMismatch {
            id,
            expected: ObjectKind::Manifest,
            found: kind,
        });
    }
    parse_manifest_buffer(dir, handle, Bytes::from(data))?;
    trace!(%id, "loaded manifest");
    Ok(handle)
}

/// Write a manifest through `store` and register it, already parsed.
pub fn create_manifest<S, D>(
    store: &S,
    dir: &mut D,
    builder: &ManifestBuilder,
    total_size: u64,
    hashes: &[ObjectId],
) -> Result<Handle, ManifestError>
where
    S: ObjectStore + ?Sized,
    D: ObjectDirectory + ?Sized,
{
    let id = builder.write(store, total_size, hashes)?;
    let handle = lookup_manifest(dir, id);
    parse_manifest_buffer(dir, handle, Bytes::from(builder.encode(total_size, hashes)))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmf_store::MemoryStore;

    #[test]
    fn lookup_creates_once() {
        let store = MemoryStore::default();
        let id = store.hash_object(b"1\n0\n0\n", ObjectKind::Manifest);
        let mut arena = ManifestArena::new();

        let h1 = lookup_manifest(&mut arena, id);
        let h2 = lookup_manifest(&mut arena, id);
        assert_eq!(h1, h2);
        assert_eq!(arena.len(), 1);
        assert!(!arena.is_parsed(h1));
        assert!(arena.record(h1).unwrap().chunk_refs().is_none());
    }

    #[test]
    fn parse_is_idempotent() {
        let store = MemoryStore::default();
        let id = store.hash_object(b"1\n5\n0\n", ObjectKind::Manifest);
        let mut arena = ManifestArena::new();
        let h = lookup_manifest(&mut arena, id);

        assert!(parse_manifest_buffer(&mut arena, h, Bytes::from_static(b"1\n5\n0\n")).unwrap());
        // A second buffer, even a broken one, is ignored
        assert!(!parse_manifest_buffer(&mut arena, h, Bytes::from_static(b"garbage")).unwrap());
        let rec = arena.record(h).unwrap();
        assert_eq!(rec.header().unwrap().total_size, 5);
        assert_eq!(&rec.buffer()[..], b"1\n5\n0\n");
    }

    #[test]
    fn bad_buffer_leaves_record_unparsed() {
        let store = MemoryStore::default();
        let id = store.hash_object(b"x", ObjectKind::Manifest);
        let mut arena = ManifestArena::new();
        let h = lookup_manifest(&mut arena, id);
        assert!(parse_manifest_buffer(&mut arena, h, Bytes::from_static(b"9\n0\n0\n")).is_err());
        assert!(!arena.is_parsed(h));
        assert!(arena.record(h).unwrap().header().is_none());
    }

    #[test]
    fn create_then_load() {
        let store = MemoryStore::default();
        let a = store.write_object(b"chunk a", ObjectKind::Blob).unwrap();
        let b = store.write_object(b"chunk b", ObjectKind::Blob).unwrap();
        let mut arena = ManifestArena::new();

        let h = create_manifest(&store, &mut arena, &ManifestBuilder::default(), 14, &[a, b]).unwrap();
        assert!(arena.is_parsed(h));
        let rec = arena.record(h).unwrap();
        let listed: Vec<_> = rec.chunk_refs().unwrap().map(Result::unwrap).collect();
        assert_eq!(listed, vec![a, b]);
        let id = rec.id();

        let again = load_manifest(&store, &mut arena, id).unwrap();
        assert_eq!(again, h);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn load_from_store() {
        let store = MemoryStore::default();
        let a = store.write_object(b"payload", ObjectKind::Blob).unwrap();
        let id = crate::writer::write_manifest(&store, 7, &[a]).unwrap();

        let mut arena = ManifestArena::new();
        let h = load_manifest(&store, &mut arena, id).unwrap();
        assert_eq!(arena.record(h).unwrap().header().unwrap().chunk_count, 1);
    }

    #[test]
    fn load_rejects_blob() {
        let store = MemoryStore::default();
        let id = store.write_object(b"1\n0\n0\n", ObjectKind::Blob).unwrap();
        let mut arena = ManifestArena::new();
        assert!(matches!(
            load_manifest(&store, &mut arena, id),
            Err(ManifestError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn release_twice_then_reload() {
        let store = MemoryStore::default();
        let id = crate::writer::write_manifest(&store, 0, &[]).unwrap();
        let mut arena = ManifestArena::new();
        let h = load_manifest(&store, &mut arena, id).unwrap();

        arena.release(h);
        arena.release(h);
        assert!(!arena.is_parsed(h));
        assert!(arena.record(h).unwrap().buffer().is_empty());

        assert_eq!(load_manifest(&store, &mut arena, id).unwrap(), h);
        assert!(arena.is_parsed(h));
    }
}
