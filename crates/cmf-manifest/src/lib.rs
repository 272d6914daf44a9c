//! cmf-manifest: versioned chunk manifests over a content-addressed store
//!
//! A manifest is a small text object naming, in order, the chunks whose
//! concatenation is one logical object. This crate owns:
//! - `codec`: header parsing, building, and the per-version format registry
//! - `walk`: the cursor over a manifest's chunk-hash lines
//! - `stream`: lazy reassembly of the chunks behind a `Read` interface
//! - `writer`: building and storing (or only hashing) manifests
//! - `filter`: the transform hook applied while streaming
//! - `directory`: handle-based bookkeeping of manifests already parsed
//!
//! # Example
//! ```
//! use cmf_core::ObjectKind;
//! use cmf_store::{MemoryStore, ObjectStore};
//!
//! let store = MemoryStore::default();
//! let a = store.write_object(b"AAAAAAAAAAAAAAA", ObjectKind::Blob).unwrap();
//! let b = store.write_object(b"BBBBBBBBBBBBBBB", ObjectKind::Blob).unwrap();
//! let id = cmf_manifest::write_manifest(&store, 30, &[a, b]).unwrap();
//!
//! let data = cmf_manifest::read_to_vec(&store, id).unwrap();
//! assert_eq!(data, b"AAAAAAAAAAAAAAABBBBBBBBBBBBBBB");
//! ```

pub mod codec;
pub mod directory;
pub mod error;
pub mod filter;
pub mod stream;
pub mod walk;
pub mod writer;

pub use codec::{build, build_version, parse_header, FormatVersion, Header, CURRENT_VERSION};
pub use directory::{
    create_manifest, load_manifest, lookup_manifest, parse_manifest_buffer, Handle,
    ManifestArena, ManifestRecord, ObjectDirectory,
};
pub use error::{FormatError, ManifestError};
pub use filter::{CrlfToLf, StreamFilter};
pub use stream::ManifestStream;
pub use walk::ChunkRefs;
pub use writer::{hash_manifest, write_manifest, ManifestBuilder};

use cmf_core::ObjectId;
use cmf_store::ObjectStore;
use std::io::Write;

/// Open manifest `id` for streaming.
pub fn open<S: ObjectStore + ?Sized>(store: &S, id: ObjectId) -> Result<ManifestStream<'_, S>, ManifestError> {
    ManifestStream::open(store, id)
}

/// Reassemble manifest `id` into memory.
pub fn read_to_vec<S: ObjectStore + ?Sized>(store: &S, id: ObjectId) -> Result<Vec<u8>, ManifestError> {
    ManifestStream::open(store, id)?.read_to_vec()
}

/// Stream manifest `id` into `sink`, returning the bytes copied.
pub fn copy_to<S, W>(store: &S, id: ObjectId, sink: &mut W) -> Result<u64, ManifestError>
where
    S: ObjectStore + ?Sized,
    W: Write + ?Sized,
{
    ManifestStream::open(store, id)?.copy_to(sink)
}
