//! cmf-chunks: object hashing and caller-side content-defined chunking
//!
//! # Overview
//! - `hash`: type-tagged object identities over BLAKE3 or SHA-256
//! - `fastcdc`: content-defined chunking, stable boundaries even with inserts

pub mod fastcdc;
pub mod hash;

// Convenience re-exports for the most common operations
pub use fastcdc::{chunk_data, chunk_file, chunk_ids, Chunk, ChunkSizes};
pub use hash::{hash_bytes, hash_file, hash_object, object_header, ObjectHasher};
