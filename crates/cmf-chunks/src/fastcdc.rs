//! FastCDC content-defined chunking
//!
//! Splits files into variable-size chunks whose boundaries are content-defined,
//! so inserting bytes near the start of a file only disturbs nearby chunks and
//! the rest deduplicate against the previous version.
//!
//! Chunk size targets:
//!   - Default (small files): min 2KB, avg 4KB, max 16KB
//!   - Pack files (.pack, .bin, .iso, .img): min 32KB, avg 64KB, max 256KB
//!
//! Chunking is a caller concern; manifests only record the resulting order.

use anyhow::{Context, Result};
use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use rayon::prelude::*;
use std::path::Path;

/// A single content-defined chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the source data
    pub offset: u64,
    /// Chunk length in bytes
    pub length: usize,
}

impl Chunk {
    /// Slice this chunk out of the data it was cut from
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.offset as usize;
        &data[start..start + self.length]
    }
}

/// Chunk size configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl ChunkSizes {
    /// Default for most files (small-file optimized)
    pub const SMALL: ChunkSizes = ChunkSizes {
        min_size: 2 * 1024,  // 2KB
        avg_size: 4 * 1024,  // 4KB
        max_size: 16 * 1024, // 16KB
    };

    /// For pack/binary files (reduced overhead for large sequential data)
    pub const PACK: ChunkSizes = ChunkSizes {
        min_size: 32 * 1024,  // 32KB
        avg_size: 64 * 1024,  // 64KB
        max_size: 256 * 1024, // 256KB
    };

    /// Build explicit sizes, checked against the bounds FastCDC accepts.
    pub fn new(min_size: u32, avg_size: u32, max_size: u32) -> Result<Self> {
        use fastcdc::v2020::{
            AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN,
        };

        if !(MINIMUM_MIN..=MINIMUM_MAX).contains(&min_size)
            || !(AVERAGE_MIN..=AVERAGE_MAX).contains(&avg_size)
            || !(MAXIMUM_MIN..=MAXIMUM_MAX).contains(&max_size)
        {
            anyhow::bail!(
                "chunk sizes {min_size}/{avg_size}/{max_size} outside FastCDC bounds \
                 (min {MINIMUM_MIN}..={MINIMUM_MAX}, avg {AVERAGE_MIN}..={AVERAGE_MAX}, \
                 max {MAXIMUM_MIN}..={MAXIMUM_MAX})"
            );
        }
        if !(min_size <= avg_size && avg_size <= max_size) {
            anyhow::bail!("chunk sizes must satisfy min <= avg <= max");
        }
        Ok(Self {
            min_size,
            avg_size,
            max_size,
        })
    }

    /// Select chunk sizes based on file extension
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("pack") | Some("bin") | Some("iso") | Some("img") => Self::PACK,
            _ => Self::SMALL,
        }
    }
}

/// Split `data` into content-defined chunks using FastCDC.
///
/// Returns an empty list for empty data.
pub fn chunk_data(data: &[u8], sizes: ChunkSizes) -> Vec<Chunk> {
    if data.is_empty() {
        return vec![];
    }

    fastcdc::v2020::FastCDC::new(data, sizes.min_size, sizes.avg_size, sizes.max_size)
        .map(|c| Chunk {
            offset: c.offset as u64,
            length: c.length,
        })
        .collect()
}

/// Chunk a file from disk. Returns the chunks together with the file content.
pub fn chunk_file(path: &Path, sizes: ChunkSizes) -> Result<(Vec<Chunk>, Vec<u8>)> {
    let data = std::fs::read(path)
        .with_context(|| format!("reading file for chunking {}", path.display()))?;
    let chunks = chunk_data(&data, sizes);
    tracing::debug!(path = %path.display(), bytes = data.len(), chunks = chunks.len(), "chunked");
    Ok((chunks, data))
}

/// Compute the blob id of every chunk in parallel, preserving chunk order.
pub fn chunk_ids(algo: HashAlgo, data: &[u8], chunks: &[Chunk]) -> Vec<ObjectId> {
    chunks
        .par_iter()
        .map(|c| crate::hash::hash_object(algo, ObjectKind::Blob, c.slice(data)))
        .collect()
}
