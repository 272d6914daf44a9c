//! Object hashing: the identity of every stored object
//!
//! An object's id is the digest of a small type header followed by its bytes:
//! `"<kind> <len>\0" ++ data`. Two objects with identical bytes but different
//! kinds therefore never collide.

use anyhow::{Context, Result};
use cmf_core::{HashAlgo, ObjectId, ObjectKind, MAX_RAW_LEN};
use sha2::Digest;
use std::io::{self, Read, Write};
use std::path::Path;

/// Encode the type header that prefixes object content before hashing
pub fn object_header(kind: ObjectKind, len: u64) -> String {
    format!("{} {}\0", kind, len)
}

/// Digest a byte slice with no type header
pub fn hash_bytes(algo: HashAlgo, data: &[u8]) -> ObjectId {
    let mut hasher = ObjectHasher::new(algo);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the id `data` would be stored under as an object of `kind`
pub fn hash_object(algo: HashAlgo, kind: ObjectKind, data: &[u8]) -> ObjectId {
    let mut hasher = ObjectHasher::for_object(algo, kind, data.len() as u64);
    hasher.update(data);
    hasher.finalize()
}

/// Hash a file as an object of `kind` without loading it into memory
pub fn hash_file(algo: HashAlgo, kind: ObjectKind, path: &Path) -> Result<ObjectId> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("opening file for streaming hash: {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("stat for hashing: {}", path.display()))?
        .len();

    let mut hasher = ObjectHasher::for_object(algo, kind, len);
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
    loop {
        let n = file.read(&mut buf).context("reading for hash")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

enum Inner {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

/// Incremental hasher over any supported algorithm.
///
/// Implements `Write` so it can sit at the end of `io::copy`.
pub struct ObjectHasher {
    algo: HashAlgo,
    inner: Inner,
}

impl ObjectHasher {
    pub fn new(algo: HashAlgo) -> Self {
        let inner = match algo {
            HashAlgo::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgo::Sha256 => Inner::Sha256(sha2::Sha256::new()),
        };
        Self { algo, inner }
    }

    /// A hasher pre-fed with the type header for an object of `len` bytes
    pub fn for_object(algo: HashAlgo, kind: ObjectKind, len: u64) -> Self {
        let mut hasher = Self::new(algo);
        hasher.update(object_header(kind, len).as_bytes());
        hasher
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Blake3(h) => {
                h.update(data);
            }
            Inner::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> ObjectId {
        let mut out = [0u8; MAX_RAW_LEN];
        match self.inner {
            Inner::Blake3(h) => out.copy_from_slice(h.finalize().as_bytes()),
            Inner::Sha256(h) => out.copy_from_slice(&h.finalize()),
        }
        ObjectId::from_array(self.algo, out)
    }
}

impl Write for ObjectHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
