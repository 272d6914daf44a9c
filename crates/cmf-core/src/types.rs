use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CmfError, CmfResult};

/// Largest raw digest length of any supported algorithm
pub const MAX_RAW_LEN: usize = 32;

/// Hash algorithm used to derive object identities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    /// BLAKE3, 32-byte digest (default)
    #[default]
    Blake3,
    /// SHA-256, 32-byte digest
    Sha256,
}

impl HashAlgo {
    /// Raw digest width in bytes
    pub const fn raw_len(self) -> usize {
        match self {
            HashAlgo::Blake3 => 32,
            HashAlgo::Sha256 => 32,
        }
    }

    /// Width of the canonical hex encoding
    pub const fn hex_len(self) -> usize {
        self.raw_len() * 2
    }

    pub const fn name(self) -> &'static str {
        match self {
            HashAlgo::Blake3 => "blake3",
            HashAlgo::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgo {
    type Err = CmfError;

    fn from_str(s: &str) -> CmfResult<Self> {
        match s {
            "blake3" => Ok(HashAlgo::Blake3),
            "sha256" => Ok(HashAlgo::Sha256),
            other => Err(CmfError::UnknownAlgo(other.to_string())),
        }
    }
}

/// Type tag of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Raw binary content (a chunk)
    Blob,
    /// A chunk manifest
    Manifest,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Manifest => "manifest",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = CmfError;

    fn from_str(s: &str) -> CmfResult<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "manifest" => Ok(ObjectKind::Manifest),
            other => Err(CmfError::UnknownKind(other.to_string())),
        }
    }
}

/// A content hash tagged with the algorithm that produced it.
///
/// Only the first `algo.raw_len()` bytes are significant; the rest stay zeroed
/// so derived equality stays bitwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    algo: HashAlgo,
    bytes: [u8; MAX_RAW_LEN],
}

impl ObjectId {
    /// Wrap a raw digest. Fails if its length does not match `algo`.
    pub fn from_digest(algo: HashAlgo, digest: &[u8]) -> CmfResult<Self> {
        if digest.len() != algo.raw_len() {
            return Err(CmfError::InvalidId(format!(
                "{} digest must be {} bytes, got {}",
                algo,
                algo.raw_len(),
                digest.len()
            )));
        }
        let mut bytes = [0u8; MAX_RAW_LEN];
        bytes[..digest.len()].copy_from_slice(digest);
        Ok(Self { algo, bytes })
    }

    /// Wrap a full-width digest buffer; bytes past `algo.raw_len()` are zeroed.
    pub fn from_array(algo: HashAlgo, mut bytes: [u8; MAX_RAW_LEN]) -> Self {
        bytes[algo.raw_len()..].fill(0);
        Self { algo, bytes }
    }

    /// Decode a hex id of exactly `algo.hex_len()` digits.
    ///
    /// Accepts either `&str` or raw line bytes; upper-case digits are tolerated.
    pub fn from_hex<T: AsRef<[u8]>>(algo: HashAlgo, hex_id: T) -> CmfResult<Self> {
        let hex_id = hex_id.as_ref();
        if hex_id.len() != algo.hex_len() {
            return Err(CmfError::InvalidId(format!(
                "{} id must be {} hex digits, got {}",
                algo,
                algo.hex_len(),
                hex_id.len()
            )));
        }
        let mut bytes = [0u8; MAX_RAW_LEN];
        hex::decode_to_slice(hex_id, &mut bytes[..algo.raw_len()])
            .map_err(|e| CmfError::InvalidId(format!("{e}")))?;
        Ok(Self { algo, bytes })
    }

    pub fn algo(&self) -> HashAlgo {
        self.algo
    }

    /// The significant digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.algo.raw_len()]
    }

    /// Canonical lower-case hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}:{})", self.algo, self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
