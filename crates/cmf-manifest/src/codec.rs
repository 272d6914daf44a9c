//! Manifest wire format
//!
//! ```text
//! <version>\n
//! <total_size>\n
//! <chunk_count>\n
//! <hash_1>\n
//! ...
//! ```
//!
//! All numbers are unsigned decimal ASCII. Hash lines are canonical lower-case
//! hex; blank lines among them are skipped by the walker. `total_size` and
//! `chunk_count` are advisory and never checked against the hash lines.
//!
//! Each format version is a [`FormatVersion`] entry in a static registry, so a
//! new version is one more entry rather than branches through shared code.

use cmf_core::ObjectId;
use serde::Serialize;
use std::ops::Range;

use crate::error::FormatError;

/// Version written by default
pub const CURRENT_VERSION: u32 = 1;

/// Parsed fixed fields of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub version: u32,
    /// Advisory sum of chunk lengths
    pub total_size: u64,
    /// Advisory number of hash lines
    pub chunk_count: u64,
    /// Byte range of the chunk-hash region within the parsed buffer
    #[serde(skip)]
    pub region: Range<usize>,
}

impl Header {
    /// Borrow the chunk-hash region out of the buffer this header was parsed from
    pub fn chunk_region<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.region.clone()).unwrap_or_default()
    }
}

/// Parsing and building rules for one manifest format version.
pub trait FormatVersion: Sync {
    fn version(&self) -> u32;

    /// Parse everything after the version line, which ends at `body_start`.
    fn parse_body(&self, buf: &[u8], body_start: usize) -> Result<Header, FormatError>;

    /// Serialize a complete manifest in this version's format.
    fn build(&self, total_size: u64, chunk_count: u64, hashes: &[ObjectId]) -> Vec<u8>;
}

pub(crate) struct V1;

impl FormatVersion for V1 {
    fn version(&self) -> u32 {
        1
    }

    fn parse_body(&self, buf: &[u8], body_start: usize) -> Result<Header, FormatError> {
        let (line, pos) = take_line(buf, body_start).ok_or(FormatError::MissingSize)?;
        let total_size = parse_decimal(line).ok_or_else(|| invalid_number("size", line))?;

        let (line, pos) = take_line(buf, pos).ok_or(FormatError::MissingChunkCount)?;
        let chunk_count =
            parse_decimal(line).ok_or_else(|| invalid_number("chunk count", line))?;

        Ok(Header {
            version: 1,
            total_size,
            chunk_count,
            region: pos..buf.len(),
        })
    }

    fn build(&self, total_size: u64, chunk_count: u64, hashes: &[ObjectId]) -> Vec<u8> {
        let hash_bytes: usize = hashes.iter().map(|h| h.algo().hex_len() + 1).sum();
        let mut out = Vec::with_capacity(48 + hash_bytes);
        out.extend_from_slice(format!("1\n{total_size}\n{chunk_count}\n").as_bytes());
        for hash in hashes {
            out.extend_from_slice(hash.to_hex().as_bytes());
            out.push(b'\n');
        }
        out
    }
}

static FORMATS: &[&dyn FormatVersion] = &[&V1];

/// Look up the rules for `version`, if this build knows it
pub fn format_for(version: u32) -> Option<&'static dyn FormatVersion> {
    FORMATS.iter().copied().find(|f| f.version() == version)
}

/// Newest version in the registry
pub fn newest_version() -> u32 {
    FORMATS
        .iter()
        .map(|f| f.version())
        .max()
        .unwrap_or(CURRENT_VERSION)
}

/// Parse the header of a raw manifest buffer.
///
/// The chunk-hash region is returned as a range into `buf`; nothing is copied.
pub fn parse_header(buf: &[u8]) -> Result<Header, FormatError> {
    let (line, pos) = take_line(buf, 0).ok_or(FormatError::MissingVersion)?;
    let version = match parse_version(line) {
        Some(0) | None => {
            return Err(FormatError::InvalidVersion(
                String::from_utf8_lossy(line).into_owned(),
            ))
        }
        Some(v) => v,
    };

    let format = u32::try_from(version)
        .ok()
        .and_then(format_for)
        .ok_or(FormatError::UnsupportedVersion {
            found: version,
            supported: newest_version(),
        })?;
    format.parse_body(buf, pos)
}

/// Serialize a manifest in the current format version.
pub fn build(total_size: u64, chunk_count: u64, hashes: &[ObjectId]) -> Vec<u8> {
    V1.build(total_size, chunk_count, hashes)
}

/// Serialize a manifest in an explicit format version.
///
/// Unknown versions are refused, never coerced to a known one.
pub fn build_version(
    version: u32,
    total_size: u64,
    chunk_count: u64,
    hashes: &[ObjectId],
) -> Result<Vec<u8>, FormatError> {
    Ok(resolve(version)?.build(total_size, chunk_count, hashes))
}

/// Map a requested construction version to its registry entry.
pub(crate) fn resolve(version: u32) -> Result<&'static dyn FormatVersion, FormatError> {
    if version == 0 {
        return Err(FormatError::InvalidVersion("0".into()));
    }
    format_for(version).ok_or(FormatError::UnsupportedVersion {
        found: u64::from(version),
        supported: newest_version(),
    })
}

/// Split off the `'\n'`-terminated line starting at `start`.
/// Returns the line (without terminator) and the offset just past it.
fn take_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let len = rest.iter().position(|&b| b == b'\n')?;
    Some((&rest[..len], start + len + 1))
}

fn is_decimal(line: &[u8]) -> bool {
    !line.is_empty() && line.iter().all(u8::is_ascii_digit)
}

/// Strict unsigned decimal: ASCII digits only, no sign or whitespace.
/// `None` on anything else, including values beyond `u64::MAX`.
fn parse_decimal(line: &[u8]) -> Option<u64> {
    if !is_decimal(line) {
        return None;
    }
    line.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
}

/// Like [`parse_decimal`], but values beyond `u64::MAX` saturate so an
/// absurd version still reads as "too new".
fn parse_version(line: &[u8]) -> Option<u64> {
    if !is_decimal(line) {
        return None;
    }
    Some(line.iter().fold(0u64, |acc, &d| {
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    }))
}

fn invalid_number(field: &'static str, line: &[u8]) -> FormatError {
    FormatError::InvalidNumber {
        field,
        value: String::from_utf8_lossy(line).into_owned(),
    }
}
