//! Streaming reassembly of a manifest's chunks into one byte stream.
//!
//! At most one chunk is open at a time. Chunk boundaries are invisible to the
//! reader: a single read may span any number of chunks. A read that hits an
//! error after producing bytes returns the short count; the error surfaces on
//! the next call.

use bytes::Bytes;
use cmf_core::{ObjectId, ObjectKind};
use cmf_store::{ObjectStore, ObjectStream, StoreError};
use std::io::{self, Read, Write};
use tracing::{debug, trace, warn};

use crate::codec::{parse_header, Header};
use crate::error::ManifestError;
use crate::filter::StreamFilter;
use crate::walk::ChunkRefs;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Unconsumed filter input allowed to pile up before a filtered copy fails
const MAX_FILTER_CARRY: usize = 4 * COPY_BUF_SIZE;

/// Reader over the logical object a manifest describes.
///
/// Not shareable between threads mid-read; callers serialize access. Dropping
/// the stream closes it.
pub struct ManifestStream<'s, S: ObjectStore + ?Sized> {
    store: &'s S,
    id: ObjectId,
    header: Header,
    buffer: Bytes,
    refs: ChunkRefs,
    chunk: Option<ObjectStream>,
    /// The walker's current entry still has to be opened
    pending_open: bool,
    delivered: u64,
    initialized: bool,
    at_end: bool,
    closed: bool,
}

impl<'s, S: ObjectStore + ?Sized> ManifestStream<'s, S> {
    /// Open the manifest `id` for streaming. Malformed chunk entries are errors.
    pub fn open(store: &'s S, id: ObjectId) -> Result<Self, ManifestError> {
        Self::open_with(store, id, false)
    }

    /// Open the manifest `id`; with `lenient` set, a malformed chunk entry
    /// ends the stream instead of failing it.
    pub fn open_with(store: &'s S, id: ObjectId, lenient: bool) -> Result<Self, ManifestError> {
        let (kind, _) = store.type_and_size(&id)?;
        expect_kind(id, ObjectKind::Manifest, kind)?;

        let (kind, data) = store.read_object(&id)?;
        expect_kind(id, ObjectKind::Manifest, kind)?;

        let buffer = Bytes::from(data);
        let header = parse_header(&buffer)?;
        let refs = ChunkRefs::from_header(&buffer, &header, id.algo()).lenient(lenient);

        debug!(
            %id,
            total_size = header.total_size,
            chunk_count = header.chunk_count,
            "opened manifest stream"
        );

        Ok(Self {
            store,
            id,
            header,
            buffer,
            refs,
            chunk: None,
            pending_open: false,
            delivered: 0,
            initialized: false,
            at_end: false,
            closed: false,
        })
    }

    /// Declared length of the logical object. Advisory: never checked
    /// against the chunks actually listed.
    pub fn total_size(&self) -> u64 {
        self.header.total_size
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Bytes handed to the caller so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Whether any read has been attempted
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_at_end(&self) -> bool {
        self.at_end
    }

    /// Fill as much of `buf` as the remaining chunks allow.
    ///
    /// Returns 0 only at end of stream (or for an empty `buf`).
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ManifestError> {
        if self.closed || self.at_end || buf.is_empty() {
            return Ok(0);
        }
        self.initialized = true;

        let mut filled = 0;
        while filled < buf.len() {
            if self.chunk.is_none() {
                if !self.pending_open {
                    match self.refs.advance() {
                        Ok(true) => self.pending_open = true,
                        Ok(false) => {
                            debug!(id = %self.id, delivered = self.delivered, "manifest stream finished");
                            self.at_end = true;
                            break;
                        }
                        Err(e) => return self.short_or(filled, e.into()),
                    }
                }
                let Some(chunk_id) = self.refs.current() else {
                    self.at_end = true;
                    break;
                };
                match self.open_chunk(chunk_id) {
                    Ok(stream) => {
                        self.chunk = Some(stream);
                        self.pending_open = false;
                    }
                    Err(e) => return self.short_or(filled, e),
                }
            }

            let Some(chunk) = self.chunk.as_mut() else {
                continue;
            };
            match chunk.read(&mut buf[filled..]) {
                Ok(0) => {
                    trace!(id = %self.id, "chunk exhausted");
                    self.chunk = None;
                }
                Ok(n) => {
                    filled += n;
                    self.delivered += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return self.short_or(filled, StoreError::Io(e).into()),
            }
        }
        Ok(filled)
    }

    /// Copy the rest of the stream into `sink`, returning the bytes copied.
    pub fn copy_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64, ManifestError> {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut copied = 0u64;
        loop {
            let n = self.read_into(&mut buf)?;
            if n == 0 {
                return Ok(copied);
            }
            sink.write_all(&buf[..n]).map_err(ManifestError::Io)?;
            copied += n as u64;
        }
    }

    /// Read the whole object into memory.
    ///
    /// Allocates exactly the declared total size up front. Producing fewer
    /// bytes than declared is [`ManifestError::Truncated`]; bytes beyond the
    /// declared size are not read.
    pub fn read_to_vec(mut self) -> Result<Vec<u8>, ManifestError> {
        let declared = self.header.total_size;
        let too_large = || ManifestError::TooLarge {
            id: self.id,
            size: declared,
        };
        let len = usize::try_from(declared).map_err(|_| too_large())?;

        let mut out = Vec::new();
        out.try_reserve_exact(len).map_err(|_| too_large())?;
        out.resize(len, 0);

        let mut filled = 0;
        while filled < len {
            let n = self.read_into(&mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < len {
            return Err(ManifestError::Truncated {
                id: self.id,
                expected: declared,
                actual: filled as u64,
            });
        }
        Ok(out)
    }

    /// Copy the rest of the stream into `sink` through `filter`, returning
    /// the bytes written to `sink`.
    ///
    /// Each batch is fed until the filter consumes all of it or stops making
    /// progress. Whatever it leaves is offered again with the next batch; more
    /// than [`MAX_FILTER_CARRY`] bytes left behind fails the copy. Once the
    /// stream ends the filter is drained.
    pub fn copy_filtered<F, W>(&mut self, filter: &mut F, sink: &mut W) -> Result<u64, ManifestError>
    where
        F: StreamFilter + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut carry: Vec<u8> = Vec::new();
        let mut out = Vec::with_capacity(COPY_BUF_SIZE);
        let mut written = 0u64;

        loop {
            let n = self.read_into(&mut buf)?;
            if n == 0 {
                break;
            }
            carry.extend_from_slice(&buf[..n]);
            feed_until_stalled(filter, &mut carry, &mut out)?;
            if !carry.is_empty() {
                warn!(
                    id = %self.id,
                    carried = carry.len(),
                    "filter did not consume all input, carrying remainder"
                );
                if carry.len() > MAX_FILTER_CARRY {
                    return Err(ManifestError::Filter(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("filter stalled with {} bytes unconsumed", carry.len()),
                    )));
                }
            }
            written += flush(&mut out, sink)?;
        }

        if !carry.is_empty() {
            feed_until_stalled(filter, &mut carry, &mut out)?;
            if !carry.is_empty() {
                warn!(id = %self.id, unconsumed = carry.len(), "filter left input unconsumed at end of stream");
            }
        }
        filter.drain(&mut out).map_err(ManifestError::Filter)?;
        written += flush(&mut out, sink)?;
        Ok(written)
    }

    /// Release the open chunk and the manifest buffer. Safe to call again.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.chunk = None;
        self.pending_open = false;
        self.refs = ChunkRefs::new(Bytes::new(), self.id.algo());
        self.buffer = Bytes::new();
        self.at_end = true;
        self.closed = true;
        trace!(id = %self.id, delivered = self.delivered, "closed manifest stream");
    }

    fn open_chunk(&self, chunk_id: ObjectId) -> Result<ObjectStream, ManifestError> {
        let stream = self.store.open_stream(&chunk_id)?;
        expect_kind(chunk_id, ObjectKind::Blob, stream.kind())?;
        trace!(manifest = %self.id, chunk = %chunk_id, size = stream.size(), "opened chunk");
        Ok(stream)
    }

    /// Partial-read rule: progress made in this call wins over the error.
    fn short_or(&self, filled: usize, err: ManifestError) -> Result<usize, ManifestError> {
        if filled > 0 {
            debug!(id = %self.id, filled, error = %err, "returning short read before error");
            Ok(filled)
        } else {
            Err(err)
        }
    }
}

impl<S: ObjectStore + ?Sized> Read for ManifestStream<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

impl<S: ObjectStore + ?Sized> Drop for ManifestStream<'_, S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: ObjectStore + ?Sized> std::fmt::Debug for ManifestStream<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStream")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("buffered", &self.buffer.len())
            .field("chunk_open", &self.chunk.is_some())
            .field("delivered", &self.delivered)
            .field("at_end", &self.at_end)
            .field("closed", &self.closed)
            .finish()
    }
}

fn expect_kind(id: ObjectId, expected: ObjectKind, found: ObjectKind) -> Result<(), ManifestError> {
    if found != expected {
        return Err(ManifestError::TypeMismatch {
            id,
            expected,
            found,
        });
    }
    Ok(())
}

/// Feed `carry` to `filter` until it is used up or a feed consumes nothing,
/// then drop the consumed prefix.
fn feed_until_stalled<F>(filter: &mut F, carry: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<(), ManifestError>
where
    F: StreamFilter + ?Sized,
{
    let mut start = 0;
    while start < carry.len() {
        let used = filter.feed(&carry[start..], out).map_err(ManifestError::Filter)?;
        if used == 0 {
            break;
        }
        start += used.min(carry.len() - start);
    }
    carry.drain(..start);
    Ok(())
}

fn flush<W: Write + ?Sized>(out: &mut Vec<u8>, sink: &mut W) -> Result<u64, ManifestError> {
    if out.is_empty() {
        return Ok(0);
    }
    sink.write_all(out).map_err(ManifestError::Io)?;
    let n = out.len() as u64;
    out.clear();
    Ok(n)
}
