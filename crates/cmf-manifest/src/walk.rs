//! Cursor over the chunk-hash region of a manifest.

use bytes::Bytes;
use cmf_core::{HashAlgo, ObjectId};
use tracing::warn;

use crate::codec::Header;
use crate::error::FormatError;

/// Longest slice of an offending line kept in an error
const MAX_REPORTED_LINE: usize = 80;

#[derive(Debug, Clone)]
enum State {
    Active,
    Exhausted,
    Failed(FormatError),
}

/// Walks the hash lines of a manifest one entry at a time.
///
/// Blank lines are skipped. The last line may omit its terminator. The
/// underlying buffer is shared, never copied or mutated; only the cursor moves.
#[derive(Debug, Clone)]
pub struct ChunkRefs {
    region: Bytes,
    pos: usize,
    /// Offset of `region` within the whole manifest, for error positions
    base: usize,
    algo: HashAlgo,
    lenient: bool,
    current: Option<ObjectId>,
    state: State,
    reported: bool,
}

impl ChunkRefs {
    /// Walk a bare hash region.
    pub fn new(region: Bytes, algo: HashAlgo) -> Self {
        Self {
            region,
            pos: 0,
            base: 0,
            algo,
            lenient: false,
            current: None,
            state: State::Active,
            reported: false,
        }
    }

    /// Walk the hash region of a manifest buffer already run through
    /// [`parse_header`](crate::codec::parse_header).
    pub fn from_header(buffer: &Bytes, header: &Header, algo: HashAlgo) -> Self {
        let start = header.region.start.min(buffer.len());
        let end = header.region.end.clamp(start, buffer.len());
        let mut refs = Self::new(buffer.slice(start..end), algo);
        refs.base = start;
        refs
    }

    /// Treat a malformed hash line as the end of the list instead of an error.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Move to the next entry.
    ///
    /// Returns `Ok(false)` once the region is exhausted, and keeps doing so.
    /// A malformed entry fails every later call with the same error.
    pub fn advance(&mut self) -> Result<bool, FormatError> {
        match &self.state {
            State::Active => {}
            State::Exhausted => return Ok(false),
            State::Failed(err) => return Err(err.clone()),
        }

        loop {
            let rest = &self.region[self.pos..];
            if rest.is_empty() {
                self.current = None;
                self.state = State::Exhausted;
                return Ok(false);
            }

            let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            if line.is_empty() {
                self.pos += consumed;
                continue;
            }

            match ObjectId::from_hex(self.algo, line) {
                Ok(id) => {
                    self.pos += consumed;
                    self.current = Some(id);
                    return Ok(true);
                }
                Err(_) => {
                    self.current = None;
                    let err = FormatError::MalformedHash {
                        offset: self.base + self.pos,
                        line: String::from_utf8_lossy(&line[..line.len().min(MAX_REPORTED_LINE)])
                            .into_owned(),
                    };
                    if self.lenient {
                        warn!(%err, "treating malformed chunk entry as end of manifest");
                        self.state = State::Exhausted;
                        return Ok(false);
                    }
                    self.state = State::Failed(err.clone());
                    return Err(err);
                }
            }
        }
    }

    /// The entry the last successful [`advance`](Self::advance) moved to.
    pub fn current(&self) -> Option<ObjectId> {
        self.current
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &[u8] {
        &self.region[self.pos..]
    }

    pub fn algo(&self) -> HashAlgo {
        self.algo
    }
}

impl Iterator for ChunkRefs {
    type Item = Result<ObjectId, FormatError>;

    /// Yields each entry, then a malformed-entry error at most once.
    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => self.current.map(Ok),
            Ok(false) => None,
            Err(_) if self.reported => None,
            Err(err) => {
                self.reported = true;
                Some(Err(err))
            }
        }
    }
}
