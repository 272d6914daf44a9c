//! Content transforms applied while a manifest is being streamed out.

use std::io;

/// A byte transform fed chunk by chunk.
///
/// `feed` may consume less than it was given; the stream re-offers the rest
/// together with the next chunk. `drain` flushes whatever the filter is still
/// holding once input has run out.
pub trait StreamFilter {
    /// Transform a prefix of `input` into `out`, returning how many input bytes
    /// were consumed.
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<usize>;

    /// Emit buffered state after the last `feed`.
    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()>;
}

impl<F: StreamFilter + ?Sized> StreamFilter for &mut F {
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<usize> {
        (**self).feed(input, out)
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        (**self).drain(out)
    }
}

/// Converts CRLF line endings to LF. A CR at the end of one chunk is held
/// until the next so a split `\r\n` still collapses.
#[derive(Debug, Default)]
pub struct CrlfToLf {
    pending_cr: bool,
}

impl CrlfToLf {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamFilter for CrlfToLf {
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<usize> {
        out.reserve(input.len() + 1);
        for &b in input {
            if self.pending_cr {
                self.pending_cr = false;
                if b != b'\n' {
                    out.push(b'\r');
                }
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(b);
            }
        }
        Ok(input.len())
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        if std::mem::take(&mut self.pending_cr) {
            out.push(b'\r');
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &mut CrlfToLf, pieces: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for piece in pieces {
            assert_eq!(filter.feed(piece, &mut out).unwrap(), piece.len());
        }
        filter.drain(&mut out).unwrap();
        out
    }

    #[test]
    fn collapses_crlf() {
        assert_eq!(run(&mut CrlfToLf::new(), &[b"a\r\nb\r\n"]), b"a\nb\n");
    }

    #[test]
    fn split_across_feeds() {
        assert_eq!(run(&mut CrlfToLf::new(), &[b"a\r", b"\nb"]), b"a\nb");
    }

    #[test]
    fn lone_cr_kept() {
        assert_eq!(run(&mut CrlfToLf::new(), &[b"a\rb", b"c\r"]), b"a\rbc\r");
        assert_eq!(run(&mut CrlfToLf::new(), &[b"\r", b"\r\n"]), b"\r\n");
    }
}
