//! Record codec abstractions

use crate::CodecError;
use std::ops::Range;

/// Opens positional record readers onto event payloads
pub trait RecordCodec {
    type Reader: RecordReader;

    /// Open a read-only reader on `payload`; fails on a malformed buffer
    fn open_reader(&self, payload: &[u8]) -> Result<Self::Reader, CodecError>;
}

/// Positional reader over one payload
///
/// The reader keeps only its position. The payload it was opened on is passed
/// again on every read, so the bytes stay owned by whoever owns the event.
pub trait RecordReader {
    /// Byte range of the next record in `payload`, `Ok(None)` once exhausted
    fn next_record(&mut self, payload: &[u8]) -> Result<Option<Range<usize>>, CodecError>;

    /// Whether the records are in the other byte order than the host
    fn needs_swap(&self) -> bool;

    /// Close the reader
    fn close(self) -> Result<(), CodecError>;
}

/// One record, borrowed from the payload of the current event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    data: &'a [u8],
    swap: bool,
}

impl<'a> Record<'a> {
    pub fn new(data: &'a [u8], swap: bool) -> Self {
        Self { data, swap }
    }

    /// Raw bytes in payload order
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the payload byte order differs from the host
    pub fn needs_swap(&self) -> bool {
        self.swap
    }

    /// Host-order 32-bit words; a trailing partial word is ignored
    pub fn words(&self) -> impl Iterator<Item = u32> + 'a {
        let swap = self.swap;
        self.data.chunks_exact(4).map(move |chunk| {
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if swap {
                word.swap_bytes()
            } else {
                word
            }
        })
    }

    /// Copy the record out, for callers that must keep it past the next read
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}
