//! Block/bank record codec
//!
//! A buffer holds one or more blocks. Each block starts with a fixed header
//! of 8 words followed by banks; a bank is one record.
//!
//! Block header layout (32-bit words):
//! 0: Block length in words, header included
//! 1: Block number
//! 2: Header length in words (8)
//! 3: Event count
//! 4: Reserved
//! 5: Version (bits 0-7), last-block flag (bit 9)
//! 6: Reserved
//! 7: Magic number 0xc0da0100
//!
//! Bank layout:
//! 0: Length in words, not counting this word
//! 1: Tag (bits 16-31), data type (bits 8-15), num (bits 0-7)
//! 2+: Data
//!
//! The magic word tells the reader whether the block was written in the
//! host byte order or needs swapping.

use crate::{CodecError, Endian, Record, RecordCodec, RecordReader};
use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Range;

/// Block magic number
pub const BLOCK_MAGIC: u32 = 0xc0da_0100;

/// Supported format version
pub const FORMAT_VERSION: u32 = 4;

/// Block header length in words
pub const BLOCK_HEADER_WORDS: u32 = 8;

/// Last-block flag within header word 5
pub const LAST_BLOCK_BIT: u32 = 1 << 9;

const WORD: usize = 4;
const BLOCK_HEADER_BYTES: usize = BLOCK_HEADER_WORDS as usize * WORD;

fn read_word(payload: &[u8], offset: usize, swap: bool) -> u32 {
    let word = u32::from_ne_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ]);
    if swap {
        word.swap_bytes()
    } else {
        word
    }
}

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub length_words: u32,
    pub number: u32,
    pub header_words: u32,
    pub event_count: u32,
    pub version: u32,
    pub last: bool,
    pub swap: bool,
}

impl BlockHeader {
    /// Parse and validate the block header starting at `offset`
    pub fn parse(payload: &[u8], offset: usize) -> Result<Self, CodecError> {
        let available = payload.len().saturating_sub(offset);
        if available < BLOCK_HEADER_BYTES {
            return Err(CodecError::TooShort {
                available,
                needed: BLOCK_HEADER_BYTES,
            });
        }

        let raw_magic = read_word(payload, offset + 7 * WORD, false);
        let swap = if raw_magic == BLOCK_MAGIC {
            false
        } else if raw_magic.swap_bytes() == BLOCK_MAGIC {
            true
        } else {
            return Err(CodecError::BadMagic(raw_magic));
        };

        let word = |index: usize| read_word(payload, offset + index * WORD, swap);
        let info = word(5);
        let header = Self {
            length_words: word(0),
            number: word(1),
            header_words: word(2),
            event_count: word(3),
            version: info & 0xff,
            last: info & LAST_BLOCK_BIT != 0,
            swap,
        };

        header.validate(available)?;
        Ok(header)
    }

    fn validate(&self, available: usize) -> Result<(), CodecError> {
        if self.version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(self.version));
        }

        if self.header_words < BLOCK_HEADER_WORDS || self.header_words > self.length_words {
            return Err(CodecError::BadHeaderLength(self.header_words));
        }

        if self.length_words as usize * WORD > available {
            return Err(CodecError::Overrun {
                what: "block",
                offset: 0,
                words: self.length_words as usize,
            });
        }

        Ok(())
    }
}

/// Decoded bank header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankHeader {
    /// Length in words, not counting the length word
    pub length: u32,
    pub tag: u16,
    pub data_type: u8,
    pub num: u8,
}

impl BankHeader {
    fn from_words(length: u32, info: u32) -> Self {
        Self {
            length,
            tag: (info >> 16) as u16,
            data_type: ((info >> 8) & 0xff) as u8,
            num: (info & 0xff) as u8,
        }
    }

    fn info_word(&self) -> u32 {
        (self.tag as u32) << 16 | (self.data_type as u32) << 8 | self.num as u32
    }
}

impl<'a> Record<'a> {
    /// Bank header of this record, if it holds at least two words
    pub fn header(&self) -> Option<BankHeader> {
        let mut words = self.words();
        let length = words.next()?;
        let info = words.next()?;
        Some(BankHeader::from_words(length, info))
    }

    /// Bank data words in host order
    pub fn data_words(&self) -> impl Iterator<Item = u32> + 'a {
        self.words().skip(2)
    }
}

/// Codec for block/bank buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct EvioCodec;

impl RecordCodec for EvioCodec {
    type Reader = EvioReader;

    fn open_reader(&self, payload: &[u8]) -> Result<EvioReader, CodecError> {
        let header = BlockHeader::parse(payload, 0)?;
        Ok(EvioReader::at_block(0, &header))
    }
}

/// Positional reader over the banks of a buffer
#[derive(Debug)]
pub struct EvioReader {
    offset: usize,
    block_end: usize,
    last_block: bool,
    swap: bool,
    done: bool,
}

impl EvioReader {
    fn at_block(block_start: usize, header: &BlockHeader) -> Self {
        Self {
            offset: block_start + header.header_words as usize * WORD,
            block_end: block_start + header.length_words as usize * WORD,
            last_block: header.last,
            swap: header.swap,
            done: false,
        }
    }

    fn next_block(&mut self, payload: &[u8]) -> Result<bool, CodecError> {
        if self.last_block || self.block_end + BLOCK_HEADER_BYTES > payload.len() {
            self.done = true;
            return Ok(false);
        }

        let start = self.block_end;
        let header = BlockHeader::parse(payload, start).map_err(|err| match err {
            CodecError::Overrun { what, words, .. } => CodecError::Overrun {
                what,
                offset: start,
                words,
            },
            other => other,
        })?;
        *self = Self::at_block(start, &header);
        Ok(true)
    }
}

impl RecordReader for EvioReader {
    fn next_record(&mut self, payload: &[u8]) -> Result<Option<Range<usize>>, CodecError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if self.offset + WORD <= self.block_end {
                let length = read_word(payload, self.offset, self.swap);
                if length == 0 {
                    return Err(CodecError::EmptyBank(self.offset));
                }

                let words = length as usize + 1;
                let end = self.offset + words * WORD;
                if end > self.block_end {
                    return Err(CodecError::Overrun {
                        what: "bank",
                        offset: self.offset,
                        words,
                    });
                }

                let range = self.offset..end;
                self.offset = end;
                return Ok(Some(range));
            }

            if !self.next_block(payload)? {
                return Ok(None);
            }
        }
    }

    fn needs_swap(&self) -> bool {
        self.swap
    }

    fn close(self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Builds a single-block buffer of banks in a chosen byte order
#[derive(Debug)]
pub struct BankWriter {
    endian: Endian,
    banks: BytesMut,
    count: u32,
}

impl BankWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            banks: BytesMut::new(),
            count: 0,
        }
    }

    fn put_word(buf: &mut BytesMut, endian: Endian, word: u32) {
        match endian {
            Endian::Big => buf.put_u32(word),
            Endian::Little => buf.put_u32_le(word),
        }
    }

    /// Append a bank of 32-bit words
    pub fn add_bank(&mut self, tag: u16, data_type: u8, num: u8, data: &[u32]) -> &mut Self {
        let header = BankHeader {
            length: data.len() as u32 + 1,
            tag,
            data_type,
            num,
        };
        Self::put_word(&mut self.banks, self.endian, header.length);
        Self::put_word(&mut self.banks, self.endian, header.info_word());
        for &word in data {
            Self::put_word(&mut self.banks, self.endian, word);
        }
        self.count += 1;
        self
    }

    /// Number of banks written so far
    pub fn bank_count(&self) -> u32 {
        self.count
    }

    /// Finish the buffer as the last block with the given block number
    pub fn finish(self, block_number: u32) -> Bytes {
        let length_words = BLOCK_HEADER_WORDS + (self.banks.len() / WORD) as u32;
        let mut buf = BytesMut::with_capacity(length_words as usize * WORD);

        let header = [
            length_words,
            block_number,
            BLOCK_HEADER_WORDS,
            self.count,
            0,
            FORMAT_VERSION | LAST_BLOCK_BIT,
            0,
            BLOCK_MAGIC,
        ];
        for word in header {
            Self::put_word(&mut buf, self.endian, word);
        }
        buf.put_slice(&self.banks);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(payload: &[u8]) -> Result<Vec<Vec<u32>>, CodecError> {
        let mut reader = EvioCodec.open_reader(payload)?;
        let swap = reader.needs_swap();
        let mut records = Vec::new();
        while let Some(range) = reader.next_record(payload)? {
            let record = Record::new(&payload[range], swap);
            records.push(record.data_words().collect());
        }
        reader.close()?;
        Ok(records)
    }

    fn foreign() -> Endian {
        match Endian::native() {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        }
    }

    #[test]
    fn test_reads_banks_in_order() {
        let mut writer = BankWriter::new(Endian::native());
        writer.add_bank(1, 0x01, 0, &[10, 11]).add_bank(2, 0x01, 1, &[20]);
        let buffer = writer.finish(1);

        let records = read_all(&buffer).unwrap();
        assert_eq!(records, vec![vec![10, 11], vec![20]]);
    }

    #[test]
    fn test_detects_foreign_byte_order() {
        let mut writer = BankWriter::new(foreign());
        writer.add_bank(0x1234, 0x01, 7, &[0xdead_beef]);
        let buffer = writer.finish(3);

        let header = BlockHeader::parse(&buffer, 0).unwrap();
        assert!(header.swap);
        assert_eq!(header.number, 3);
        assert_eq!(header.event_count, 1);
        assert!(header.last);

        let mut reader = EvioCodec.open_reader(&buffer).unwrap();
        let range = reader.next_record(&buffer).unwrap().unwrap();
        let record = Record::new(&buffer[range], reader.needs_swap());
        let bank = record.header().unwrap();
        assert_eq!(bank.length, 2);
        assert_eq!(bank.tag, 0x1234);
        assert_eq!(bank.num, 7);
        assert_eq!(record.data_words().collect::<Vec<_>>(), vec![0xdead_beef]);
    }

    #[test]
    fn test_empty_block_is_exhausted() {
        let buffer = BankWriter::new(Endian::native()).finish(1);
        assert!(read_all(&buffer).unwrap().is_empty());
    }

    #[test]
    fn test_walks_multiple_blocks() {
        let mut first = BankWriter::new(Endian::native());
        first.add_bank(1, 1, 0, &[1]);
        let mut first = first.finish(1).to_vec();
        // clear the last-block flag of the first block
        let info = u32::from_ne_bytes(first[20..24].try_into().unwrap()) & !LAST_BLOCK_BIT;
        first[20..24].copy_from_slice(&info.to_ne_bytes());

        let mut second = BankWriter::new(Endian::native());
        second.add_bank(2, 1, 0, &[2, 3]);
        first.extend_from_slice(&second.finish(2));

        assert_eq!(read_all(&first).unwrap(), vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_rejects_malformed_buffers() {
        assert!(matches!(
            EvioCodec.open_reader(&[0u8; 16]),
            Err(CodecError::TooShort { available: 16, .. })
        ));

        let mut buffer = BankWriter::new(Endian::native()).finish(1).to_vec();
        buffer[28..32].copy_from_slice(&0x1111_2222u32.to_ne_bytes());
        assert_eq!(
            EvioCodec.open_reader(&buffer).unwrap_err(),
            CodecError::BadMagic(0x1111_2222)
        );

        let mut buffer = BankWriter::new(Endian::native()).finish(1).to_vec();
        buffer[20..24].copy_from_slice(&(6 | LAST_BLOCK_BIT).to_ne_bytes());
        assert_eq!(
            EvioCodec.open_reader(&buffer).unwrap_err(),
            CodecError::UnsupportedVersion(6)
        );
    }

    #[test]
    fn test_bank_overrun_is_hard_error() {
        let mut writer = BankWriter::new(Endian::native());
        writer.add_bank(1, 1, 0, &[1, 2]);
        let mut buffer = writer.finish(1).to_vec();
        // claim a longer bank than the block holds
        buffer[32..36].copy_from_slice(&9u32.to_ne_bytes());

        let mut reader = EvioCodec.open_reader(&buffer).unwrap();
        assert!(matches!(
            reader.next_record(&buffer),
            Err(CodecError::Overrun { what: "bank", offset: 32, .. })
        ));
    }
}
