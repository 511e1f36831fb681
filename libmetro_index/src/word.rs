use bitvec::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use super::constants::{RAW_WORD_SIZE, UNKNOWN_WORD_TAG, WORD_SIZE};
use super::error::WordError;

/// What a Word means to the event composer, decided by the first byte of its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    Reset,
    Group,
    Detection,
    Other,
}

/// A single decoded HPTDC word: a two character tag plus up to three arguments.
///
/// Stored on disk as a packed 8 byte record (tag, arg1, arg2, little-endian arg3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Word {
    pub tag: [u8; 2],
    pub arg1: i8,
    pub arg2: i8,
    pub arg3: i32,
}

// Bit ranges are (start, end) and select (start - end) bits beginning at bit `end`.
struct RawWordDefinition {
    tag: [u8; 2],
    type_len: u32,
    type_val: u32,
    arg1: Option<(usize, usize)>,
    arg2: Option<(usize, usize)>,
    arg3: (usize, usize),
}

const RAW_WORD_DEFINITIONS: [RawWordDefinition; 6] = [
    RawWordDefinition {
        tag: *b"FL",
        type_len: 2,
        type_val: 2,
        arg1: Some((29, 24)),
        arg2: None,
        arg3: (23, 0),
    },
    RawWordDefinition {
        tag: *b"RS",
        type_len: 2,
        type_val: 3,
        arg1: Some((29, 24)),
        arg2: None,
        arg3: (23, 0),
    },
    RawWordDefinition {
        tag: *b"ER",
        type_len: 2,
        type_val: 1,
        arg1: Some((29, 24)),
        arg2: Some((23, 16)),
        arg3: (15, 0),
    },
    RawWordDefinition {
        tag: *b"GR",
        type_len: 4,
        type_val: 0,
        arg1: Some((27, 24)),
        arg2: None,
        arg3: (23, 0),
    },
    RawWordDefinition {
        tag: *b"RL",
        type_len: 8,
        type_val: 16,
        arg1: None,
        arg2: None,
        arg3: (23, 0),
    },
    RawWordDefinition {
        tag: *b"LV",
        type_len: 5,
        type_val: 3,
        arg1: Some((26, 21)),
        arg2: None,
        arg3: (20, 0),
    },
];

fn extract_bits(raw: u32, (start, end): (usize, usize)) -> u32 {
    raw.view_bits::<Lsb0>()[end..start].load_le::<u32>()
}

impl Word {
    pub fn new(tag: &[u8; 2], arg1: i8, arg2: i8, arg3: i32) -> Self {
        Self {
            tag: *tag,
            arg1,
            arg2,
            arg3,
        }
    }

    /// Decode a raw 32-bit group mode word using the HPTDC word definitions.
    ///
    /// Words which match no definition are tagged `??` and keep the raw value in arg3.
    pub fn from_raw(raw: u32) -> Self {
        match RAW_WORD_DEFINITIONS
            .iter()
            .find(|def| raw >> (32 - def.type_len) == def.type_val)
        {
            Some(def) => Self {
                tag: def.tag,
                arg1: def.arg1.map_or(0, |range| extract_bits(raw, range) as i8),
                arg2: def.arg2.map_or(0, |range| extract_bits(raw, range) as i8),
                arg3: extract_bits(raw, def.arg3) as i32,
            },
            None => Self {
                tag: UNKNOWN_WORD_TAG,
                arg1: 0,
                arg2: 0,
                arg3: raw as i32,
            },
        }
    }

    pub fn kind(&self) -> WordKind {
        match self.tag[0] {
            b'R' => WordKind::Reset,
            b'G' => WordKind::Group,
            b'F' => WordKind::Detection,
            _ => WordKind::Other,
        }
    }

    pub fn tag_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.tag)
    }

    /// Pack the word into its 8 byte on-disk layout
    pub fn to_bytes(&self) -> Result<[u8; WORD_SIZE], WordError> {
        let mut bytes = [0u8; WORD_SIZE];
        let mut cursor = Cursor::new(&mut bytes[..]);
        cursor.write_all(&self.tag)?;
        cursor.write_i8(self.arg1)?;
        cursor.write_i8(self.arg2)?;
        cursor.write_i32::<LittleEndian>(self.arg3)?;
        Ok(bytes)
    }
}

/// Read a buffer of packed decoded words
pub fn read_words(buffer: &[u8]) -> Result<Vec<Word>, WordError> {
    if buffer.len() % WORD_SIZE != 0 {
        return Err(WordError::TruncatedRecord(buffer.len(), WORD_SIZE));
    }
    let mut cursor = Cursor::new(buffer);
    let mut words = Vec::with_capacity(buffer.len() / WORD_SIZE);
    for _ in 0..(buffer.len() / WORD_SIZE) {
        let mut tag = [0u8; 2];
        cursor.read_exact(&mut tag)?;
        let arg1 = cursor.read_i8()?;
        let arg2 = cursor.read_i8()?;
        let arg3 = cursor.read_i32::<LittleEndian>()?;
        words.push(Word::new(&tag, arg1, arg2, arg3));
    }
    Ok(words)
}

/// Read a buffer of raw little-endian 32-bit words and decode each of them
pub fn decode_raw_words(buffer: &[u8]) -> Result<Vec<Word>, WordError> {
    if buffer.len() % RAW_WORD_SIZE != 0 {
        return Err(WordError::TruncatedRecord(buffer.len(), RAW_WORD_SIZE));
    }
    let mut cursor = Cursor::new(buffer);
    let mut words = Vec::with_capacity(buffer.len() / RAW_WORD_SIZE);
    for _ in 0..(buffer.len() / RAW_WORD_SIZE) {
        words.push(Word::from_raw(cursor.read_u32::<LittleEndian>()?));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fill_word() {
        let word = Word::from_raw(0x8000_0000 | (1 << 24) | 1234);
        assert_eq!(word, Word::new(b"FL", 1, 0, 1234));
        assert_eq!(word.kind(), WordKind::Detection);
    }

    #[test]
    fn test_fill_word_drops_top_argument_bit() {
        // arg3 of a fill word spans bits 0..23, so bit 23 is not part of it
        let word = Word::from_raw(0x8000_0000 | 0x00FF_FFFF);
        assert_eq!(word.arg3, 0x007F_FFFF);
        assert_eq!(word.arg1, 0);
    }

    #[test]
    fn test_decode_reset_and_group_words() {
        let rl = Word::from_raw(0x1000_002A);
        assert_eq!(rl, Word::new(b"RL", 0, 0, 42));
        assert_eq!(rl.kind(), WordKind::Reset);

        let rs = Word::from_raw(0xC200_0007);
        assert_eq!(rs, Word::new(b"RS", 2, 0, 7));
        assert_eq!(rs.kind(), WordKind::Reset);

        let gr = Word::from_raw(0x0300_0005);
        assert_eq!(gr, Word::new(b"GR", 3, 0, 5));
        assert_eq!(gr.kind(), WordKind::Group);
    }

    #[test]
    fn test_decode_error_and_level_words() {
        let er = Word::from_raw(0x4000_0000 | (3 << 24) | (9 << 16) | 77);
        assert_eq!(er, Word::new(b"ER", 3, 9, 77));
        assert_eq!(er.kind(), WordKind::Other);

        let lv = Word::from_raw(0x1800_0000 | (2 << 21) | 11);
        assert_eq!(lv, Word::new(b"LV", 2, 0, 11));
    }

    #[test]
    fn test_unknown_word() {
        let word = Word::from_raw(0x1100_0000);
        assert_eq!(word.tag, UNKNOWN_WORD_TAG);
        assert_eq!(word.arg3, 0x1100_0000);
        assert_eq!(word.tag_str(), "??");
    }

    #[test]
    fn test_read_packed_words() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&Word::new(b"FL", 2, 0, -3).to_bytes().unwrap());
        buffer.extend_from_slice(&Word::new(b"RL", 0, 0, 100_000).to_bytes().unwrap());
        assert_eq!(&buffer[0..4], &[b'F', b'L', 2, 0]);

        let words = read_words(&buffer).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].arg3, -3);
        assert_eq!(words[1].kind(), WordKind::Reset);
    }

    #[test]
    fn test_truncated_buffers() {
        assert!(matches!(
            read_words(&[0u8; 9]),
            Err(WordError::TruncatedRecord(9, WORD_SIZE))
        ));
        assert!(matches!(
            decode_raw_words(&[0u8; 6]),
            Err(WordError::TruncatedRecord(6, RAW_WORD_SIZE))
        ));
    }

    #[test]
    fn test_decode_raw_buffer() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(0x8100_0009u32).to_le_bytes());
        buffer.extend_from_slice(&(0x1000_0000u32).to_le_bytes());
        let words = decode_raw_words(&buffer).unwrap();
        assert_eq!(words, vec![Word::new(b"FL", 1, 0, 9), Word::new(b"RL", 0, 0, 0)]);
    }
}
