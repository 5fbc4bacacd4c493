use alloy::primitives::{Address, I256, U256};

use crate::errors::CodecError;

const WORD_BYTES: usize = 32;
const WORD_NIBBLES: usize = 64;

pub fn strip_hex_prefix(s: &str) -> &str {
    let t = s.trim();
    t.strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t)
}

fn ensure_hex_digits(digits: &str) -> Result<(), CodecError> {
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidHex(format!("unexpected character {bad:?}")));
    }
    Ok(())
}

/// Parse a hex quantity of up to 256 bits. Accepts unpadded (`0x5f5e100`) and full-word input.
pub fn decode_uint(hex_str: &str) -> Result<U256, CodecError> {
    let digits = strip_hex_prefix(hex_str);
    if digits.is_empty() {
        return Err(CodecError::Empty);
    }
    ensure_hex_digits(digits)?;
    let significant = digits.trim_start_matches('0');
    if significant.len() > WORD_NIBBLES {
        return Err(CodecError::Overflow(format!(
            "{} hex digits exceed 256 bits",
            significant.len()
        )));
    }
    let padded = format!("{significant:0>64}");
    let mut buf = [0_u8; WORD_BYTES];
    hex::decode_to_slice(&padded, &mut buf).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    Ok(U256::from_be_bytes(buf))
}

/// Interpret a 256-bit word as a two's-complement signed integer.
pub fn decode_twos_complement(hex_str: &str) -> Result<I256, CodecError> {
    decode_uint(hex_str).map(I256::from_raw)
}

/// Only the low byte is read; other bytes of a boolean word are not validated.
pub fn decode_bool(word: &[u8; WORD_BYTES]) -> bool {
    word[WORD_BYTES - 1] != 0
}

pub fn decode_hex_bytes(hex_str: &str) -> Result<Vec<u8>, CodecError> {
    let digits = strip_hex_prefix(hex_str);
    ensure_hex_digits(digits)?;
    hex::decode(digits).map_err(|e| CodecError::InvalidHex(e.to_string()))
}

/// Return data split into 32-byte words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Words {
    words: Vec<[u8; WORD_BYTES]>,
}

impl Words {
    pub fn from_hex(hex_str: &str) -> Result<Self, CodecError> {
        let bytes = decode_hex_bytes(hex_str)?;
        if bytes.is_empty() {
            return Err(CodecError::Empty);
        }
        if bytes.len() % WORD_BYTES != 0 {
            return Err(CodecError::Layout(format!(
                "{} bytes is not a whole number of words",
                bytes.len()
            )));
        }
        let words = bytes
            .chunks_exact(WORD_BYTES)
            .map(|c| {
                let mut w = [0_u8; WORD_BYTES];
                w.copy_from_slice(c);
                w
            })
            .collect();
        Ok(Self { words })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word(&self, index: usize) -> Result<&[u8; WORD_BYTES], CodecError> {
        self.words.get(index).ok_or(CodecError::WordOutOfRange {
            index,
            available: self.words.len(),
        })
    }

    pub fn uint(&self, index: usize) -> Result<U256, CodecError> {
        self.word(index).map(|w| U256::from_be_bytes(*w))
    }

    pub fn boolean(&self, index: usize) -> Result<bool, CodecError> {
        self.word(index).map(decode_bool)
    }

    /// Low 20 bytes of the word.
    pub fn address(&self, index: usize) -> Result<Address, CodecError> {
        self.word(index)
            .map(|w| Address::from_slice(&w[WORD_BYTES - 20..]))
    }

    fn small(&self, index: usize, what: &str) -> Result<usize, CodecError> {
        let v = self.uint(index)?;
        let limit = U256::from(u32::MAX);
        if v > limit {
            return Err(CodecError::Layout(format!("{what} {v} is implausibly large")));
        }
        usize::try_from(crate::amount::u256_low_u128(v))
            .map_err(|e| CodecError::Overflow(format!("{what}: {e}")))
    }

    /// Decode a dynamic `T[]` whose elements are static tuples of `tuple_words` words.
    ///
    /// Word `head` holds the byte offset of the array; the word at that offset is the element
    /// count and the elements follow immediately after it.
    pub fn tuple_array(&self, head: usize, tuple_words: usize) -> Result<Vec<Self>, CodecError> {
        if tuple_words == 0 {
            return Err(CodecError::Layout("tuple width must be non-zero".into()));
        }
        let offset = self.small(head, "array offset")?;
        if offset % WORD_BYTES != 0 {
            return Err(CodecError::Layout(format!(
                "array offset {offset} is not word aligned"
            )));
        }
        let count_index = offset / WORD_BYTES;
        let count = self.small(count_index, "array length")?;
        let first = count_index + 1;
        let needed = count
            .checked_mul(tuple_words)
            .and_then(|n| n.checked_add(first))
            .ok_or_else(|| CodecError::Overflow("array extent".into()))?;
        if needed > self.words.len() {
            return Err(CodecError::Layout(format!(
                "array of {count} x {tuple_words} words needs {needed} words, payload has {}",
                self.words.len()
            )));
        }
        Ok(self.words[first..needed]
            .chunks_exact(tuple_words)
            .map(|c| Self { words: c.to_vec() })
            .collect())
    }
}
