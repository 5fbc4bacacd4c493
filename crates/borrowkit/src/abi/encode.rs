use alloy::primitives::{Address, U256};

use crate::errors::CodecError;

/// A single static argument of a call payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiArg {
    Address(Address),
    Uint(U256),
    /// Signed integer given as magnitude plus sign.
    Int { magnitude: U256, negative: bool },
}

impl AbiArg {
    fn word(&self) -> Result<String, CodecError> {
        match self {
            Self::Address(a) => Ok(encode_address_word(a)),
            Self::Uint(v) => Ok(encode_uint_word(*v)),
            Self::Int {
                magnitude,
                negative,
            } => encode_twos_complement(*magnitude, *negative),
        }
    }
}

/// `0x` + selector + one 64-nibble word per argument.
pub fn encode_call(selector: [u8; 4], args: &[AbiArg]) -> Result<String, CodecError> {
    let mut out = String::with_capacity(2 + 8 + 64 * args.len());
    out.push_str("0x");
    out.push_str(&hex::encode(selector));
    for a in args {
        out.push_str(&a.word()?);
    }
    Ok(out)
}

/// Left-pad the 20 address bytes to a 32-byte word (no `0x`).
pub fn encode_address_word(address: &Address) -> String {
    format!("{:0>64}", hex::encode(address.as_slice()))
}

pub fn encode_uint_word(value: U256) -> String {
    hex::encode(value.to_be_bytes::<32>())
}

/// 256-bit two's-complement word for `±magnitude`.
///
/// Negative values invert every bit of the magnitude and add one, carrying across the full
/// word. Positive magnitudes must be at most `2^255 - 1`, negative ones at most `2^255`.
pub fn encode_twos_complement(magnitude: U256, negative: bool) -> Result<String, CodecError> {
    let sign_bit = U256::from(1_u64) << 255_usize;
    if negative {
        if magnitude > sign_bit {
            return Err(CodecError::Overflow(format!(
                "-{magnitude} is below the int256 range"
            )));
        }
        Ok(encode_uint_word((!magnitude).wrapping_add(U256::from(1_u64))))
    } else {
        if magnitude >= sign_bit {
            return Err(CodecError::Overflow(format!(
                "{magnitude} is above the int256 range"
            )));
        }
        Ok(encode_uint_word(magnitude))
    }
}
