use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::errors::CodecError;

/// Largest mantissa a `Decimal` can hold (96 bits).
const DECIMAL_MANTISSA_BITS: usize = 96;
const DECIMAL_MAX_SCALE: u32 = 28;

/// Extract the lower 128 bits from a U256.
pub fn u256_low_u128(v: U256) -> u128 {
    let limbs = v.as_limbs();
    u128::from(limbs[0]) | (u128::from(limbs[1]) << 64)
}

fn pow10(exp: u32) -> U256 {
    U256::from(10_u64).pow(U256::from(exp))
}

/// Convert a base-unit integer into a token amount: `base / 10^decimals`, exactly.
///
/// Precision is only reduced when the result has more than 28 significant digits, in which case
/// the lowest fractional digits are dropped. Whole parts that do not fit are an error.
pub fn base_units_to_decimal(base: U256, decimals: u8) -> Result<Decimal, CodecError> {
    let mantissa_limit = U256::from(1_u64) << DECIMAL_MANTISSA_BITS;
    let decimals = u32::from(decimals);
    let mut scale = decimals.min(DECIMAL_MAX_SCALE);
    loop {
        let mantissa = base / pow10(decimals - scale);
        if mantissa < mantissa_limit {
            let m = i128::try_from(u256_low_u128(mantissa))
                .map_err(|e| CodecError::Overflow(e.to_string()))?;
            return Ok(Decimal::from_i128_with_scale(m, scale));
        }
        if scale == 0 {
            return Err(CodecError::Overflow(format!(
                "{base} with {decimals} decimals exceeds decimal range"
            )));
        }
        scale -= 1;
    }
}

/// Convert a token amount into base units. Rejects negatives and more fractional digits than the
/// token has.
pub fn decimal_to_base_units(amount: Decimal, decimals: u8) -> Result<U256, CodecError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CodecError::Overflow("amount must be non-negative".into()));
    }
    let normalized = amount.normalize();
    let scale = normalized.scale();
    let decimals = u32::from(decimals);
    if scale > decimals {
        return Err(CodecError::Overflow(format!(
            "too many decimal places for token (decimals={decimals})"
        )));
    }
    let mantissa = u128::try_from(normalized.mantissa())
        .map_err(|e| CodecError::Overflow(e.to_string()))?;
    U256::from(mantissa)
        .checked_mul(pow10(decimals - scale))
        .ok_or_else(|| CodecError::Overflow("amount overflows 256 bits".into()))
}
