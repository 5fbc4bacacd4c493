//! Word-index tables for the resolver responses the engine consumes.
//!
//! Each table is pinned to one deployed contract version. A resolver upgrade that changes a
//! struct means adding a new table, not editing an existing one.

use alloy::primitives::{Address, U256};

use super::Words;
use crate::errors::CodecError;

/// Field positions inside one `UserPosition` tuple returned by `positionsByUser(address)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTupleLayout {
    pub version: &'static str,
    /// Words per tuple.
    pub width: usize,
    pub nft_id: usize,
    pub owner: usize,
    pub is_liquidated: usize,
    pub is_supply: usize,
    pub collateral: usize,
    pub debt: usize,
}

/// `UserPosition { nftId, owner, isLiquidated, isSupplyPosition, tick, tickId, beforeSupply,
/// beforeBorrow, beforeDustBorrow, supply, borrow, dustBorrow }`
pub const VAULT_RESOLVER_V1_POSITION: PositionTupleLayout = PositionTupleLayout {
    version: "vault-resolver-v1",
    width: 12,
    nft_id: 0,
    owner: 1,
    is_liquidated: 2,
    is_supply: 3,
    collateral: 9,
    debt: 10,
};

/// Field positions inside the static `Configs` struct returned by `getVaultConfig(address)`.
/// Percent fields are stored with two implied decimals (`8500` = 85%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultConfigLayout {
    pub version: &'static str,
    pub min_words: usize,
    pub collateral_factor: usize,
    pub liquidation_threshold: usize,
    pub liquidation_penalty: usize,
    pub percent_scale: u8,
}

/// `Configs { supplyRateMagnifier, borrowRateMagnifier, collateralFactor, liquidationThreshold,
/// liquidationMaxLimit, withdrawalGap, liquidationPenalty, borrowFee, oracle, oraclePriceOperate,
/// oraclePriceLiquidate, rebalancer, lastUpdateTimestamp }`
pub const VAULT_RESOLVER_V1_CONFIG: VaultConfigLayout = VaultConfigLayout {
    version: "vault-resolver-v1",
    min_words: 13,
    collateral_factor: 2,
    liquidation_threshold: 3,
    liquidation_penalty: 6,
    percent_scale: 2,
};

/// One position tuple with only the fields the engine reads, still in raw on-chain units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPosition {
    pub nft_id: U256,
    pub owner: Address,
    pub is_liquidated: bool,
    pub is_supply: bool,
    pub collateral: U256,
    pub debt: U256,
}

/// Decode the first return value of `positionsByUser(address)`.
pub fn decode_positions(
    result_hex: &str,
    layout: &PositionTupleLayout,
) -> Result<Vec<RawPosition>, CodecError> {
    let words = Words::from_hex(result_hex)?;
    words
        .tuple_array(0, layout.width)?
        .iter()
        .map(|t| {
            Ok(RawPosition {
                nft_id: t.uint(layout.nft_id)?,
                owner: t.address(layout.owner)?,
                is_liquidated: t.boolean(layout.is_liquidated)?,
                is_supply: t.boolean(layout.is_supply)?,
                collateral: t.uint(layout.collateral)?,
                debt: t.uint(layout.debt)?,
            })
        })
        .collect()
}

/// Risk parameters in raw scaled units (see [`VaultConfigLayout::percent_scale`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawVaultConfig {
    pub collateral_factor: U256,
    pub liquidation_threshold: U256,
    pub liquidation_penalty: U256,
}

pub fn decode_vault_config(
    result_hex: &str,
    layout: &VaultConfigLayout,
) -> Result<RawVaultConfig, CodecError> {
    let words = Words::from_hex(result_hex)?;
    if words.len() < layout.min_words {
        return Err(CodecError::Layout(format!(
            "vault config has {} words, {} expects at least {}",
            words.len(),
            layout.version,
            layout.min_words
        )));
    }
    Ok(RawVaultConfig {
        collateral_factor: words.uint(layout.collateral_factor)?,
        liquidation_threshold: words.uint(layout.liquidation_threshold)?,
        liquidation_penalty: words.uint(layout.liquidation_penalty)?,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::abi::{encode_address_word, encode_uint_word};

    #[derive(Debug, Clone)]
    pub struct TupleSpec {
        pub nft_id: u64,
        pub owner: Address,
        pub liquidated: bool,
        pub supply_only: bool,
        pub collateral: U256,
        pub debt: U256,
    }

    /// Build a `positionsByUser` return payload: the user-position array followed by an empty
    /// second array, like the deployed resolver.
    pub fn positions_payload(tuples: &[TupleSpec]) -> String {
        let layout = VAULT_RESOLVER_V1_POSITION;
        let second_offset = 64 + 32 + tuples.len() * layout.width * 32;
        let mut out = String::from("0x");
        out.push_str(&encode_uint_word(U256::from(64_u64)));
        out.push_str(&encode_uint_word(U256::from(second_offset)));
        out.push_str(&encode_uint_word(U256::from(tuples.len())));
        for t in tuples {
            let mut words = vec![encode_uint_word(U256::ZERO); layout.width];
            words[layout.nft_id] = encode_uint_word(U256::from(t.nft_id));
            words[layout.owner] = encode_address_word(&t.owner);
            words[layout.is_liquidated] = encode_uint_word(U256::from(u8::from(t.liquidated)));
            words[layout.is_supply] = encode_uint_word(U256::from(u8::from(t.supply_only)));
            words[layout.collateral] = encode_uint_word(t.collateral);
            words[layout.debt] = encode_uint_word(t.debt);
            for w in words {
                out.push_str(&w);
            }
        }
        out.push_str(&encode_uint_word(U256::ZERO));
        out
    }

    /// `getVaultConfig` payload with percentages given in basis points.
    pub fn vault_config_payload(collateral_factor: u64, threshold: u64, penalty: u64) -> String {
        let layout = VAULT_RESOLVER_V1_CONFIG;
        let mut words = vec![encode_uint_word(U256::ZERO); layout.min_words];
        words[layout.collateral_factor] = encode_uint_word(U256::from(collateral_factor));
        words[layout.liquidation_threshold] = encode_uint_word(U256::from(threshold));
        words[layout.liquidation_penalty] = encode_uint_word(U256::from(penalty));
        format!("0x{}", words.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{positions_payload, vault_config_payload, TupleSpec};
    use super::*;
    use crate::abi::decode_uint;

    #[test]
    fn decodes_position_fields_by_layout() -> eyre::Result<()> {
        let owner = Address::repeat_byte(0x11);
        let payload = positions_payload(&[
            TupleSpec {
                nft_id: 42,
                owner,
                liquidated: false,
                supply_only: false,
                collateral: decode_uint("0x16345785d8a0000")?,
                debt: decode_uint("0x5f5e100")?,
            },
            TupleSpec {
                nft_id: 43,
                owner,
                liquidated: true,
                supply_only: true,
                collateral: U256::ZERO,
                debt: U256::ZERO,
            },
        ]);
        let positions = decode_positions(&payload, &VAULT_RESOLVER_V1_POSITION)?;
        assert_eq!(positions.len(), 2);
        let first = &positions[0];
        assert_eq!(first.nft_id, U256::from(42_u64));
        assert_eq!(first.owner, owner);
        assert!(!first.is_liquidated && !first.is_supply);
        assert_eq!(first.collateral, U256::from(100_000_000_000_000_000_u64));
        assert_eq!(first.debt, U256::from(100_000_000_u64));
        assert!(positions[1].is_liquidated && positions[1].is_supply);
        Ok(())
    }

    #[test]
    fn empty_position_list_decodes() -> eyre::Result<()> {
        let payload = positions_payload(&[]);
        assert!(decode_positions(&payload, &VAULT_RESOLVER_V1_POSITION)?.is_empty());
        Ok(())
    }

    #[test]
    fn vault_config_reads_pinned_words() -> eyre::Result<()> {
        let payload = vault_config_payload(7500, 8500, 500);
        let raw = decode_vault_config(&payload, &VAULT_RESOLVER_V1_CONFIG)?;
        assert_eq!(raw.collateral_factor, U256::from(7500_u64));
        assert_eq!(raw.liquidation_threshold, U256::from(8500_u64));
        assert_eq!(raw.liquidation_penalty, U256::from(500_u64));
        Ok(())
    }

    #[test]
    fn short_vault_config_is_a_layout_error() {
        let r = decode_vault_config(&format!("0x{}", "00".repeat(64)), &VAULT_RESOLVER_V1_CONFIG);
        assert!(matches!(r, Err(CodecError::Layout(_))), "got {r:?}");
    }
}
