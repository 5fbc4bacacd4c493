//! Open borrow positions of a wallet, priced and risk-scored.

pub mod risk;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

pub use risk::{
    compute_metrics, health_factor, PositionStatus, RiskMetrics, DANGER_HEALTH_FACTOR,
    UNBOUNDED, WARNING_HEALTH_FACTOR,
};

use crate::{
    abi::{
        encode_call,
        layout::{decode_positions, PositionTupleLayout, RawPosition, VAULT_RESOLVER_V1_POSITION},
        selectors, serialize_display, AbiArg,
    },
    amount::base_units_to_decimal,
    errors::{CodecError, ServiceError},
    price::PriceOracle,
    rpc::{BlockTag, ContractCall, EthRpc},
    vault::{VaultConfig, VaultConfigService},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowPosition {
    #[serde(serialize_with = "serialize_display")]
    pub nft_id: U256,
    #[serde(serialize_with = "serialize_display")]
    pub owner: Address,
    #[serde(serialize_with = "serialize_display")]
    pub vault_address: Address,
    pub collateral_amount: Decimal,
    pub borrow_amount: Decimal,
    pub collateral_value_usd: Decimal,
    pub debt_value_usd: Decimal,
    pub health_factor: Decimal,
    pub current_ltv: Decimal,
    pub liquidation_price: Decimal,
    pub available_to_borrow_usd: Decimal,
    pub status: PositionStatus,
}

impl BorrowPosition {
    /// Price and score one raw tuple against a config snapshot.
    pub fn from_raw(
        raw: &RawPosition,
        config: &VaultConfig,
        price: Decimal,
    ) -> Result<Self, ServiceError> {
        let collateral_amount =
            base_units_to_decimal(raw.collateral, config.collateral_token.decimals)?;
        let borrow_amount = base_units_to_decimal(raw.debt, config.debt_token.decimals)?;
        let m = compute_metrics(collateral_amount, borrow_amount, price, &config.risk)?;
        Ok(Self {
            nft_id: raw.nft_id,
            owner: raw.owner,
            vault_address: config.vault_address,
            collateral_amount,
            borrow_amount,
            collateral_value_usd: m.collateral_value_usd,
            debt_value_usd: m.debt_value_usd,
            health_factor: m.health_factor,
            current_ltv: m.current_ltv,
            liquidation_price: m.liquidation_price,
            available_to_borrow_usd: m.available_to_borrow_usd,
            status: PositionStatus::from_health_factor(m.health_factor, raw.is_liquidated),
        })
    }
}

/// Only open borrow positions are scored.
fn is_open_borrow(raw: &RawPosition) -> bool {
    !raw.is_liquidated && !raw.is_supply && !raw.debt.is_zero()
}

pub fn positions_calldata(owner: Address) -> Result<String, CodecError> {
    encode_call(selectors::POSITIONS_BY_USER, &[AbiArg::Address(owner)])
}

pub struct PositionResolver {
    rpc: Arc<dyn EthRpc>,
    resolver: Address,
    layout: PositionTupleLayout,
    vault: Address,
    price_asset: String,
    configs: Arc<VaultConfigService>,
    prices: Arc<PriceOracle>,
}

impl PositionResolver {
    pub fn new(
        rpc: Arc<dyn EthRpc>,
        resolver: Address,
        vault: Address,
        price_asset: impl Into<String>,
        configs: Arc<VaultConfigService>,
        prices: Arc<PriceOracle>,
    ) -> Self {
        Self {
            rpc,
            resolver,
            layout: VAULT_RESOLVER_V1_POSITION,
            vault,
            price_asset: price_asset.into(),
            configs,
            prices,
        }
    }

    /// Raw `positionsByUser` result, undecoded.
    pub async fn fetch_raw_hex(&self, owner: Address) -> Result<String, ServiceError> {
        let data = positions_calldata(owner)?;
        Ok(self
            .rpc
            .eth_call(&ContractCall::new(self.resolver, data), BlockTag::Latest)
            .await?)
    }

    pub async fn fetch_raw(&self, owner: Address) -> Result<Vec<RawPosition>, ServiceError> {
        let hex_result = self.fetch_raw_hex(owner).await?;
        Ok(decode_positions(&hex_result, &self.layout)?)
    }

    /// Open borrow positions of `owner`. Config and price degrade on their own; resolver and
    /// decode failures propagate.
    ///
    /// Assumes a single vault: `positionsByUser` lists positions from every vault, and each one is
    /// scored with the configured vault's tokens and risk parameters. The per-tuple vault array in
    /// the response is not read.
    pub async fn fetch_positions(&self, owner: Address) -> Result<Vec<BorrowPosition>, ServiceError> {
        let (config, price, raw) = tokio::join!(
            self.configs.fetch_vault_config(self.vault),
            self.prices.fetch_price(&self.price_asset),
            self.fetch_raw(owner),
        );
        let raw = raw?;
        debug!(owner = %owner, tuples = raw.len(), "decoded resolver positions");
        raw.iter()
            .filter(|r| is_open_borrow(r))
            .map(|r| BorrowPosition::from_raw(r, &config, price))
            .collect()
    }
}
