use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    abi::{
        encode_call,
        layout::{decode_vault_config, VaultConfigLayout, VAULT_RESOLVER_V1_CONFIG},
        selectors, serialize_display, AbiArg,
    },
    amount::base_units_to_decimal,
    errors::ServiceError,
    rpc::{BlockTag, ContractCall, EthRpc},
    tokens::{TokenDescriptor, USDC, WETH},
};

/// Risk parameters in percent (`75` = 75%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskParameters {
    pub max_ltv: Decimal,
    pub liquidation_threshold: Decimal,
    pub liquidation_penalty: Decimal,
}

/// Served when the resolver is unreachable and nothing is cached.
pub const SAFE_DEFAULT_RISK: RiskParameters = RiskParameters {
    max_ltv: Decimal::from_parts(75, 0, 0, false, 0),
    liquidation_threshold: Decimal::from_parts(85, 0, 0, false, 0),
    liquidation_penalty: Decimal::from_parts(5, 0, 0, false, 0),
};

impl RiskParameters {
    /// Accepted values have `0 < max_ltv < liquidation_threshold <= 100`.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let hundred = Decimal::ONE_HUNDRED;
        if self.max_ltv <= Decimal::ZERO {
            return Err(ServiceError::InvalidConfig(format!(
                "max LTV {} must be positive",
                self.max_ltv
            )));
        }
        if self.liquidation_threshold <= self.max_ltv {
            return Err(ServiceError::InvalidConfig(format!(
                "liquidation threshold {} must exceed max LTV {}",
                self.liquidation_threshold, self.max_ltv
            )));
        }
        if self.liquidation_threshold > hundred || self.liquidation_penalty > hundred {
            return Err(ServiceError::InvalidConfig(
                "percentages above 100".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Live,
    /// Expired cache entry served because the refresh failed.
    Stale,
    Default,
}

/// Snapshot of a vault's risk parameters. A refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultConfig {
    #[serde(serialize_with = "serialize_display")]
    pub vault_address: Address,
    pub collateral_token: TokenDescriptor,
    pub debt_token: TokenDescriptor,
    pub risk: RiskParameters,
    pub fetched_at: DateTime<Utc>,
    pub source: ConfigSource,
}

#[derive(Debug, Clone)]
struct CachedConfig {
    config: VaultConfig,
    stored_at: Instant,
}

/// Reads vault risk parameters from the resolver behind a TTL cache.
///
/// Never fails: a failed refresh serves the expired entry if there is one, otherwise the
/// configured default.
pub struct VaultConfigService {
    rpc: Arc<dyn EthRpc>,
    resolver: Address,
    layout: VaultConfigLayout,
    ttl: Duration,
    fallback: RiskParameters,
    collateral_token: TokenDescriptor,
    debt_token: TokenDescriptor,
    // Held across the refresh so concurrent callers see one resolver call.
    cache: Mutex<HashMap<Address, CachedConfig>>,
}

impl VaultConfigService {
    pub fn new(
        rpc: Arc<dyn EthRpc>,
        resolver: Address,
        ttl: Duration,
        fallback: RiskParameters,
    ) -> Self {
        Self {
            rpc,
            resolver,
            layout: VAULT_RESOLVER_V1_CONFIG,
            ttl,
            fallback,
            collateral_token: WETH,
            debt_token: USDC,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn with_tokens(mut self, collateral: TokenDescriptor, debt: TokenDescriptor) -> Self {
        self.collateral_token = collateral;
        self.debt_token = debt;
        self
    }

    pub const fn collateral_token(&self) -> &TokenDescriptor {
        &self.collateral_token
    }

    pub const fn debt_token(&self) -> &TokenDescriptor {
        &self.debt_token
    }

    fn snapshot(&self, vault: Address, risk: RiskParameters, source: ConfigSource) -> VaultConfig {
        VaultConfig {
            vault_address: vault,
            collateral_token: self.collateral_token,
            debt_token: self.debt_token,
            risk,
            fetched_at: Utc::now(),
            source,
        }
    }

    /// One resolver round trip, no cache.
    pub async fn fetch_live(&self, vault: Address) -> Result<VaultConfig, ServiceError> {
        let data = encode_call(selectors::GET_VAULT_CONFIG, &[AbiArg::Address(vault)])?;
        let raw_hex = self
            .rpc
            .eth_call(&ContractCall::new(self.resolver, data), BlockTag::Latest)
            .await?;
        let raw = decode_vault_config(&raw_hex, &self.layout)?;
        let scale = self.layout.percent_scale;
        let risk = RiskParameters {
            max_ltv: base_units_to_decimal(raw.collateral_factor, scale)?,
            liquidation_threshold: base_units_to_decimal(raw.liquidation_threshold, scale)?,
            liquidation_penalty: base_units_to_decimal(raw.liquidation_penalty, scale)?,
        };
        risk.validate()?;
        Ok(self.snapshot(vault, risk, ConfigSource::Live))
    }

    pub async fn fetch_vault_config(&self, vault: Address) -> VaultConfig {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&vault) {
            if entry.stored_at.elapsed() < self.ttl {
                debug!(vault = %vault, "vault config cache hit");
                return entry.config.clone();
            }
        }

        match self.fetch_live(vault).await {
            Ok(config) => {
                cache.insert(
                    vault,
                    CachedConfig {
                        config: config.clone(),
                        stored_at: Instant::now(),
                    },
                );
                config
            }
            Err(e) => {
                if let Some(entry) = cache.get(&vault) {
                    warn!(vault = %vault, error = %e, "vault config refresh failed; serving stale value");
                    let mut stale = entry.config.clone();
                    stale.source = ConfigSource::Stale;
                    return stale;
                }
                warn!(vault = %vault, error = %e, "vault config unavailable; serving default");
                self.snapshot(vault, self.fallback, ConfigSource::Default)
            }
        }
    }
}
