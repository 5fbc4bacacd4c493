use std::{str::FromStr as _, time::Duration};

use alloy::primitives::Address;
use eyre::Context as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const ETHEREUM_MAINNET_RPC_URL: &str = "https://eth.llamarpc.com";
pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
/// Fluid `VaultResolver` on Ethereum mainnet.
pub const DEFAULT_RESOLVER_ADDRESS: &str = "0x394ce45678e0019c0045194a561e2bed0fcc6cf0";
/// Fluid ETH/USDC vault on Ethereum mainnet.
pub const DEFAULT_VAULT_ADDRESS: &str = "0xeabbfca72f8a8bf14c4ac59e69ecb2eb69f0811c";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    /// Tried once when a call against `url` fails. Unset means the built-in public node.
    pub fallback_url: Option<String>,
    pub chain_id: u64,
    pub timeout_seconds: u64,
    /// Skip TLS certificate verification. Only for local forks.
    pub insecure: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: ETHEREUM_MAINNET_RPC_URL.into(),
            fallback_url: None,
            chain_id: 1,
            timeout_seconds: 30,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of a `CoinGecko`-compatible price API.
    pub price_base_url: String,
    /// Sent as `x-cg-demo-api-key` when set.
    pub price_api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            price_base_url: COINGECKO_BASE_URL.into(),
            price_api_key: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub vault_address: String,
    pub resolver_address: String,
    /// Price feed asset id for the collateral token.
    pub price_asset: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            vault_address: DEFAULT_VAULT_ADDRESS.into(),
            resolver_address: DEFAULT_RESOLVER_ADDRESS.into(),
            price_asset: "ethereum".into(),
        }
    }
}

impl MarketConfig {
    pub fn vault(&self) -> eyre::Result<Address> {
        parse_address(&self.vault_address).context("market.vault_address")
    }

    pub fn resolver(&self) -> eyre::Result<Address> {
        parse_address(&self.resolver_address).context("market.resolver_address")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub vault_config_ttl_seconds: u64,
    pub price_ttl_seconds: u64,
    /// Served when the price feed fails and nothing is cached.
    pub default_price: Decimal,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            vault_config_ttl_seconds: 60 * 60,
            price_ttl_seconds: 30 * 60,
            default_price: Decimal::from(3000_u32),
        }
    }
}

impl CacheConfig {
    pub const fn vault_config_ttl(&self) -> Duration {
        Duration::from_secs(self.vault_config_ttl_seconds)
    }

    pub const fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorrowkitConfig {
    pub rpc: RpcConfig,
    pub http: HttpConfig,
    pub market: MarketConfig,
    pub cache: CacheConfig,
    pub confirmation: ConfirmationConfig,
}

/// Strict `0x` + 40 hex parse; checksum casing is not enforced.
pub fn parse_address(s: &str) -> eyre::Result<Address> {
    let t = s.trim();
    let Some(digits) = t.strip_prefix("0x") else {
        eyre::bail!("address must start with 0x: {t}");
    };
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        eyre::bail!("address must be 40 hex chars after 0x: {t}");
    }
    Address::from_str(t).with_context(|| format!("parse address {t}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() -> eyre::Result<()> {
        let cfg: BorrowkitConfig = toml::from_str("")?;
        assert_eq!(cfg, BorrowkitConfig::default());
        assert_eq!(cfg.cache.vault_config_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.cache.price_ttl(), Duration::from_secs(1800));
        Ok(())
    }

    #[test]
    fn partial_sections_keep_other_defaults() -> eyre::Result<()> {
        let cfg: BorrowkitConfig = toml::from_str(
            r#"
            [rpc]
            url = "https://node.example"

            [cache]
            default_price = "4000"
            "#,
        )?;
        assert_eq!(cfg.rpc.url, "https://node.example");
        assert_eq!(cfg.rpc.chain_id, 1);
        assert_eq!(cfg.cache.default_price, Decimal::from(4000_u32));
        assert_eq!(cfg.cache.price_ttl_seconds, 1800);
        Ok(())
    }

    #[test]
    fn default_market_addresses_parse() -> eyre::Result<()> {
        let m = MarketConfig::default();
        assert_ne!(m.vault()?, Address::ZERO);
        assert_ne!(m.resolver()?, Address::ZERO);
        Ok(())
    }

    #[test]
    fn parse_address_rejects_malformed() {
        assert!(parse_address("394ce45678e0019c0045194a561e2bed0fcc6cf0").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address(&format!("0x{}", "g".repeat(40))).is_err());
        assert!(parse_address(&format!("0x{}", "A".repeat(40))).is_ok());
    }
}
