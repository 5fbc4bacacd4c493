use std::{
    collections::HashMap,
    str::FromStr as _,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::HttpConfig;

fn allow_insecure_http() -> bool {
    std::env::var("BORROWKIT_ALLOW_INSECURE_HTTP")
        .ok()
        .is_some_and(|v| {
            matches!(
                v.as_str(),
                "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON"
            )
        })
}

fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

/// USD spot price source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn usd_price(&self, asset: &str) -> eyre::Result<Decimal>;
}

/// `CoinGecko` `simple/price` client.
#[derive(Debug, Clone)]
pub struct CoinGeckoFeed {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoFeed {
    /// Honors `BORROWKIT_ALLOW_INSECURE_HTTP` for non-https base URLs.
    pub fn new(cfg: &HttpConfig) -> eyre::Result<Self> {
        Self::with_insecure_http(cfg, allow_insecure_http())
    }

    pub fn with_insecure_http(cfg: &HttpConfig, allow_insecure: bool) -> eyre::Result<Self> {
        let base = cfg.price_base_url.trim().trim_end_matches('/');
        if !base.starts_with("https://") && !is_loopback_http(base) && !allow_insecure {
            eyre::bail!(
                "price_base_url must use https (or loopback); set BORROWKIT_ALLOW_INSECURE_HTTP=1 to override"
            );
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base.to_owned(),
            api_key: cfg.price_api_key.clone(),
        })
    }
}

/// Pull `{<asset>: {usd: number}}` out of a `simple/price` response.
fn parse_simple_price(v: &Value, asset: &str) -> eyre::Result<Decimal> {
    let n = v
        .get(asset)
        .and_then(|a| a.get("usd"))
        .and_then(Value::as_number)
        .ok_or_else(|| eyre::eyre!("no usd price for {asset} in response"))?;
    let s = n.to_string();
    let price = Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .with_context(|| format!("parse price {s}"))?;
    if price <= Decimal::ZERO {
        eyre::bail!("non-positive price {price} for {asset}");
    }
    Ok(price)
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn usd_price(&self, asset: &str) -> eyre::Result<Decimal> {
        let url = format!("{}/simple/price", self.base_url);
        let mut req = self
            .client
            .get(url)
            .query(&[("ids", asset), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }
        let v: Value = req
            .send()
            .await
            .context("price request")?
            .error_for_status()
            .context("price status")?
            .json()
            .await
            .context("price json")?;
        parse_simple_price(&v, asset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Cached,
    Stale,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub source: PriceSource,
}

/// Cached spot prices with availability-first degradation. Never fails.
///
/// Keeps its own cache; nothing is shared with other services.
pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    ttl: Duration,
    default_price: Decimal,
    cache: Mutex<HashMap<String, (Decimal, Instant)>>,
}

impl PriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, ttl: Duration, default_price: Decimal) -> Self {
        Self {
            feed,
            ttl,
            default_price,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch_price(&self, asset: &str) -> Decimal {
        self.fetch_quote(asset).await.price
    }

    pub async fn fetch_quote(&self, asset: &str) -> PriceQuote {
        let mut cache = self.cache.lock().await;
        if let Some((price, at)) = cache.get(asset) {
            if at.elapsed() < self.ttl {
                debug!(asset, "price cache hit");
                return PriceQuote {
                    price: *price,
                    source: PriceSource::Cached,
                };
            }
        }

        // Rate limiting (429) is handled like any other failure.
        match self.feed.usd_price(asset).await {
            Ok(price) => {
                cache.insert(asset.to_owned(), (price, Instant::now()));
                PriceQuote {
                    price,
                    source: PriceSource::Live,
                }
            }
            Err(e) => {
                if let Some((price, _)) = cache.get(asset) {
                    warn!(asset, error = %e, "price refresh failed; serving stale price");
                    return PriceQuote {
                        price: *price,
                        source: PriceSource::Stale,
                    };
                }
                warn!(asset, error = %e, default = %self.default_price, "price unavailable; serving default");
                PriceQuote {
                    price: self.default_price,
                    source: PriceSource::Default,
                }
            }
        }
    }
}
