use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{fallback::try_in_order, EthRpc, RpcValue};
use crate::{config::RpcConfig, errors::TransportError};

/// Public mainnet node used when no fallback endpoint is configured.
pub const DEFAULT_FALLBACK_RPC_URL: &str = "https://ethereum-rpc.publicnode.com";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// POST a JSON body and return the decoded JSON response.
#[async_trait]
pub trait JsonPoster: Send + Sync {
    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpPoster {
    client: Client,
}

impl HttpPoster {
    /// `insecure` disables TLS certificate verification (local forks with self-signed certs).
    pub fn new(timeout: Duration, insecure: bool) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: "http client".into(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonPoster for HttpPoster {
    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError> {
        let endpoint = url.to_string();
        let resp = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("{endpoint}: {e}")))
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, TransportError> {
    let t = raw.trim();
    let url = Url::parse(t).map_err(|e| TransportError::InvalidUrl(format!("{t}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::InvalidUrl(format!(
            "{t}: unsupported scheme {other}"
        ))),
    }
}

fn envelope(method: &str, params: Vec<RpcValue>) -> Value {
    let params: Vec<Value> = params.into_iter().map(Value::from).collect();
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

/// Extract `result` from a JSON-RPC response, turning a non-null `error` into [`TransportError::Rpc`].
fn parse_response(v: Value) -> Result<RpcValue, TransportError> {
    let Value::Object(mut obj) = v else {
        return Err(TransportError::InvalidResponse(
            "response is not a JSON object".into(),
        ));
    };
    if let Some(err) = obj.remove("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| err.to_string(), str::to_owned);
        return Err(TransportError::Rpc { code, message });
    }
    obj.remove("result")
        .map(RpcValue::from)
        .ok_or_else(|| TransportError::InvalidResponse("missing result field".into()))
}

/// JSON-RPC client over a primary endpoint plus one fallback.
///
/// A failed call against the primary is repeated once against the fallback. There is no other
/// retry at this layer.
#[derive(Clone)]
pub struct RpcTransport {
    endpoints: Vec<Url>,
    poster: Arc<dyn JsonPoster>,
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl RpcTransport {
    /// An empty or missing fallback falls back to [`DEFAULT_FALLBACK_RPC_URL`]. When both
    /// resolve to the same URL only one endpoint is kept.
    pub fn new(
        primary: &str,
        fallback: Option<&str>,
        poster: Arc<dyn JsonPoster>,
    ) -> Result<Self, TransportError> {
        let primary = parse_endpoint(primary)?;
        let fallback = parse_endpoint(
            fallback
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_FALLBACK_RPC_URL),
        )?;
        let mut endpoints = vec![primary];
        if !endpoints.contains(&fallback) {
            endpoints.push(fallback);
        }
        Ok(Self { endpoints, poster })
    }

    pub fn from_config(cfg: &RpcConfig) -> Result<Self, TransportError> {
        let poster = HttpPoster::new(Duration::from_secs(cfg.timeout_seconds), cfg.insecure)?;
        Self::new(&cfg.url, cfg.fallback_url.as_deref(), Arc::new(poster))
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    async fn call_endpoint(
        &self,
        url: &Url,
        body: &Value,
    ) -> Result<RpcValue, (String, TransportError)> {
        let res = self
            .poster
            .post_json(url, body)
            .await
            .and_then(parse_response);
        res.map_err(|e| (url.to_string(), e))
    }
}

#[async_trait]
impl EthRpc for RpcTransport {
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> Result<RpcValue, TransportError> {
        let body = envelope(method, params);
        debug!(method, "rpc call");
        let body = &body;
        let outcome = try_in_order(&self.endpoints, |url| {
            let url = url.clone();
            async move { self.call_endpoint(&url, body).await }
        })
        .await;
        match outcome {
            Ok(v) => Ok(v),
            Err(failures) => {
                for (i, (endpoint, err)) in failures.iter().enumerate() {
                    if i + 1 < self.endpoints.len() {
                        warn!(method, endpoint = %endpoint, error = %err, "rpc endpoint failed; trying fallback");
                    } else {
                        error!(method, endpoint = %endpoint, error = %err, "rpc endpoint failed");
                    }
                }
                Err(TransportError::AllEndpointsFailed {
                    method: method.to_owned(),
                })
            }
        }
    }
}
