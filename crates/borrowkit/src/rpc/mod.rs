//! Minimal Ethereum JSON-RPC surface.
//!
//! [`EthRpc`] has one required method, [`EthRpc::call`]; everything else is a typed wrapper with
//! a default implementation, so test doubles only need to answer raw method calls.

pub mod fallback;
pub mod transport;
pub mod value;

use std::str::FromStr as _;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::{abi::decode_uint, errors::TransportError};

pub use transport::{HttpPoster, JsonPoster, RpcTransport};
pub use value::RpcValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl BlockTag {
    pub fn to_param(self) -> RpcValue {
        match self {
            Self::Latest => "latest".into(),
            Self::Number(n) => format!("0x{n:x}").into(),
        }
    }
}

/// Read-only call to a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: String,
}

impl ContractCall {
    pub fn new(to: Address, data: impl Into<String>) -> Self {
        Self {
            to,
            data: data.into(),
        }
    }

    fn to_param(&self, from: Option<Address>) -> RpcValue {
        let mut entries = vec![
            ("to", RpcValue::from(self.to.to_string())),
            ("data", RpcValue::from(self.data.clone())),
        ];
        if let Some(from) = from {
            entries.push(("from", RpcValue::from(from.to_string())));
        }
        RpcValue::object(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    /// `true` for status `0x1`.
    pub status: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<TxLog>,
}

fn invalid(what: &str, got: &RpcValue) -> TransportError {
    TransportError::InvalidResponse(format!("{what}: unexpected {}", got.kind()))
}

fn str_field<'a>(obj: &'a RpcValue, key: &str) -> Result<&'a str, TransportError> {
    obj.get(key)
        .and_then(RpcValue::as_str)
        .ok_or_else(|| TransportError::InvalidResponse(format!("missing string field {key}")))
}

pub fn parse_quantity(v: &RpcValue, what: &str) -> Result<U256, TransportError> {
    let s = v.as_str().ok_or_else(|| invalid(what, v))?;
    decode_uint(s).map_err(|e| TransportError::InvalidResponse(format!("{what}: {e}")))
}

pub fn parse_u64_quantity(v: &RpcValue, what: &str) -> Result<u64, TransportError> {
    let n = parse_quantity(v, what)?;
    u64::try_from(n).map_err(|e| TransportError::InvalidResponse(format!("{what}: {e}")))
}

fn parse_b256(s: &str, what: &str) -> Result<B256, TransportError> {
    B256::from_str(s).map_err(|e| TransportError::InvalidResponse(format!("{what}: {e}")))
}

fn parse_address(s: &str, what: &str) -> Result<Address, TransportError> {
    Address::from_str(s).map_err(|e| TransportError::InvalidResponse(format!("{what}: {e}")))
}

impl TxReceipt {
    pub fn from_rpc(v: &RpcValue) -> Result<Self, TransportError> {
        if v.as_object().is_none() {
            return Err(invalid("receipt", v));
        }
        let transaction_hash = parse_b256(str_field(v, "transactionHash")?, "transactionHash")?;
        let status = match str_field(v, "status")? {
            "0x1" | "0x01" => true,
            "0x0" | "0x00" => false,
            other => {
                return Err(TransportError::InvalidResponse(format!(
                    "unknown receipt status {other}"
                )))
            }
        };
        let block_number = match v.get("blockNumber") {
            None | Some(RpcValue::Null) => None,
            Some(b) => Some(parse_u64_quantity(b, "blockNumber")?),
        };
        let logs = v
            .get("logs")
            .and_then(RpcValue::as_array)
            .unwrap_or_default()
            .iter()
            .map(|l| {
                let topics = l
                    .get("topics")
                    .and_then(RpcValue::as_array)
                    .unwrap_or_default()
                    .iter()
                    .map(|t| {
                        t.as_str()
                            .ok_or_else(|| invalid("log topic", t))
                            .and_then(|s| parse_b256(s, "log topic"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TxLog {
                    address: parse_address(str_field(l, "address")?, "log address")?,
                    topics,
                    data: l
                        .get("data")
                        .and_then(RpcValue::as_str)
                        .unwrap_or("0x")
                        .to_owned(),
                })
            })
            .collect::<Result<Vec<_>, TransportError>>()?;
        Ok(Self {
            transaction_hash,
            status,
            block_number,
            logs,
        })
    }
}

#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Issue one JSON-RPC request and return its `result`.
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> Result<RpcValue, TransportError>;

    /// `eth_call` against `block`, returning the raw hex result.
    async fn eth_call(&self, call: &ContractCall, block: BlockTag) -> Result<String, TransportError> {
        let result = self
            .call("eth_call", vec![call.to_param(None), block.to_param()])
            .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| invalid("eth_call", &result))
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        let v = self.call("eth_blockNumber", vec![]).await?;
        parse_u64_quantity(&v, "eth_blockNumber")
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        let v = self.call("eth_chainId", vec![]).await?;
        parse_u64_quantity(&v, "eth_chainId")
    }

    async fn gas_price(&self) -> Result<U256, TransportError> {
        let v = self.call("eth_gasPrice", vec![]).await?;
        parse_quantity(&v, "eth_gasPrice")
    }

    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> Result<u64, TransportError> {
        let v = self
            .call("eth_estimateGas", vec![call.to_param(Some(from))])
            .await?;
        parse_u64_quantity(&v, "eth_estimateGas")
    }

    /// `None` while the transaction is still pending.
    async fn transaction_receipt(&self, tx: B256) -> Result<Option<TxReceipt>, TransportError> {
        let v = self
            .call("eth_getTransactionReceipt", vec![tx.to_string().into()])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        TxReceipt::from_rpc(&v).map(Some)
    }
}
