//! In-memory doubles for the async seams.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    borrow::signer::{SigningProvider, TransactionSigner, UnsignedTransaction},
    errors::TransportError,
    price::PriceFeed,
    rpc::{EthRpc, RpcValue},
};

type Handler = dyn Fn(&str, &[RpcValue]) -> Result<RpcValue, TransportError> + Send + Sync;

/// Answers every JSON-RPC call through a closure and records the methods called.
pub struct MockRpc {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, Vec<RpcValue>)>>,
}

impl MockRpc {
    pub fn new(
        handler: impl Fn(&str, &[RpcValue]) -> Result<RpcValue, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(vec![]),
        }
    }

    /// Every call fails like an unreachable node.
    pub fn unreachable() -> Self {
        Self::new(|method, _| {
            Err(TransportError::AllEndpointsFailed {
                method: method.to_owned(),
            })
        })
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    /// Selectors (`0x` + 8 hex) of every `eth_call` made so far.
    pub fn eth_call_selectors(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| {
                c.iter()
                    .filter(|(m, _)| m == "eth_call")
                    .filter_map(|(_, p)| call_selector(p))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EthRpc for MockRpc {
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> Result<RpcValue, TransportError> {
        let out = (self.handler)(method, &params);
        if let Ok(mut c) = self.calls.lock() {
            c.push((method.to_owned(), params));
        }
        out
    }
}

/// The `data` field of the first param (the call object of `eth_call`/`eth_estimateGas`).
pub fn call_data(params: &[RpcValue]) -> Option<&str> {
    params.first()?.get("data")?.as_str()
}

pub fn call_selector(params: &[RpcValue]) -> Option<String> {
    call_data(params).and_then(|d| d.get(..10)).map(str::to_owned)
}

pub fn selector_hex(selector: [u8; 4]) -> String {
    format!("0x{}", hex::encode(selector))
}

/// Price feed that returns a fixed answer or fails, counting requests.
pub struct MockPriceFeed {
    answer: Mutex<Result<Decimal, String>>,
    requests: AtomicUsize,
}

impl MockPriceFeed {
    pub fn ok(price: Decimal) -> Self {
        Self {
            answer: Mutex::new(Ok(price)),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Mutex::new(Err("http status 429".into())),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, answer: Result<Decimal, String>) {
        if let Ok(mut a) = self.answer.lock() {
            *a = answer;
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn usd_price(&self, _asset: &str) -> eyre::Result<Decimal> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .answer
            .lock()
            .map_err(|e| eyre::eyre!("mock poisoned: {e}"))?
            .clone();
        answer.map_err(|e| eyre::eyre!(e))
    }
}

/// Signs nothing; records submitted transactions and hands out sequential hashes.
pub struct RecordingSigner {
    address: Address,
    fail_with: Option<String>,
    sent: Mutex<Vec<UnsignedTransaction>>,
}

impl RecordingSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            fail_with: None,
            sent: Mutex::new(vec![]),
        }
    }

    pub fn failing(address: Address, message: &str) -> Self {
        Self {
            address,
            fail_with: Some(message.to_owned()),
            sent: Mutex::new(vec![]),
        }
    }

    pub fn sent(&self) -> Vec<UnsignedTransaction> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Hash handed out for the `n`th (1-based) submission.
    pub fn hash_for(n: u8) -> B256 {
        B256::repeat_byte(n)
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_and_send(&self, tx: UnsignedTransaction) -> eyre::Result<B256> {
        if let Some(msg) = &self.fail_with {
            eyre::bail!("{msg}");
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| eyre::eyre!("mock poisoned: {e}"))?;
        sent.push(tx);
        let n = u8::try_from(sent.len()).unwrap_or(u8::MAX);
        Ok(Self::hash_for(n))
    }
}

/// Hands out one signer for its own address and nothing for anyone else.
pub struct SingleSignerProvider {
    signer: Arc<RecordingSigner>,
}

impl SingleSignerProvider {
    pub const fn new(signer: Arc<RecordingSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl SigningProvider for SingleSignerProvider {
    async fn signer_for(
        &self,
        address: Address,
    ) -> eyre::Result<Option<Arc<dyn TransactionSigner>>> {
        if address == self.signer.address() {
            let concrete = Arc::clone(&self.signer);
            let s: Arc<dyn TransactionSigner> = concrete;
            return Ok(Some(s));
        }
        Ok(None)
    }
}
