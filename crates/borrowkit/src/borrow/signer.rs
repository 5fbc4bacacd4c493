//! Signing collaborator seam. Key custody, signing and broadcast live behind these traits.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub from: Address,
    pub to: Address,
    /// `0x`-prefixed calldata.
    pub data: String,
    pub value: U256,
    pub chain_id: u64,
    /// Estimate plus buffer. The signer may replace it.
    pub gas_limit: u64,
}

/// Signs and broadcasts for one address, returning the transaction hash.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_and_send(&self, tx: UnsignedTransaction) -> eyre::Result<B256>;
}

/// Looks up a signer for a wallet address. `None` when the wallet cannot sign.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn signer_for(&self, address: Address)
        -> eyre::Result<Option<Arc<dyn TransactionSigner>>>;
}

/// Provider for read-only sessions: no address can sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

#[async_trait]
impl SigningProvider for NoSigner {
    async fn signer_for(
        &self,
        _address: Address,
    ) -> eyre::Result<Option<Arc<dyn TransactionSigner>>> {
        Ok(None)
    }
}
