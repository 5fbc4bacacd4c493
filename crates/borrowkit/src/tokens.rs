use std::sync::Arc;

use alloy::primitives::{address, Address, U256};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    abi::{decode_uint, encode_call, selectors, serialize_display, AbiArg},
    amount::base_units_to_decimal,
    errors::{CodecError, ServiceError},
    rpc::{BlockTag, ContractCall, EthRpc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenDescriptor {
    #[serde(serialize_with = "serialize_display")]
    pub address: Address,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Collateral token of the default vault.
pub const WETH: TokenDescriptor = TokenDescriptor {
    address: address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
    symbol: "WETH",
    decimals: 18,
};

/// Debt token of the default vault.
pub const USDC: TokenDescriptor = TokenDescriptor {
    address: address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
    symbol: "USDC",
    decimals: 6,
};

pub const USDT: TokenDescriptor = TokenDescriptor {
    address: address!("dac17f958d2ee523a2206206994597c13d831ec7"),
    symbol: "USDT",
    decimals: 6,
};

pub const KNOWN_TOKENS: [TokenDescriptor; 3] = [WETH, USDC, USDT];

pub fn token_by_address(address: Address) -> Option<TokenDescriptor> {
    KNOWN_TOKENS.into_iter().find(|t| t.address == address)
}

/// A balance as read from the chain. The decimal value is always derived from `raw_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    #[serde(serialize_with = "serialize_display")]
    address: Address,
    symbol: &'static str,
    decimals: u8,
    raw_hex: String,
    #[serde(serialize_with = "serialize_display")]
    value: Decimal,
}

impl TokenBalance {
    pub fn from_raw(token: &TokenDescriptor, raw_hex: impl Into<String>) -> Result<Self, CodecError> {
        let raw_hex = raw_hex.into();
        let value = base_units_to_decimal(decode_uint(&raw_hex)?, token.decimals)?;
        Ok(Self {
            address: token.address,
            symbol: token.symbol,
            decimals: token.decimals,
            raw_hex,
            value,
        })
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn raw_hex(&self) -> &str {
        &self.raw_hex
    }

    pub const fn value(&self) -> Decimal {
        self.value
    }
}

/// ERC-20 reads. Failures propagate to the caller.
#[derive(Clone)]
pub struct TokenService {
    rpc: Arc<dyn EthRpc>,
}

impl TokenService {
    pub fn new(rpc: Arc<dyn EthRpc>) -> Self {
        Self { rpc }
    }

    pub async fn balance_of(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<TokenBalance, ServiceError> {
        let data = encode_call(selectors::BALANCE_OF, &[AbiArg::Address(owner)])?;
        let raw = self
            .rpc
            .eth_call(&ContractCall::new(token.address, data), BlockTag::Latest)
            .await?;
        Ok(TokenBalance::from_raw(token, raw)?)
    }

    pub async fn allowance_raw(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ServiceError> {
        let data = encode_call(
            selectors::ALLOWANCE,
            &[AbiArg::Address(owner), AbiArg::Address(spender)],
        )?;
        let raw = self
            .rpc
            .eth_call(&ContractCall::new(token.address, data), BlockTag::Latest)
            .await?;
        Ok(decode_uint(&raw)?)
    }

    /// Allowance in token units. Unlimited approvals (`2^256 - 1`) exceed the decimal range and
    /// saturate to `Decimal::MAX`.
    pub async fn allowance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        spender: Address,
    ) -> Result<Decimal, ServiceError> {
        let raw = self.allowance_raw(token, owner, spender).await?;
        match base_units_to_decimal(raw, token.decimals) {
            Ok(v) => Ok(v),
            Err(CodecError::Overflow(_)) => Ok(Decimal::MAX),
            Err(e) => Err(e.into()),
        }
    }

    /// Concurrent `balanceOf` over `tokens`, in input order. The first failure is returned.
    pub async fn balances_of(
        &self,
        tokens: &[TokenDescriptor],
        owner: Address,
    ) -> Result<Vec<TokenBalance>, ServiceError> {
        try_join_all(tokens.iter().map(|t| self.balance_of(t, owner))).await
    }
}
