//! Lending engine for EVM wallets: position reads, vault risk math and a deposit-and-borrow flow
//! over plain JSON-RPC.
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

pub mod abi;
pub mod amount;
pub mod borrow;
pub mod config;
pub mod errors;
pub mod paths;
pub mod positions;
pub mod price;
pub mod rpc;
pub mod store;
pub mod tokens;
pub mod vault;

#[cfg(test)]
mod testing;
