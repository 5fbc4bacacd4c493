use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

use crate::{
    abi::{selectors, serialize_display},
    errors::BorrowStep,
    rpc::TxReceipt,
};

/// Where a position id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionIdSource {
    /// `tokenId` of the ERC-721 mint `Transfer` log.
    MintLog,
    /// Derived from the transaction hash; no mint log was found.
    TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionRef {
    #[serde(serialize_with = "serialize_display")]
    pub id: U256,
    pub source: PositionIdSource,
    #[serde(serialize_with = "serialize_display")]
    pub tx_hash: B256,
}

/// Position NFT minted to `user` in `receipt`.
///
/// Looks for an ERC-721 `Transfer(0x0, user, tokenId)` log; any emitting contract is accepted
/// since the vault factory mints on behalf of the vault. Without one, the low eight bytes of the
/// transaction hash stand in as the id.
pub fn position_from_receipt(receipt: &TxReceipt, user: Address) -> PositionRef {
    let mint = receipt.logs.iter().find_map(|log| match log.topics.as_slice() {
        [topic, from, to, token_id]
            if *topic == selectors::TRANSFER_TOPIC
                && *from == B256::ZERO
                && Address::from_word(*to) == user =>
        {
            Some(U256::from_be_bytes(token_id.0))
        }
        _ => None,
    });
    match mint {
        Some(id) => PositionRef {
            id,
            source: PositionIdSource::MintLog,
            tx_hash: receipt.transaction_hash,
        },
        None => PositionRef {
            id: hash_derived_id(receipt.transaction_hash),
            source: PositionIdSource::TxHash,
            tx_hash: receipt.transaction_hash,
        },
    }
}

fn hash_derived_id(tx_hash: B256) -> U256 {
    let mut low = [0_u8; 8];
    if let Some(tail) = tx_hash.0.get(24..) {
        low.copy_from_slice(tail);
    }
    U256::from(u64::from_be_bytes(low))
}

/// Borrow flow state. Moves strictly forward; terminal states stay until reset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransactionState {
    #[default]
    Idle,
    CheckingApproval,
    ApprovingCollateral,
    DepositingAndBorrowing,
    Success {
        position: PositionRef,
    },
    Failed {
        #[serde(serialize_with = "serialize_display")]
        step: BorrowStep,
        reason: String,
    },
}

impl TransactionState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Forward edges of the flow. Terminal states only leave through an explicit reset.
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::CheckingApproval)
            | (
                Self::CheckingApproval,
                Self::ApprovingCollateral | Self::DepositingAndBorrowing,
            )
            | (Self::ApprovingCollateral, Self::DepositingAndBorrowing)
            | (Self::DepositingAndBorrowing, Self::Success { .. })
            | (
                Self::CheckingApproval | Self::ApprovingCollateral | Self::DepositingAndBorrowing,
                Self::Failed { .. },
            ) => true,
            (
                Self::Idle
                | Self::CheckingApproval
                | Self::ApprovingCollateral
                | Self::DepositingAndBorrowing
                | Self::Success { .. }
                | Self::Failed { .. },
                _,
            ) => false,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingApproval => "checking_approval",
            Self::ApprovingCollateral => "approving_collateral",
            Self::DepositingAndBorrowing => "depositing_and_borrowing",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
        }
    }
}
