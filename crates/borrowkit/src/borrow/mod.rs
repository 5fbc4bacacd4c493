//! Borrow flow: state machine, signing seam and the orchestrator driving them.

pub mod orchestrator;
pub mod signer;
pub mod state;

pub use orchestrator::{
    approve_calldata, operate_calldata, BorrowOrchestrator, BorrowPlan, BorrowRequest,
    ConfirmationPolicy,
};
pub use signer::{NoSigner, SigningProvider, TransactionSigner, UnsignedTransaction};
pub use state::{position_from_receipt, PositionIdSource, PositionRef, TransactionState};
