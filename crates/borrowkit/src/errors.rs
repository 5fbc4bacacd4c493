use rust_decimal::Decimal;
use thiserror::Error;

/// Failures of the JSON-RPC transport layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),

    #[error("request to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("http status {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("all rpc endpoints failed ({method})")]
    AllEndpointsFailed { method: String },
}

/// Malformed hex or word data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty hex payload")]
    Empty,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("word {index} out of range (payload has {available} words)")]
    WordOutOfRange { index: usize, available: usize },

    #[error("value does not fit: {0}")]
    Overflow(String),

    #[error("unexpected layout: {0}")]
    Layout(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },

    #[error("price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("approval required: allowance {allowance} below {required}")]
    ApprovalRequired { allowance: String, required: String },

    #[error("projected health factor {projected} is below the safe minimum")]
    UnsafeHealthFactor { projected: Decimal },

    #[error("invalid vault config: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// The borrow step an orchestrator error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowStep {
    CheckingApproval,
    ApprovingCollateral,
    DepositingAndBorrowing,
}

impl BorrowStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckingApproval => "checking approval",
            Self::ApprovingCollateral => "approving collateral",
            Self::DepositingAndBorrowing => "depositing and borrowing",
        }
    }
}

impl std::fmt::Display for BorrowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("{step}: {source}")]
    Service {
        step: BorrowStep,
        #[source]
        source: ServiceError,
    },

    #[error("{step}: no signer available for {address}")]
    SignerUnavailable { step: BorrowStep, address: String },

    #[error("{step}: signing failed: {message}")]
    Signing { step: BorrowStep, message: String },

    #[error("{step}: transaction {tx_hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout {
        step: BorrowStep,
        tx_hash: String,
        attempts: u32,
    },

    #[error("{step}: transaction {tx_hash} reverted")]
    Reverted { step: BorrowStep, tx_hash: String },
}

impl OrchestratorError {
    pub fn service(step: BorrowStep, source: impl Into<ServiceError>) -> Self {
        Self::Service {
            step,
            source: source.into(),
        }
    }

    pub const fn step(&self) -> BorrowStep {
        match self {
            Self::Service { step, .. }
            | Self::SignerUnavailable { step, .. }
            | Self::Signing { step, .. }
            | Self::ConfirmationTimeout { step, .. }
            | Self::Reverted { step, .. } => *step,
        }
    }

    /// The only error text an end user ever sees for a failed borrow.
    pub fn user_message(&self) -> String {
        let action = match self.step() {
            BorrowStep::CheckingApproval => "Checking the collateral approval",
            BorrowStep::ApprovingCollateral => "Approving the collateral",
            BorrowStep::DepositingAndBorrowing => "Depositing collateral and borrowing",
        };
        match self {
            Self::Service { source, .. } => match source {
                ServiceError::Transport(_) => {
                    format!("{action} failed: the network could not be reached. Please try again.")
                }
                ServiceError::Codec(_) => {
                    format!("{action} failed: the network returned an unexpected response.")
                }
                ServiceError::ApprovalRequired { .. } => {
                    format!("{action} failed: the collateral approval did not take effect.")
                }
                other => format!("{action} failed: {other}."),
            },
            Self::SignerUnavailable { .. } => {
                format!("{action} failed: your wallet is not available for signing.")
            }
            Self::Signing { message, .. } => {
                format!("{action} failed: the wallet did not sign the transaction ({message}).")
            }
            Self::ConfirmationTimeout { .. } => format!(
                "{action} is taking longer than expected. Check your activity before retrying."
            ),
            Self::Reverted { .. } => {
                format!("{action} failed: the transaction was reverted on-chain.")
            }
        }
    }
}
