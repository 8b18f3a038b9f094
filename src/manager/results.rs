// 8.0.2 manager/results.rs: result types and errors for manager operations.

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::plan::PlanError;
use crate::position::Operator;
use crate::registry::RegistryError;
use crate::settlement::SettlementError;
use crate::subscriber::SubscriptionError;
use crate::types::{AccountId, Range, ReceiptId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInfo {
    pub receipt: ReceiptId,
    pub owner: AccountId,
    pub range: Range,
    pub liquidity: u128,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
    pub operator: Option<Operator>,
    pub nonce: u64,
    pub subscribed: bool,
}

/// Coarse error taxonomy. Nothing is retried; every class needs a changed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authorization,
    State,
    Temporal,
    ExternalCall,
    BatchStep,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("{caller} is not authorized for receipt {receipt}")]
    Unauthorized { caller: AccountId, receipt: ReceiptId },

    #[error("Must be unlocked by this manager")]
    MustBeUnlockedByThisContract,

    #[error("A session is already open")]
    SessionAlreadyOpen,

    #[error("Not allowed while a session is open")]
    SessionInProgress,

    #[error("Deadline {deadline:?} passed at {now:?}")]
    DeadlinePassed { deadline: Timestamp, now: Timestamp },

    #[error("Config does not match the range of receipt {receipt}")]
    IncorrectPositionConfig { receipt: ReceiptId },

    #[error("Swap output {actual} below minimum {min}")]
    SlippageExceeded { min: u128, actual: u128 },

    #[error("Invalid nonce for receipt {receipt}: expected {expected}, got {got}")]
    InvalidNonce { receipt: ReceiptId, expected: u64, got: u64 },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ManagerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ManagerError::Unauthorized { .. } | ManagerError::InvalidNonce { .. } => ErrorClass::Authorization,
            ManagerError::DeadlinePassed { .. } => ErrorClass::Temporal,
            ManagerError::Subscription(SubscriptionError::SubscriptionReverted { .. }) => ErrorClass::ExternalCall,
            ManagerError::Plan(_) => ErrorClass::BatchStep,
            _ => ErrorClass::State,
        }
    }

    pub fn is_insufficient_liquidity(&self) -> bool {
        matches!(
            self,
            ManagerError::Registry(RegistryError::InsufficientLiquidity { .. })
                | ManagerError::Ledger(LedgerError::InsufficientLiquidity { .. })
        )
    }
}
