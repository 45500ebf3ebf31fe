//! Error types for the Stakehouse wagering engine
//!
//! Every financial entry point fails with one of these before any mutation,
//! except `ExternalDependency` which is logged at the emission site and
//! never surfaced to callers of financial operations.

use serde::{Deserialize, Serialize};

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Input rejected before any mutation (out-of-bounds stake, bad selection,
    /// arithmetic overflow on a payout computation)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The entity exists but is in a state that forbids the operation
    /// (bet already terminal, match settled, account locked)
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// A debit would take the account balance below zero
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    /// Unknown account, bet, match, round, agent or settlement id
    #[error("Not found: {0}")]
    NotFound(String),

    /// A non-rejected settlement already covers part of the requested period
    #[error("Duplicate settlement period for agent {agent_id}")]
    DuplicatePeriod { agent_id: String },

    /// Notification/event delivery failure; logged only, never propagated
    /// out of a financial operation
    #[error("External dependency failed: {0}")]
    ExternalDependency(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        EngineError::StateConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    /// Stable machine-readable code, used by batch reports and clients
    /// that need to react distinctly to failure classes.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION",
            EngineError::StateConflict(_) => "STATE_CONFLICT",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::DuplicatePeriod { .. } => "DUPLICATE_PERIOD",
            EngineError::ExternalDependency(_) => "EXTERNAL_DEPENDENCY",
        }
    }
}

/// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;

/// Serializable failure entry collected by batch sweeps instead of aborting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemFailure {
    /// Id of the bet/agent/round the failure belongs to
    pub item_id: String,
    pub code: String,
    pub message: String,
}

impl ItemFailure {
    pub fn from_error(item_id: impl Into<String>, error: &EngineError) -> Self {
        Self {
            item_id: item_id.into(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InsufficientFunds {
            balance: 50,
            requested: 100,
        };
        assert!(err.to_string().contains("balance 50"));
        assert!(err.to_string().contains("requested 100"));
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(EngineError::validation("x").code(), "VALIDATION");
        assert_eq!(EngineError::state_conflict("x").code(), "STATE_CONFLICT");
        assert_eq!(
            EngineError::DuplicatePeriod {
                agent_id: "a".to_string()
            }
            .code(),
            "DUPLICATE_PERIOD"
        );
    }

    #[test]
    fn test_item_failure_from_error() {
        let err = EngineError::not_found("bet 42");
        let failure = ItemFailure::from_error("42", &err);
        assert_eq!(failure.item_id, "42");
        assert_eq!(failure.code, "NOT_FOUND");
        assert!(failure.message.contains("bet 42"));
    }
}
