//! Canonical ledger record types
//!
//! Money is carried as u64 minor units (cents). Odds and payout multipliers
//! are u32 hundredths (250 = 2.50x). Commission rates are basis points.
//! All amount arithmetic is checked; overflow surfaces as a validation
//! error rather than a wrapped balance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Kind of an append-only ledger entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    StakeDebit,
    WinCredit,
    Refund,
    Commission,
    Deposit,
    Withdrawal,
}

impl EntryKind {
    /// Whether this kind moves money into the account
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            EntryKind::WinCredit | EntryKind::Refund | EntryKind::Commission | EntryKind::Deposit
        )
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::StakeDebit => write!(f, "stake_debit"),
            EntryKind::WinCredit => write!(f, "win_credit"),
            EntryKind::Refund => write!(f, "refund"),
            EntryKind::Commission => write!(f, "commission"),
            EntryKind::Deposit => write!(f, "deposit"),
            EntryKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Append-only ledger entry. Never mutated after creation; the account's
/// current balance always equals the running sum of its entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Globally unique, monotonically increasing sequence number
    pub seq: u64,
    pub account_id: String,
    pub kind: EntryKind,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    /// Id of the originating bet, round, settlement or transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// A wagering account. Balance is mutated only through `Ledger` operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub balance: u64,
    /// Credit headroom granted by the operator; read by the identity
    /// collaborator, not consumed by the debit rule here
    pub credit_limit: u64,
    /// Per-account stake overrides; None falls through to the global bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stake: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stake: Option<u64>,
    /// Maximum total pending stake allowed on a single match
    pub match_exposure_limit: u64,
    /// Full account lock: no financial operations at all
    pub locked: bool,
    /// Betting lock: deposits/withdrawals allowed, wagers rejected
    pub bet_locked: bool,
    pub active: bool,
    /// Direct agent this account belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: u64,
}

impl Account {
    /// Create an active, unlocked account with the given opening balance.
    pub fn new(id: impl Into<String>, opening_balance: u64) -> Self {
        Self {
            id: id.into(),
            balance: opening_balance,
            credit_limit: 0,
            min_stake: None,
            max_stake: None,
            match_exposure_limit: u64::MAX,
            locked: false,
            bet_locked: false,
            active: true,
            agent_id: None,
            created_at: current_timestamp_ms(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_exposure_limit(mut self, limit: u64) -> Self {
        self.match_exposure_limit = limit;
        self
    }

    pub fn with_stake_bounds(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_stake = min;
        self.max_stake = max;
        self
    }
}

/// Get current timestamp in milliseconds since Unix epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Generate a fresh record id
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}
