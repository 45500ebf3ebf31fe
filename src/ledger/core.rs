//! Atomic balance mutation with an append-only entry log
//!
//! Every financial unit runs under the owning account's mutex: balance
//! check, balance write and all accompanying record inserts happen inside
//! one lock scope, so partial application is never observable. Two
//! concurrent debits against one account serialize on that lock; only the
//! affordable ones succeed.

use crate::errors::{EngineError, EngineResult};
use crate::ledger::types::{current_timestamp_ms, Account, EntryKind, LedgerEntry};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tracing::debug;

/// Per-account state guarded by the account mutex
struct AccountState {
    account: Account,
    opening_balance: u64,
    entries: Vec<LedgerEntry>,
}

/// A single atomic unit of work against one account.
///
/// Handed to `Ledger::with_account` closures; every debit/credit applied
/// through it lands in the same lock scope as the caller's record inserts.
pub struct AccountTxn<'a> {
    state: &'a mut AccountState,
    seq: &'a AtomicU64,
}

impl AccountTxn<'_> {
    pub fn account(&self) -> &Account {
        &self.state.account
    }

    /// Remove funds. Fails with `InsufficientFunds` before any mutation if
    /// the debit would take the balance below zero.
    pub fn debit(
        &mut self,
        amount: u64,
        kind: EntryKind,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        let before = self.state.account.balance;
        if amount > before {
            return Err(EngineError::InsufficientFunds {
                balance: before,
                requested: amount,
            });
        }
        self.apply(before, before - amount, amount, kind, reference)
    }

    /// Add funds. Fails on balance overflow before any mutation.
    pub fn credit(
        &mut self,
        amount: u64,
        kind: EntryKind,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        let before = self.state.account.balance;
        let after = before.checked_add(amount).ok_or_else(|| {
            EngineError::validation(format!(
                "credit of {} overflows balance {} on account {}",
                amount, before, self.state.account.id
            ))
        })?;
        self.apply(before, after, amount, kind, reference)
    }

    fn apply(
        &mut self,
        before: u64,
        after: u64,
        amount: u64,
        kind: EntryKind,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        let entry = LedgerEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            account_id: self.state.account.id.clone(),
            kind,
            amount,
            balance_before: before,
            balance_after: after,
            reference,
            timestamp: current_timestamp_ms(),
        };

        // Balance write and entry append are one unit; nothing between them
        // can fail or observe the intermediate state.
        self.state.account.balance = after;
        self.state.entries.push(entry.clone());

        debug!(
            account = %entry.account_id,
            kind = %entry.kind,
            amount,
            balance = after,
            "ledger entry appended"
        );
        Ok(entry)
    }
}

/// The ledger core: accounts, balances and the append-only entry log.
pub struct Ledger {
    accounts: DashMap<String, Arc<Mutex<AccountState>>>,
    entry_seq: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            entry_seq: AtomicU64::new(1),
        }
    }

    /// Register a new account. The opening balance is recorded as the base
    /// of the running-sum invariant, not as an entry.
    pub fn register_account(&self, account: Account) -> EngineResult<()> {
        let id = account.id.clone();
        let opening_balance = account.balance;
        let state = Arc::new(Mutex::new(AccountState {
            account,
            opening_balance,
            entries: Vec::new(),
        }));
        match self.accounts.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::state_conflict(
                format!("account {} already registered", id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(())
            }
        }
    }

    /// Run `f` as one atomic unit against the account. All ledger mutations
    /// and record inserts performed inside `f` share the account lock.
    pub fn with_account<T>(
        &self,
        account_id: &str,
        f: impl FnOnce(&mut AccountTxn<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let state = self
            .accounts
            .get(account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(format!("account {}", account_id)))?;

        let mut guard = state.lock().unwrap();
        let mut txn = AccountTxn {
            state: &mut *guard,
            seq: &self.entry_seq,
        };
        f(&mut txn)
    }

    pub fn debit(
        &self,
        account_id: &str,
        amount: u64,
        kind: EntryKind,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        self.with_account(account_id, |txn| txn.debit(amount, kind, reference))
    }

    pub fn credit(
        &self,
        account_id: &str,
        amount: u64,
        kind: EntryKind,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        self.with_account(account_id, |txn| txn.credit(amount, kind, reference))
    }

    /// External money in: same atomicity as any other credit.
    pub fn deposit(
        &self,
        account_id: &str,
        amount: u64,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        if amount == 0 {
            return Err(EngineError::validation("deposit amount must be positive"));
        }
        self.credit(account_id, amount, EntryKind::Deposit, reference)
    }

    /// External money out: rejected when the account is fully locked.
    pub fn withdraw(
        &self,
        account_id: &str,
        amount: u64,
        reference: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        if amount == 0 {
            return Err(EngineError::validation(
                "withdrawal amount must be positive",
            ));
        }
        self.with_account(account_id, |txn| {
            if txn.account().locked || !txn.account().active {
                return Err(EngineError::state_conflict(format!(
                    "account {} is locked",
                    txn.account().id
                )));
            }
            txn.debit(amount, EntryKind::Withdrawal, reference)
        })
    }

    pub fn balance(&self, account_id: &str) -> EngineResult<u64> {
        self.with_account(account_id, |txn| Ok(txn.account().balance))
    }

    pub fn account(&self, account_id: &str) -> EngineResult<Account> {
        self.with_account(account_id, |txn| Ok(txn.account().clone()))
    }

    /// Snapshot of the account's entry history, oldest first.
    pub fn entries(&self, account_id: &str) -> EngineResult<Vec<LedgerEntry>> {
        let state = self
            .accounts
            .get(account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(format!("account {}", account_id)))?;
        let guard = state.lock().unwrap();
        Ok(guard.entries.clone())
    }

    pub fn set_locks(
        &self,
        account_id: &str,
        locked: bool,
        bet_locked: bool,
        active: bool,
    ) -> EngineResult<()> {
        self.with_account(account_id, |txn| {
            txn.state.account.locked = locked;
            txn.state.account.bet_locked = bet_locked;
            txn.state.account.active = active;
            Ok(())
        })
    }

    pub fn update_stake_limits(
        &self,
        account_id: &str,
        min_stake: Option<u64>,
        max_stake: Option<u64>,
        match_exposure_limit: u64,
    ) -> EngineResult<()> {
        if let (Some(min), Some(max)) = (min_stake, max_stake) {
            if min > max {
                return Err(EngineError::validation(format!(
                    "min stake {} exceeds max stake {}",
                    min, max
                )));
            }
        }
        self.with_account(account_id, |txn| {
            txn.state.account.min_stake = min_stake;
            txn.state.account.max_stake = max_stake;
            txn.state.account.match_exposure_limit = match_exposure_limit;
            Ok(())
        })
    }

    /// Audit the running-sum invariant: opening balance plus the signed sum
    /// of all entries must equal the current balance, and each entry must
    /// chain consistently onto the previous one.
    pub fn verify_account(&self, account_id: &str) -> EngineResult<bool> {
        let state = self
            .accounts
            .get(account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(format!("account {}", account_id)))?;
        let guard = state.lock().unwrap();

        let mut running = guard.opening_balance;
        for entry in &guard.entries {
            if entry.balance_before != running {
                return Ok(false);
            }
            let expected_after = if entry.kind.is_credit() {
                entry.balance_before.checked_add(entry.amount)
            } else {
                entry.balance_before.checked_sub(entry.amount)
            };
            if expected_after != Some(entry.balance_after) {
                return Ok(false);
            }
            running = entry.balance_after;
        }
        Ok(running == guard.account.balance)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Ids of the accounts directly under an agent; consumed by the
    /// settlement generator when aggregating a period.
    pub fn accounts_for_agent(&self, agent_id: &str) -> Vec<String> {
        self.accounts
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().lock().unwrap();
                if guard.account.agent_id.as_deref() == Some(agent_id) {
                    Some(guard.account.id.clone())
                } else {
                    None
                }
            })
            .collect()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
