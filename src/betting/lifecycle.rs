//! Bet lifecycle orchestration: placement, settlement and voiding.
//!
//! Placement and per-bet settlement are single atomic units under the
//! owning account's lock (stake debit, bet record, entry log and match
//! totals move together). Match-wide settlement is deliberately NOT one
//! unit: every bet settles in its own transaction so one malformed bet
//! cannot block payment of the rest.

use crate::betting::resolver::resolve_outcome;
use crate::betting::types::{
    Bet, BetSide, BetStatus, MatchRecord, MatchResult, MatchStatus, SweepReport,
};
use crate::commission::CommissionLedger;
use crate::config::BettingConfig;
use crate::errors::{EngineError, EngineResult, ItemFailure};
use crate::events::{EngineEvent, EventBus};
use crate::ledger::types::{current_timestamp_ms, new_record_id, EntryKind};
use crate::ledger::Ledger;
use crate::metrics::EngineMetrics;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Inputs for a new wager.
#[derive(Debug, Clone)]
pub struct PlaceBetRequest {
    pub account_id: String,
    pub match_id: String,
    pub bet_type: crate::betting::types::BetType,
    pub selection: String,
    pub side: BetSide,
    pub stake: u64,
    /// Offered odds in hundredths (250 = 2.50x)
    pub odds: u32,
}

pub struct BetEngine {
    config: BettingConfig,
    ledger: Arc<Ledger>,
    commissions: Arc<CommissionLedger>,
    events: EventBus,
    metrics: Arc<EngineMetrics>,
    bets: DashMap<String, Bet>,
    matches: DashMap<String, Arc<Mutex<MatchRecord>>>,
    /// Pending stake per (account, match); only ever touched under the
    /// owning account's ledger lock
    exposure: DashMap<(String, String), u64>,
}

impl BetEngine {
    pub fn new(
        config: BettingConfig,
        ledger: Arc<Ledger>,
        commissions: Arc<CommissionLedger>,
        events: EventBus,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            ledger,
            commissions,
            events,
            metrics,
            bets: DashMap::new(),
            matches: DashMap::new(),
            exposure: DashMap::new(),
        }
    }

    pub fn register_match(&self, record: MatchRecord) -> EngineResult<()> {
        let id = record.id.clone();
        match self.matches.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::state_conflict(
                format!("match {} already registered", id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(record)));
                Ok(())
            }
        }
    }

    /// Operator toggle: close or reopen the betting window.
    pub fn set_betting_locked(&self, match_id: &str, locked: bool) -> EngineResult<()> {
        let handle = self.match_handle(match_id)?;
        let mut record = handle.lock().unwrap();
        if record.status.is_final() {
            return Err(EngineError::state_conflict(format!(
                "match {} is {}",
                match_id, record.status
            )));
        }
        record.status = if locked {
            MatchStatus::Locked
        } else {
            MatchStatus::Open
        };
        Ok(())
    }

    /// Mark a match finished (result known, awaiting the settlement sweep).
    pub fn mark_finished(&self, match_id: &str) -> EngineResult<()> {
        let handle = self.match_handle(match_id)?;
        let mut record = handle.lock().unwrap();
        if record.status.is_final() {
            return Err(EngineError::state_conflict(format!(
                "match {} is {}",
                match_id, record.status
            )));
        }
        record.status = MatchStatus::Finished;
        Ok(())
    }

    /// Place a wager. One atomic unit: stake debit, bet record, ledger
    /// entry and match totals, all under the account lock.
    pub fn place_bet(&self, request: PlaceBetRequest) -> EngineResult<Bet> {
        if request.stake == 0 {
            return Err(EngineError::validation("stake must be positive"));
        }
        if request.odds < 100 {
            return Err(EngineError::validation(format!(
                "odds {} below 1.00",
                request.odds
            )));
        }
        if request.stake < self.config.min_stake || request.stake > self.config.max_stake {
            return Err(EngineError::validation(format!(
                "stake {} outside global bounds {}..={}",
                request.stake, self.config.min_stake, self.config.max_stake
            )));
        }

        let potential_win = potential_win(request.stake, request.odds)?;
        let match_handle = self.match_handle(&request.match_id)?;
        let bet_id = new_record_id();

        let bet = self.ledger.with_account(&request.account_id, |txn| {
            let account = txn.account();

            // Personal stake overrides
            if let Some(min) = account.min_stake {
                if request.stake < min {
                    return Err(EngineError::validation(format!(
                        "stake {} below account minimum {}",
                        request.stake, min
                    )));
                }
            }
            if let Some(max) = account.max_stake {
                if request.stake > max {
                    return Err(EngineError::validation(format!(
                        "stake {} above account maximum {}",
                        request.stake, max
                    )));
                }
            }

            // Match bounds and state, checked under the match lock so a
            // concurrent void/settle sweep cannot slip between check and debit.
            let mut match_record = match_handle.lock().unwrap();
            if let Some(min) = match_record.min_stake {
                if request.stake < min {
                    return Err(EngineError::validation(format!(
                        "stake {} below match minimum {}",
                        request.stake, min
                    )));
                }
            }
            if let Some(max) = match_record.max_stake {
                if request.stake > max {
                    return Err(EngineError::validation(format!(
                        "stake {} above match maximum {}",
                        request.stake, max
                    )));
                }
            }

            if account.locked || account.bet_locked || !account.active {
                return Err(EngineError::state_conflict(format!(
                    "account {} is not allowed to bet",
                    account.id
                )));
            }
            if !match_record.status.accepts_bets() {
                return Err(EngineError::state_conflict(format!(
                    "match {} is {}",
                    match_record.id, match_record.status
                )));
            }

            // Per-match exposure: stake plus existing pending stake on this
            // match must stay within the account's limit.
            let exposure_key = (account.id.clone(), match_record.id.clone());
            let existing = self.exposure.get(&exposure_key).map(|e| *e).unwrap_or(0);
            let combined = existing.saturating_add(request.stake);
            if combined > account.match_exposure_limit {
                return Err(EngineError::validation(format!(
                    "exposure {} on match {} exceeds limit {}",
                    combined, match_record.id, account.match_exposure_limit
                )));
            }

            let entry = txn.debit(request.stake, EntryKind::StakeDebit, Some(bet_id.clone()))?;

            let bet = Bet {
                id: bet_id.clone(),
                account_id: request.account_id.clone(),
                match_id: request.match_id.clone(),
                bet_type: request.bet_type,
                selection: request.selection.clone(),
                side: request.side,
                stake: request.stake,
                odds: request.odds,
                potential_win,
                status: BetStatus::Pending,
                placed_at: entry.timestamp,
                settled_at: None,
                void_reason: None,
            };
            self.bets.insert(bet_id.clone(), bet.clone());
            *self.exposure.entry(exposure_key).or_insert(0) += request.stake;

            match_record.bet_count += 1;
            match_record.total_staked = match_record.total_staked.saturating_add(request.stake);

            Ok((bet, entry.balance_after))
        });

        match bet {
            Ok((bet, balance)) => {
                self.metrics.record_bet_placed(bet.stake);
                self.events.emit(EngineEvent::BalanceChanged {
                    account_id: bet.account_id.clone(),
                    balance,
                });
                info!(bet = %bet.id, account = %bet.account_id, stake = bet.stake, "bet placed");
                Ok(bet)
            }
            Err(e) => Err(e),
        }
    }

    /// Settle a single bet exactly once. `won` is the final verdict with
    /// any lay inversion already applied by the caller.
    pub fn settle_bet(&self, bet_id: &str, won: bool) -> EngineResult<Bet> {
        let account_id = self
            .bets
            .get(bet_id)
            .map(|b| b.account_id.clone())
            .ok_or_else(|| EngineError::not_found(format!("bet {}", bet_id)))?;

        let settled = self.ledger.with_account(&account_id, |txn| {
            let mut bet = self
                .bets
                .get_mut(bet_id)
                .ok_or_else(|| EngineError::not_found(format!("bet {}", bet_id)))?;

            if bet.status.is_terminal() {
                return Err(EngineError::state_conflict(format!(
                    "bet {} is not pending",
                    bet_id
                )));
            }

            let payout = if won { bet.potential_win } else { 0 };
            let balance = if won {
                let entry = txn.credit(payout, EntryKind::WinCredit, Some(bet.id.clone()))?;
                entry.balance_after
            } else {
                txn.account().balance
            };

            bet.status = if won { BetStatus::Won } else { BetStatus::Lost };
            bet.settled_at = Some(current_timestamp_ms());
            self.release_exposure(&bet.account_id, &bet.match_id, bet.stake);

            Ok((bet.clone(), payout, balance))
        })?;

        let (bet, payout, balance) = settled;

        // Commission cascades off the credited win, after the financial
        // unit committed. Agent bookkeeping never touches account locks.
        if won {
            let account = self.ledger.account(&bet.account_id)?;
            self.commissions
                .cascade(&bet.id, payout, account.agent_id.as_deref());
        }

        self.metrics.record_bet_settled(payout);
        self.events.emit(EngineEvent::BetSettled {
            bet_id: bet.id.clone(),
            account_id: bet.account_id.clone(),
            won,
            payout,
        });
        if won {
            self.events.emit(EngineEvent::BalanceChanged {
                account_id: bet.account_id.clone(),
                balance,
            });
        }

        Ok(bet)
    }

    /// Settle every pending bet on a match against its result. Each bet is
    /// its own transaction; failures land in the report, not the sweep.
    pub fn settle_match_bets(&self, match_id: &str, result: &MatchResult) -> EngineResult<SweepReport> {
        let handle = self.match_handle(match_id)?;
        {
            let mut record = handle.lock().unwrap();
            if record.status.is_final() {
                return Err(EngineError::state_conflict(format!(
                    "match {} already {}",
                    match_id, record.status
                )));
            }
            // Close the betting window before sweeping so no bet can slip
            // in behind the collection below.
            record.status = MatchStatus::Finished;
        }

        let pending = self.pending_bets(match_id);
        let mut report = SweepReport {
            match_id: match_id.to_string(),
            ..Default::default()
        };

        for bet in pending {
            let resolved = resolve_outcome(bet.bet_type, &bet.selection, result);
            let won = match bet.side {
                BetSide::Back => resolved,
                BetSide::Lay => !resolved,
            };
            match self.settle_bet(&bet.id, won) {
                Ok(_) => {
                    report.processed += 1;
                    if won {
                        report.won += 1;
                    } else {
                        report.lost += 1;
                    }
                }
                Err(e) => {
                    warn!(bet = %bet.id, error = %e, "bet settlement failed, continuing sweep");
                    report.failures.push(ItemFailure::from_error(bet.id.clone(), &e));
                }
            }
        }

        {
            let mut record = handle.lock().unwrap();
            record.status = MatchStatus::Settled;
            record.winner = Some(result.winner.clone());
            record.settled_at = Some(current_timestamp_ms());
        }
        self.events.emit(EngineEvent::MatchStatusChanged {
            match_id: match_id.to_string(),
            status: MatchStatus::Settled.to_string(),
        });
        info!(
            match_id,
            processed = report.processed,
            failed = report.failures.len(),
            "match settlement sweep complete"
        );

        Ok(report)
    }

    /// Refund every pending bet on a match and cancel it. Never touches a
    /// bet that already reached a terminal state.
    pub fn void_match_bets(&self, match_id: &str, reason: &str) -> EngineResult<SweepReport> {
        let handle = self.match_handle(match_id)?;
        {
            let mut record = handle.lock().unwrap();
            if record.status.is_final() {
                return Err(EngineError::state_conflict(format!(
                    "match {} already {}",
                    match_id, record.status
                )));
            }
            record.status = MatchStatus::Locked;
        }

        let pending = self.pending_bets(match_id);
        let mut report = SweepReport {
            match_id: match_id.to_string(),
            ..Default::default()
        };

        for bet in pending {
            match self.void_bet(&bet.id, reason) {
                Ok(_) => {
                    report.processed += 1;
                    report.voided += 1;
                }
                Err(e) => {
                    warn!(bet = %bet.id, error = %e, "bet void failed, continuing sweep");
                    report.failures.push(ItemFailure::from_error(bet.id.clone(), &e));
                }
            }
        }

        {
            let mut record = handle.lock().unwrap();
            record.status = MatchStatus::Cancelled;
        }
        self.events.emit(EngineEvent::MatchStatusChanged {
            match_id: match_id.to_string(),
            status: MatchStatus::Cancelled.to_string(),
        });

        Ok(report)
    }

    /// Void one pending bet: full stake refund, terminal Void status.
    pub fn void_bet(&self, bet_id: &str, reason: &str) -> EngineResult<Bet> {
        let account_id = self
            .bets
            .get(bet_id)
            .map(|b| b.account_id.clone())
            .ok_or_else(|| EngineError::not_found(format!("bet {}", bet_id)))?;

        let (bet, balance) = self.ledger.with_account(&account_id, |txn| {
            let mut bet = self
                .bets
                .get_mut(bet_id)
                .ok_or_else(|| EngineError::not_found(format!("bet {}", bet_id)))?;

            if bet.status.is_terminal() {
                return Err(EngineError::state_conflict(format!(
                    "bet {} is not pending",
                    bet_id
                )));
            }

            let entry = txn.credit(bet.stake, EntryKind::Refund, Some(bet.id.clone()))?;
            bet.status = BetStatus::Void;
            bet.settled_at = Some(entry.timestamp);
            bet.void_reason = Some(reason.to_string());
            self.release_exposure(&bet.account_id, &bet.match_id, bet.stake);

            Ok((bet.clone(), entry.balance_after))
        })?;

        self.metrics.record_bet_voided();
        self.events.emit(EngineEvent::BalanceChanged {
            account_id: bet.account_id.clone(),
            balance,
        });

        Ok(bet)
    }

    pub fn bet(&self, bet_id: &str) -> EngineResult<Bet> {
        self.bets
            .get(bet_id)
            .map(|b| b.clone())
            .ok_or_else(|| EngineError::not_found(format!("bet {}", bet_id)))
    }

    pub fn match_record(&self, match_id: &str) -> EngineResult<MatchRecord> {
        let handle = self.match_handle(match_id)?;
        let record = handle.lock().unwrap();
        Ok(record.clone())
    }

    pub fn bets_for_account(&self, account_id: &str) -> Vec<Bet> {
        self.bets
            .iter()
            .filter(|b| b.account_id == account_id)
            .map(|b| b.clone())
            .collect()
    }

    pub fn bets_for_match(&self, match_id: &str) -> Vec<Bet> {
        self.bets
            .iter()
            .filter(|b| b.match_id == match_id)
            .map(|b| b.clone())
            .collect()
    }

    /// Snapshot of all bets; consumed by the settlement generator.
    pub fn all_bets(&self) -> Vec<Bet> {
        self.bets.iter().map(|b| b.clone()).collect()
    }

    fn pending_bets(&self, match_id: &str) -> Vec<Bet> {
        self.bets
            .iter()
            .filter(|b| b.match_id == match_id && b.status == BetStatus::Pending)
            .map(|b| b.clone())
            .collect()
    }

    fn match_handle(&self, match_id: &str) -> EngineResult<Arc<Mutex<MatchRecord>>> {
        self.matches
            .get(match_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(format!("match {}", match_id)))
    }

    fn release_exposure(&self, account_id: &str, match_id: &str, stake: u64) {
        let key = (account_id.to_string(), match_id.to_string());
        if let Some(mut entry) = self.exposure.get_mut(&key) {
            *entry = entry.saturating_sub(stake);
        }
    }
}

/// stake * odds / 100, widened to catch overflow on pathological inputs.
fn potential_win(stake: u64, odds: u32) -> EngineResult<u64> {
    let wide = stake as u128 * odds as u128 / 100;
    u64::try_from(wide)
        .map_err(|_| EngineError::validation(format!("payout overflow for stake {}", stake)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::types::BetType;
    use crate::ledger::types::Account;

    fn engine() -> BetEngine {
        let ledger = Arc::new(Ledger::new());
        let commissions = Arc::new(CommissionLedger::new());
        BetEngine::new(
            BettingConfig {
                min_stake: 10,
                max_stake: 10_000,
            },
            ledger,
            commissions,
            EventBus::new(64),
            Arc::new(EngineMetrics::new()),
        )
    }

    fn seeded_engine() -> BetEngine {
        let engine = engine();
        engine
            .ledger
            .register_account(Account::new("acc-1", 1_000))
            .unwrap();
        engine
            .register_match(MatchRecord::new("match-1", "Alpha vs Beta"))
            .unwrap();
        engine
    }

    fn request(stake: u64, odds: u32) -> PlaceBetRequest {
        PlaceBetRequest {
            account_id: "acc-1".to_string(),
            match_id: "match-1".to_string(),
            bet_type: BetType::MatchWinner,
            selection: "TEAM_A".to_string(),
            side: BetSide::Back,
            stake,
            odds,
        }
    }

    #[test]
    fn test_place_bet_computes_potential_win() {
        let engine = seeded_engine();
        let bet = engine.place_bet(request(100, 250)).unwrap();

        assert_eq!(bet.potential_win, 250);
        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 900);

        let record = engine.match_record("match-1").unwrap();
        assert_eq!(record.bet_count, 1);
        assert_eq!(record.total_staked, 100);
    }

    #[test]
    fn test_stake_below_global_minimum_leaves_no_mutation() {
        let engine = seeded_engine();
        let err = engine.place_bet(request(5, 200)).unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 1_000);
        assert!(engine.ledger.entries("acc-1").unwrap().is_empty());
        assert_eq!(engine.match_record("match-1").unwrap().bet_count, 0);
    }

    #[test]
    fn test_insufficient_funds_reported_distinctly() {
        let engine = seeded_engine();
        let err = engine.place_bet(request(5_000, 200)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_bet_locked_account_rejected() {
        let engine = seeded_engine();
        engine.ledger.set_locks("acc-1", false, true, true).unwrap();

        let err = engine.place_bet(request(100, 200)).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 1_000);
    }

    #[test]
    fn test_locked_match_rejected() {
        let engine = seeded_engine();
        engine.set_betting_locked("match-1", true).unwrap();

        let err = engine.place_bet(request(100, 200)).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[test]
    fn test_exposure_limit_counts_pending_stake() {
        let engine = seeded_engine();
        engine
            .ledger
            .update_stake_limits("acc-1", None, None, 150)
            .unwrap();

        engine.place_bet(request(100, 200)).unwrap();
        let err = engine.place_bet(request(100, 200)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Settling the first bet frees the exposure window.
        let bets = engine.bets_for_account("acc-1");
        engine.settle_bet(&bets[0].id, false).unwrap();
        engine.place_bet(request(100, 200)).unwrap();
    }

    #[test]
    fn test_settle_winning_bet_credits_payout() {
        let engine = seeded_engine();
        let bet = engine.place_bet(request(100, 250)).unwrap();

        let settled = engine.settle_bet(&bet.id, true).unwrap();
        assert_eq!(settled.status, BetStatus::Won);
        // 1000 - 100 stake + 250 payout
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 1_150);
        assert!(engine.ledger.verify_account("acc-1").unwrap());
    }

    #[test]
    fn test_settlement_is_exactly_once() {
        let engine = seeded_engine();
        let bet = engine.place_bet(request(100, 250)).unwrap();
        engine.settle_bet(&bet.id, true).unwrap();

        let before = engine.ledger.balance("acc-1").unwrap();
        let entries_before = engine.ledger.entries("acc-1").unwrap().len();

        let err = engine.settle_bet(&bet.id, true).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), before);
        assert_eq!(
            engine.ledger.entries("acc-1").unwrap().len(),
            entries_before
        );
    }

    #[test]
    fn test_match_sweep_settles_and_isolates() {
        let engine = seeded_engine();
        engine
            .ledger
            .register_account(Account::new("acc-2", 1_000))
            .unwrap();

        let winner = engine.place_bet(request(100, 200)).unwrap();
        let loser = engine
            .place_bet(PlaceBetRequest {
                account_id: "acc-2".to_string(),
                selection: "TEAM_B".to_string(),
                ..request(50, 300)
            })
            .unwrap();

        let result = MatchResult {
            winner: "TEAM_A".to_string(),
            ..Default::default()
        };
        let report = engine.settle_match_bets("match-1", &result).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.won, 1);
        assert_eq!(report.lost, 1);
        assert!(report.failures.is_empty());
        assert_eq!(engine.bet(&winner.id).unwrap().status, BetStatus::Won);
        assert_eq!(engine.bet(&loser.id).unwrap().status, BetStatus::Lost);

        let record = engine.match_record("match-1").unwrap();
        assert_eq!(record.status, MatchStatus::Settled);
        assert_eq!(record.winner.as_deref(), Some("TEAM_A"));

        // Sweep is idempotent: a re-run is rejected before touching bets.
        let err = engine.settle_match_bets("match-1", &result).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[test]
    fn test_lay_bet_inverts_verdict() {
        let engine = seeded_engine();
        let lay = engine
            .place_bet(PlaceBetRequest {
                side: BetSide::Lay,
                selection: "TEAM_B".to_string(),
                ..request(100, 200)
            })
            .unwrap();

        let result = MatchResult {
            winner: "TEAM_A".to_string(),
            ..Default::default()
        };
        engine.settle_match_bets("match-1", &result).unwrap();

        // Laying TEAM_B wins when TEAM_B does not.
        assert_eq!(engine.bet(&lay.id).unwrap().status, BetStatus::Won);
    }

    #[test]
    fn test_void_refunds_exact_stakes() {
        let engine = seeded_engine();
        engine
            .ledger
            .register_account(Account::new("acc-2", 500))
            .unwrap();

        engine.place_bet(request(100, 200)).unwrap();
        let other = engine
            .place_bet(PlaceBetRequest {
                account_id: "acc-2".to_string(),
                ..request(250, 150)
            })
            .unwrap();
        // One bet already settled must not be refunded by the void sweep.
        engine.settle_bet(&other.id, false).unwrap();

        let report = engine.void_match_bets("match-1", "rain").unwrap();
        assert_eq!(report.voided, 1);

        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 1_000);
        assert_eq!(engine.ledger.balance("acc-2").unwrap(), 250);
        assert_eq!(
            engine.match_record("match-1").unwrap().status,
            MatchStatus::Cancelled
        );
        assert!(engine.ledger.verify_account("acc-1").unwrap());
    }

    #[test]
    fn test_concurrent_placement_respects_balance() {
        // Balance 500, stake 100: of 12 concurrent bets only 5 can land.
        let engine = Arc::new(engine());
        engine
            .ledger
            .register_account(Account::new("acc-1", 500))
            .unwrap();
        engine
            .register_match(MatchRecord::new("match-1", "Alpha vs Beta"))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                engine.place_bet(request(100, 200)).is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 5);
        assert_eq!(engine.ledger.balance("acc-1").unwrap(), 0);
        assert!(engine.ledger.verify_account("acc-1").unwrap());
    }
}
