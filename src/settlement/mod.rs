//! Periodic per-agent settlement generation.
//!
//! A settlement aggregates one agent's player activity over a bounded
//! period into an approvable, payable record, consuming the commission
//! rows the cascade engine produced. State machine:
//! PENDING -> APPROVED -> PAID (terminal) or PENDING -> REJECTED
//! (terminal, no financial effect). Paid settlements are immutable.

use crate::betting::types::BetStatus;
use crate::betting::BetEngine;
use crate::commission::CommissionLedger;
use crate::errors::{EngineError, EngineResult, ItemFailure};
use crate::events::{EngineEvent, EventBus};
use crate::ledger::types::{current_timestamp_ms, new_record_id};
use crate::ledger::Ledger;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Paid | SettlementStatus::Rejected)
    }
}

/// One settlement per (agent, period).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub agent_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Sum of stakes across the period's won and lost bets
    pub total_stake: u64,
    /// Sum of payouts credited for won bets
    pub total_win_payout: u64,
    /// Sum of stakes kept from lost bets
    pub total_loss_stake: u64,
    /// total_loss_stake - total_win_payout; positive means the platform gained
    pub platform_profit: i64,
    pub commission_amount: u64,
    /// Unpaid balance carried over from earlier periods
    pub carried_over: u64,
    /// commission_amount + carried_over
    pub settlement_amount: u64,
    /// Commission rows consumed by this settlement
    pub commission_ids: Vec<String>,
    pub status: SettlementStatus,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

/// Result of a full settlement generation run over all active agents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationReport {
    pub generated: Vec<String>,
    /// Agents skipped because the period was already settled
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

pub struct SettlementGenerator {
    ledger: Arc<Ledger>,
    bets: Arc<BetEngine>,
    commissions: Arc<CommissionLedger>,
    events: EventBus,
    metrics: Arc<EngineMetrics>,
    settlements: DashMap<String, Settlement>,
    /// Serializes generation so two overlapping runs cannot both pass the
    /// duplicate-period check
    generate_lock: Mutex<()>,
}

impl SettlementGenerator {
    pub fn new(
        ledger: Arc<Ledger>,
        bets: Arc<BetEngine>,
        commissions: Arc<CommissionLedger>,
        events: EventBus,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            ledger,
            bets,
            commissions,
            events,
            metrics,
            settlements: DashMap::new(),
            generate_lock: Mutex::new(()),
        }
    }

    /// Generate a pending settlement for one agent over [start, end).
    pub fn generate(
        &self,
        agent_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> EngineResult<Settlement> {
        if period_start >= period_end {
            return Err(EngineError::validation(format!(
                "period start {} not before end {}",
                period_start, period_end
            )));
        }

        let agent = self.commissions.agent(agent_id)?;
        let _guard = self.generate_lock.lock().unwrap();

        // A non-rejected settlement overlapping this period blocks the run.
        let overlapping = self.settlements.iter().any(|s| {
            s.agent_id == agent_id
                && s.status != SettlementStatus::Rejected
                && s.period_start < period_end
                && period_start < s.period_end
        });
        if overlapping {
            return Err(EngineError::DuplicatePeriod {
                agent_id: agent_id.to_string(),
            });
        }

        let start_ms = period_start.timestamp_millis().max(0) as u64;
        let end_ms = period_end.timestamp_millis().max(0) as u64;
        let players: HashSet<String> =
            self.ledger.accounts_for_agent(agent_id).into_iter().collect();

        let mut total_stake: u64 = 0;
        let mut total_win_payout: u64 = 0;
        let mut total_loss_stake: u64 = 0;
        for bet in self.bets.all_bets() {
            if !players.contains(&bet.account_id) {
                continue;
            }
            if bet.placed_at < start_ms || bet.placed_at >= end_ms {
                continue;
            }
            match bet.status {
                BetStatus::Won => {
                    total_stake = total_stake.saturating_add(bet.stake);
                    total_win_payout = total_win_payout.saturating_add(bet.potential_win);
                }
                BetStatus::Lost => {
                    total_stake = total_stake.saturating_add(bet.stake);
                    total_loss_stake = total_loss_stake.saturating_add(bet.stake);
                }
                // Pending and void bets stay outside the aggregates.
                BetStatus::Pending | BetStatus::Void => {}
            }
        }

        let platform_profit = total_loss_stake as i64 - total_win_payout as i64;
        let commission_amount = if platform_profit > 0 {
            ((platform_profit as u128 * agent.commission_rate_bps as u128) / 10_000) as u64
        } else {
            0
        };
        let carried_over = agent.pending_settlement;
        let settlement_amount = commission_amount.saturating_add(carried_over);

        let commission_ids: Vec<String> = self
            .commissions
            .unpaid_in_period(agent_id, start_ms, end_ms)
            .into_iter()
            .map(|c| c.id)
            .collect();

        let settlement = Settlement {
            id: new_record_id(),
            agent_id: agent_id.to_string(),
            period_start,
            period_end,
            total_stake,
            total_win_payout,
            total_loss_stake,
            platform_profit,
            commission_amount,
            carried_over,
            settlement_amount,
            commission_ids,
            status: SettlementStatus::Pending,
            created_at: current_timestamp_ms(),
            approved_at: None,
            paid_at: None,
            payment_reference: None,
        };
        self.settlements
            .insert(settlement.id.clone(), settlement.clone());

        self.metrics.record_settlement_generated();
        self.events.emit(EngineEvent::SettlementGenerated {
            settlement_id: settlement.id.clone(),
            agent_id: agent_id.to_string(),
            amount: settlement.settlement_amount,
        });
        info!(
            agent = agent_id,
            settlement = %settlement.id,
            amount = settlement.settlement_amount,
            "settlement generated"
        );

        Ok(settlement)
    }

    /// Generate settlements for every active agent over one period.
    /// Per-agent failures are collected; an already-settled period counts
    /// as a skip, making scheduled re-runs safe.
    pub fn generate_all(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> GenerationReport {
        let mut report = GenerationReport::default();

        for agent in self.commissions.active_agents() {
            match self.generate(&agent.id, period_start, period_end) {
                Ok(settlement) => report.generated.push(settlement.id),
                Err(EngineError::DuplicatePeriod { .. }) => report.skipped += 1,
                Err(e) => {
                    warn!(agent = %agent.id, error = %e, "settlement generation failed, continuing batch");
                    report.failures.push(ItemFailure::from_error(agent.id.clone(), &e));
                }
            }
        }

        report
    }

    /// Admin approval: PENDING -> APPROVED.
    pub fn approve(&self, settlement_id: &str) -> EngineResult<Settlement> {
        let mut settlement = self.settlement_mut(settlement_id)?;
        if settlement.status != SettlementStatus::Pending {
            return Err(EngineError::state_conflict(format!(
                "settlement {} cannot be approved from {:?}",
                settlement_id, settlement.status
            )));
        }
        settlement.status = SettlementStatus::Approved;
        settlement.approved_at = Some(current_timestamp_ms());
        Ok(settlement.clone())
    }

    /// Admin rejection: PENDING -> REJECTED, no financial effect. The
    /// period becomes free for regeneration.
    pub fn reject(&self, settlement_id: &str) -> EngineResult<Settlement> {
        let mut settlement = self.settlement_mut(settlement_id)?;
        if settlement.status != SettlementStatus::Pending {
            return Err(EngineError::state_conflict(format!(
                "settlement {} cannot be rejected from {:?}",
                settlement_id, settlement.status
            )));
        }
        settlement.status = SettlementStatus::Rejected;
        Ok(settlement.clone())
    }

    /// Payment confirmation: APPROVED -> PAID. Marks attached commissions
    /// paid and resets the agent's carry; terminal.
    pub fn mark_paid(
        &self,
        settlement_id: &str,
        payment_reference: impl Into<String>,
    ) -> EngineResult<Settlement> {
        let paid = {
            let mut settlement = self.settlement_mut(settlement_id)?;
            if settlement.status != SettlementStatus::Approved {
                return Err(EngineError::state_conflict(format!(
                    "settlement {} cannot be paid from {:?}",
                    settlement_id, settlement.status
                )));
            }
            settlement.status = SettlementStatus::Paid;
            settlement.paid_at = Some(current_timestamp_ms());
            settlement.payment_reference = Some(payment_reference.into());
            settlement.clone()
        };

        self.commissions.mark_paid(&paid.commission_ids);
        self.commissions.reset_pending_settlement(&paid.agent_id)?;

        info!(
            settlement = %paid.id,
            agent = %paid.agent_id,
            amount = paid.settlement_amount,
            "settlement paid"
        );
        Ok(paid)
    }

    pub fn settlement(&self, settlement_id: &str) -> EngineResult<Settlement> {
        self.settlements
            .get(settlement_id)
            .map(|s| s.clone())
            .ok_or_else(|| EngineError::not_found(format!("settlement {}", settlement_id)))
    }

    pub fn settlements_for_agent(&self, agent_id: &str) -> Vec<Settlement> {
        self.settlements
            .iter()
            .filter(|s| s.agent_id == agent_id)
            .map(|s| s.clone())
            .collect()
    }

    fn settlement_mut(
        &self,
        settlement_id: &str,
    ) -> EngineResult<dashmap::mapref::one::RefMut<'_, String, Settlement>> {
        self.settlements
            .get_mut(settlement_id)
            .ok_or_else(|| EngineError::not_found(format!("settlement {}", settlement_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::types::{BetType, MatchRecord};
    use crate::betting::lifecycle::PlaceBetRequest;
    use crate::betting::BetSide;
    use crate::commission::Agent;
    use crate::config::BettingConfig;
    use crate::ledger::types::Account;
    use chrono::Duration;

    struct Fixture {
        ledger: Arc<Ledger>,
        bets: Arc<BetEngine>,
        commissions: Arc<CommissionLedger>,
        generator: SettlementGenerator,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let commissions = Arc::new(CommissionLedger::new());
        let events = EventBus::new(64);
        let metrics = Arc::new(EngineMetrics::new());
        let bets = Arc::new(BetEngine::new(
            BettingConfig {
                min_stake: 1,
                max_stake: 1_000_000,
            },
            ledger.clone(),
            commissions.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let generator = SettlementGenerator::new(
            ledger.clone(),
            bets.clone(),
            commissions.clone(),
            events,
            metrics,
        );

        commissions
            .register_agent(Agent::new("agent-1", "Agent One", 500))
            .unwrap();
        ledger
            .register_account(Account::new("player-1", 10_000).with_agent("agent-1"))
            .unwrap();
        bets.register_match(MatchRecord::new("match-1", "Alpha vs Beta"))
            .unwrap();

        Fixture {
            ledger,
            bets,
            commissions,
            generator,
        }
    }

    fn place(fixture: &Fixture, selection: &str, stake: u64, odds: u32) -> String {
        fixture
            .bets
            .place_bet(PlaceBetRequest {
                account_id: "player-1".to_string(),
                match_id: "match-1".to_string(),
                bet_type: BetType::MatchWinner,
                selection: selection.to_string(),
                side: BetSide::Back,
                stake,
                odds,
            })
            .unwrap()
            .id
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::hours(1), now + Duration::hours(1))
    }

    #[test]
    fn test_profit_formula_and_commission() {
        let fixture = fixture();
        // One losing bet of 1000 and one winning bet of 400 at 2.00x.
        let losing = place(&fixture, "TEAM_B", 1_000, 200);
        let winning = place(&fixture, "TEAM_A", 400, 200);
        fixture.bets.settle_bet(&losing, false).unwrap();
        fixture.bets.settle_bet(&winning, true).unwrap();

        let (start, end) = period();
        let settlement = fixture.generator.generate("agent-1", start, end).unwrap();

        assert_eq!(settlement.total_stake, 1_400);
        assert_eq!(settlement.total_loss_stake, 1_000);
        assert_eq!(settlement.total_win_payout, 800);
        // Loss stake minus win payout, stake-vs-payout conflation preserved.
        assert_eq!(settlement.platform_profit, 200);
        // 5% of 200
        assert_eq!(settlement.commission_amount, 10);
        assert_eq!(settlement.status, SettlementStatus::Pending);
    }

    #[test]
    fn test_negative_profit_yields_zero_commission() {
        let fixture = fixture();
        let winning = place(&fixture, "TEAM_A", 1_000, 300);
        fixture.bets.settle_bet(&winning, true).unwrap();

        let (start, end) = period();
        let settlement = fixture.generator.generate("agent-1", start, end).unwrap();

        assert_eq!(settlement.platform_profit, -3_000);
        assert_eq!(settlement.commission_amount, 0);
    }

    #[test]
    fn test_void_bets_stay_outside_aggregates() {
        let fixture = fixture();
        let voided = place(&fixture, "TEAM_A", 700, 200);
        let losing = place(&fixture, "TEAM_B", 300, 200);
        fixture.bets.void_bet(&voided, "market closed").unwrap();
        fixture.bets.settle_bet(&losing, false).unwrap();

        let (start, end) = period();
        let settlement = fixture.generator.generate("agent-1", start, end).unwrap();

        assert_eq!(settlement.total_stake, 300);
        assert_eq!(settlement.total_loss_stake, 300);
        assert_eq!(settlement.platform_profit, 300);
    }

    #[test]
    fn test_overlapping_period_rejected() {
        let fixture = fixture();
        let (start, end) = period();
        fixture.generator.generate("agent-1", start, end).unwrap();

        // Fully inside the settled window
        let err = fixture
            .generator
            .generate("agent-1", start + Duration::minutes(10), end - Duration::minutes(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePeriod { .. }));

        // Adjacent window is fine
        fixture
            .generator
            .generate("agent-1", end, end + Duration::hours(1))
            .unwrap();
    }

    #[test]
    fn test_rejected_settlement_frees_the_period() {
        let fixture = fixture();
        let (start, end) = period();
        let first = fixture.generator.generate("agent-1", start, end).unwrap();
        fixture.generator.reject(&first.id).unwrap();

        fixture.generator.generate("agent-1", start, end).unwrap();
    }

    #[test]
    fn test_state_machine_transitions() {
        let fixture = fixture();
        let (start, end) = period();
        let settlement = fixture.generator.generate("agent-1", start, end).unwrap();

        // Cannot pay before approval
        assert!(matches!(
            fixture.generator.mark_paid(&settlement.id, "wire-1"),
            Err(EngineError::StateConflict(_))
        ));

        fixture.generator.approve(&settlement.id).unwrap();

        // Approved settlements cannot be rejected
        assert!(matches!(
            fixture.generator.reject(&settlement.id),
            Err(EngineError::StateConflict(_))
        ));

        let paid = fixture.generator.mark_paid(&settlement.id, "wire-1").unwrap();
        assert_eq!(paid.status, SettlementStatus::Paid);
        assert_eq!(paid.payment_reference.as_deref(), Some("wire-1"));

        // Paid is terminal
        assert!(matches!(
            fixture.generator.approve(&settlement.id),
            Err(EngineError::StateConflict(_))
        ));
    }

    #[test]
    fn test_paid_settlement_consumes_commissions_and_carry() {
        let fixture = fixture();
        let losing = place(&fixture, "TEAM_B", 2_000, 200);
        let winning = place(&fixture, "TEAM_A", 100, 200);
        fixture.bets.settle_bet(&losing, false).unwrap();
        fixture.bets.settle_bet(&winning, true).unwrap();

        // The winning bet cascaded 5% of 200 = 10 into pending settlement.
        assert_eq!(
            fixture.commissions.agent("agent-1").unwrap().pending_settlement,
            10
        );

        let (start, end) = period();
        let settlement = fixture.generator.generate("agent-1", start, end).unwrap();
        assert_eq!(settlement.carried_over, 10);
        assert_eq!(settlement.commission_ids.len(), 1);
        assert_eq!(
            settlement.settlement_amount,
            settlement.commission_amount + 10
        );

        fixture.generator.approve(&settlement.id).unwrap();
        fixture.generator.mark_paid(&settlement.id, "wire-9").unwrap();

        assert_eq!(
            fixture.commissions.agent("agent-1").unwrap().pending_settlement,
            0
        );
        assert!(fixture
            .commissions
            .commissions_for_bet(&winning)
            .iter()
            .all(|c| c.paid));
    }

    #[test]
    fn test_generate_all_isolates_and_skips() {
        let fixture = fixture();
        fixture
            .commissions
            .register_agent(Agent::new("agent-2", "Agent Two", 300))
            .unwrap();

        let (start, end) = period();
        // Pre-settle agent-1 so the batch run must skip it.
        fixture.generator.generate("agent-1", start, end).unwrap();

        let report = fixture.generator.generate_all(start, end);
        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failures.is_empty());

        // Re-running the whole batch is a no-op.
        let rerun = fixture.generator.generate_all(start, end);
        assert!(rerun.generated.is_empty());
        assert_eq!(rerun.skipped, 2);
    }

    #[test]
    fn test_inverted_period_rejected() {
        let fixture = fixture();
        let (start, end) = period();
        assert!(matches!(
            fixture.generator.generate("agent-1", end, start),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_aggregation_only_sees_direct_players() {
        let fixture = fixture();
        fixture
            .ledger
            .register_account(Account::new("stray-player", 5_000))
            .unwrap();

        assert_eq!(fixture.ledger.accounts_for_agent("agent-1").len(), 1);
        assert_eq!(
            fixture.ledger.accounts_for_agent("agent-1")[0],
            "player-1"
        );
    }
}
