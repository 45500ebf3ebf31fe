//! Operation counters for monitoring and reconciliation checks

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct EngineMetrics {
    start_time: Instant,
    bets_placed: AtomicU64,
    bets_settled: AtomicU64,
    bets_voided: AtomicU64,
    rounds_played: AtomicU64,
    total_staked: AtomicU64,
    total_paid_out: AtomicU64,
    settlements_generated: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bets_placed: AtomicU64::new(0),
            bets_settled: AtomicU64::new(0),
            bets_voided: AtomicU64::new(0),
            rounds_played: AtomicU64::new(0),
            total_staked: AtomicU64::new(0),
            total_paid_out: AtomicU64::new(0),
            settlements_generated: AtomicU64::new(0),
        }
    }

    pub fn record_bet_placed(&self, stake: u64) {
        self.bets_placed.fetch_add(1, Ordering::SeqCst);
        self.total_staked.fetch_add(stake, Ordering::SeqCst);
    }

    pub fn record_bet_settled(&self, payout: u64) {
        self.bets_settled.fetch_add(1, Ordering::SeqCst);
        self.total_paid_out.fetch_add(payout, Ordering::SeqCst);
    }

    pub fn record_bet_voided(&self) {
        self.bets_voided.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_round_played(&self, stake: u64, payout: u64) {
        self.rounds_played.fetch_add(1, Ordering::SeqCst);
        self.total_staked.fetch_add(stake, Ordering::SeqCst);
        self.total_paid_out.fetch_add(payout, Ordering::SeqCst);
    }

    pub fn record_settlement_generated(&self) {
        self.settlements_generated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            bets_placed: self.bets_placed.load(Ordering::SeqCst),
            bets_settled: self.bets_settled.load(Ordering::SeqCst),
            bets_voided: self.bets_voided.load(Ordering::SeqCst),
            rounds_played: self.rounds_played.load(Ordering::SeqCst),
            total_staked: self.total_staked.load(Ordering::SeqCst),
            total_paid_out: self.total_paid_out.load(Ordering::SeqCst),
            settlements_generated: self.settlements_generated.load(Ordering::SeqCst),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub bets_placed: u64,
    pub bets_settled: u64,
    pub bets_voided: u64,
    pub rounds_played: u64,
    pub total_staked: u64,
    pub total_paid_out: u64,
    pub settlements_generated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_bet_placed(100);
        metrics.record_bet_placed(50);
        metrics.record_bet_settled(250);
        metrics.record_bet_voided();
        metrics.record_round_played(20, 40);

        let snap = metrics.snapshot();
        assert_eq!(snap.bets_placed, 2);
        assert_eq!(snap.bets_settled, 1);
        assert_eq!(snap.bets_voided, 1);
        assert_eq!(snap.rounds_played, 1);
        assert_eq!(snap.total_staked, 170);
        assert_eq!(snap.total_paid_out, 290);
    }
}
