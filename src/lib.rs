//! Stakehouse - Wagering Ledger and Settlement Engine
//!
//! Moves money safely under concurrent access, resolves bet outcomes
//! deterministically, cascades commission up a bounded agent hierarchy,
//! batches periodic settlements and generates verifiable instant-game
//! outcomes from committed seeds.

pub mod betting;
pub mod commission;
pub mod config;
pub mod errors;
pub mod events;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod settlement;

pub use betting::{Bet, BetEngine, BetSide, BetStatus, BetType, MatchRecord, MatchResult, MatchStatus, SweepReport};
pub use commission::{Agent, Commission, CommissionLedger};
pub use config::{ConfigLoader, EngineConfig};
pub use errors::{EngineError, EngineResult, ItemFailure};
pub use events::{EngineEvent, EventBus, NotificationSink};
pub use games::{FairnessEngine, GameEngine, GameKind, GameSelection, InstantPlayRequest, InstantPlayResult};
pub use ledger::{Account, EntryKind, Ledger, LedgerEntry};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use settlement::{GenerationReport, Settlement, SettlementGenerator, SettlementStatus};

pub use betting::lifecycle::PlaceBetRequest;

use std::sync::Arc;

/// Initialize tracing for embedding binaries and tests. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakehouse=info".into()),
        )
        .try_init();
}

/// Owning facade over the engine's components, wired against one ledger,
/// one event bus and one metrics registry.
pub struct Engine {
    config: EngineConfig,
    ledger: Arc<Ledger>,
    commissions: Arc<CommissionLedger>,
    bets: Arc<BetEngine>,
    settlements: Arc<SettlementGenerator>,
    games: Arc<GameEngine>,
    events: EventBus,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// Build an engine from a validated configuration.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let ledger = Arc::new(Ledger::new());
        let commissions = Arc::new(CommissionLedger::new());
        let events = EventBus::new(config.events.channel_capacity);
        let metrics = Arc::new(EngineMetrics::new());

        let bets = Arc::new(BetEngine::new(
            config.betting.clone(),
            ledger.clone(),
            commissions.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let settlements = Arc::new(SettlementGenerator::new(
            ledger.clone(),
            bets.clone(),
            commissions.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let games = Arc::new(GameEngine::new(
            config.games.clone(),
            ledger.clone(),
            events.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            commissions,
            bets,
            settlements,
            games,
            events,
            metrics,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default()).expect("default configuration is valid")
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn commissions(&self) -> &Arc<CommissionLedger> {
        &self.commissions
    }

    pub fn bets(&self) -> &Arc<BetEngine> {
        &self.bets
    }

    pub fn settlements(&self) -> &Arc<SettlementGenerator> {
        &self.settlements
    }

    pub fn games(&self) -> &Arc<GameEngine> {
        &self.games
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Deposit with a post-commit status event.
    pub fn deposit(&self, account_id: &str, amount: u64) -> EngineResult<LedgerEntry> {
        let entry = self.ledger.deposit(account_id, amount, None)?;
        self.events.emit(EngineEvent::TransferStatusChanged {
            account_id: account_id.to_string(),
            kind: EntryKind::Deposit.to_string(),
            amount,
        });
        self.events.emit(EngineEvent::BalanceChanged {
            account_id: account_id.to_string(),
            balance: entry.balance_after,
        });
        Ok(entry)
    }

    /// Withdrawal with a post-commit status event.
    pub fn withdraw(&self, account_id: &str, amount: u64) -> EngineResult<LedgerEntry> {
        let entry = self.ledger.withdraw(account_id, amount, None)?;
        self.events.emit(EngineEvent::TransferStatusChanged {
            account_id: account_id.to_string(),
            kind: EntryKind::Withdrawal.to_string(),
            amount,
        });
        self.events.emit(EngineEvent::BalanceChanged {
            account_id: account_id.to_string(),
            balance: entry.balance_after,
        });
        Ok(entry)
    }

    /// Convenience passthrough for wager placement.
    pub fn place_bet(&self, request: PlaceBetRequest) -> EngineResult<Bet> {
        self.bets.place_bet(request)
    }

    /// Convenience passthrough for instant play.
    pub fn play(&self, request: InstantPlayRequest) -> EngineResult<InstantPlayResult> {
        self.games.play(request)
    }
}
