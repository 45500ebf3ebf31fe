//! Instant-play orchestration.
//!
//! Validates the wager against the game's configured bounds, derives the
//! outcome from committed seeds, then applies round creation, stake debit,
//! bet record and any win credit as one atomic unit under the account
//! lock. Events fire after commit and never roll anything back.

use crate::betting::types::BetStatus;
use crate::config::GamesConfig;
use crate::errors::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::games::fair::{FairnessEngine, OutcomeStream};
use crate::games::rules::{deal_duel, draw_hilo_card, flip_coin, hand_strength, roll_dice, run_game};
use crate::games::types::{
    CasinoBet, CasinoRound, DiceCall, GameKind, GameSelection, HiLoCall, InstantPlayRequest,
    InstantPlayResult, RoundOutcome, RoundStatus,
};
use crate::ledger::types::{current_timestamp_ms, new_record_id, EntryKind};
use crate::ledger::Ledger;
use crate::metrics::EngineMetrics;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Single-shot instant plays use nonce zero; multi-round sessions would
/// increment it per round.
const INSTANT_PLAY_NONCE: u64 = 0;

pub struct GameEngine {
    config: GamesConfig,
    ledger: Arc<Ledger>,
    events: EventBus,
    metrics: Arc<EngineMetrics>,
    rounds: DashMap<String, CasinoRound>,
    bets: DashMap<String, CasinoBet>,
}

impl GameEngine {
    pub fn new(
        config: GamesConfig,
        ledger: Arc<Ledger>,
        events: EventBus,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            ledger,
            events,
            metrics,
            rounds: DashMap::new(),
            bets: DashMap::new(),
        }
    }

    /// Play one instant round end to end.
    pub fn play(&self, request: InstantPlayRequest) -> EngineResult<InstantPlayResult> {
        let kind = request.selection.kind();
        let (enabled, min_stake, max_stake) = self.limits(kind);

        if !enabled {
            return Err(EngineError::validation(format!("game {} is disabled", kind)));
        }
        if request.stake < min_stake || request.stake > max_stake {
            return Err(EngineError::validation(format!(
                "stake {} outside {} bounds {}..={}",
                request.stake, kind, min_stake, max_stake
            )));
        }
        if let GameSelection::Dice {
            target: Some(target),
            ..
        } = request.selection
        {
            if !(2..=12).contains(&target) {
                return Err(EngineError::validation(format!(
                    "dice target {} outside 2..=12",
                    target
                )));
            }
        }

        let multiplier = self.multiplier(&request.selection);
        let payout_if_won = scaled_payout(request.stake, multiplier)?;

        // Commitment exists before any outcome byte is derived.
        let seeds = FairnessEngine::new_seed_pair(request.client_seed.clone());
        let mut stream = OutcomeStream::from_seeds(&seeds, INSTANT_PLAY_NONCE);
        let (outcome, won) = run_game(
            &request.selection,
            self.config.dice.default_target,
            &mut stream,
        );
        let payout = if won { payout_if_won } else { 0 };

        let round_id = new_record_id();
        let bet_id = new_record_id();

        let (round, bet, balance) = self.ledger.with_account(&request.account_id, |txn| {
            let account = txn.account();
            if account.locked || account.bet_locked || !account.active {
                return Err(EngineError::state_conflict(format!(
                    "account {} is not allowed to play",
                    account.id
                )));
            }

            txn.debit(request.stake, EntryKind::StakeDebit, Some(round_id.clone()))?;
            let balance = if won {
                txn.credit(payout, EntryKind::WinCredit, Some(round_id.clone()))?
                    .balance_after
            } else {
                txn.account().balance
            };

            let now = current_timestamp_ms();
            let round = CasinoRound {
                id: round_id.clone(),
                game: kind,
                seeds: seeds.clone(),
                nonce: INSTANT_PLAY_NONCE,
                status: RoundStatus::Settled,
                outcome: Some(outcome.clone()),
                created_at: now,
                settled_at: Some(now),
            };
            let bet = CasinoBet {
                id: bet_id.clone(),
                round_id: round_id.clone(),
                account_id: request.account_id.clone(),
                game: kind,
                selection: request.selection,
                stake: request.stake,
                multiplier,
                payout,
                status: if won { BetStatus::Won } else { BetStatus::Lost },
                placed_at: now,
            };
            self.rounds.insert(round_id.clone(), round.clone());
            self.bets.insert(bet_id.clone(), bet.clone());

            Ok((round, bet, balance))
        })?;

        self.metrics.record_round_played(bet.stake, payout);
        self.events.emit(EngineEvent::RoundSettled {
            round_id: round.id.clone(),
            account_id: bet.account_id.clone(),
            won,
            payout,
        });
        self.events.emit(EngineEvent::BalanceChanged {
            account_id: bet.account_id.clone(),
            balance,
        });
        info!(
            round = %round.id,
            account = %bet.account_id,
            game = %kind,
            won,
            payout,
            "instant round settled"
        );

        Ok(InstantPlayResult {
            round,
            bet,
            won,
            payout,
        })
    }

    /// Play from a raw JSON payload, as handed through by a transport
    /// layer that does not type game requests.
    pub fn play_json(&self, payload: serde_json::Value) -> EngineResult<InstantPlayResult> {
        let request: InstantPlayRequest = serde_json::from_value(payload)
            .map_err(|e| EngineError::validation(format!("invalid play payload: {}", e)))?;
        self.play(request)
    }

    pub fn round(&self, round_id: &str) -> EngineResult<CasinoRound> {
        self.rounds
            .get(round_id)
            .map(|r| r.clone())
            .ok_or_else(|| EngineError::not_found(format!("round {}", round_id)))
    }

    pub fn casino_bet(&self, bet_id: &str) -> EngineResult<CasinoBet> {
        self.bets
            .get(bet_id)
            .map(|b| b.clone())
            .ok_or_else(|| EngineError::not_found(format!("casino bet {}", bet_id)))
    }

    pub fn bets_for_account(&self, account_id: &str) -> Vec<CasinoBet> {
        self.bets
            .iter()
            .filter(|b| b.account_id == account_id)
            .map(|b| b.clone())
            .collect()
    }

    /// Re-derive a settled round from its revealed seeds: the commitment
    /// must match and the replayed outcome must equal the stored one.
    pub fn verify_round(&self, round_id: &str) -> EngineResult<bool> {
        let round = self.round(round_id)?;
        let Some(stored) = round.outcome else {
            return Ok(false);
        };

        if !FairnessEngine::verify_seed(&round.seeds.server_seed, &round.seeds.server_seed_hash) {
            return Ok(false);
        }

        let mut stream = OutcomeStream::from_seeds(&round.seeds, round.nonce);
        let replayed = replay_outcome(round.game, &stored, &mut stream);
        Ok(replayed == stored)
    }

    fn limits(&self, kind: GameKind) -> (bool, u64, u64) {
        match kind {
            GameKind::CoinFlip => (
                self.config.coin_flip.enabled,
                self.config.coin_flip.min_stake,
                self.config.coin_flip.max_stake,
            ),
            GameKind::Dice => (
                self.config.dice.enabled,
                self.config.dice.min_stake,
                self.config.dice.max_stake,
            ),
            GameKind::HiLo => (
                self.config.hi_lo.enabled,
                self.config.hi_lo.min_stake,
                self.config.hi_lo.max_stake,
            ),
            GameKind::CardDuel => (
                self.config.card_duel.enabled,
                self.config.card_duel.min_stake,
                self.config.card_duel.max_stake,
            ),
        }
    }

    fn multiplier(&self, selection: &GameSelection) -> u32 {
        match selection {
            GameSelection::CoinFlip { .. } => self.config.coin_flip.win_multiplier,
            GameSelection::Dice { call, .. } => match call {
                DiceCall::Over => self.config.dice.over_multiplier,
                DiceCall::Under => self.config.dice.under_multiplier,
                DiceCall::Exact => self.config.dice.exact_multiplier,
            },
            GameSelection::HiLo { call } => match call {
                HiLoCall::High => self.config.hi_lo.high_multiplier,
                HiLoCall::Low => self.config.hi_lo.low_multiplier,
                HiLoCall::Exact => self.config.hi_lo.exact_multiplier,
            },
            GameSelection::CardDuel { .. } => self.config.card_duel.win_multiplier,
        }
    }
}

/// Replay the raw outcome for a game kind; dice keep their stored target
/// since the target never feeds the dice values themselves.
fn replay_outcome(kind: GameKind, stored: &RoundOutcome, stream: &mut OutcomeStream) -> RoundOutcome {
    match (kind, stored) {
        (GameKind::CoinFlip, _) => RoundOutcome::CoinFlip {
            landed: flip_coin(stream),
        },
        (GameKind::Dice, RoundOutcome::Dice { target, .. }) => {
            let (die_one, die_two) = roll_dice(stream);
            RoundOutcome::Dice {
                die_one,
                die_two,
                total: die_one + die_two,
                target: *target,
            }
        }
        (GameKind::HiLo, _) => RoundOutcome::HiLo {
            card: draw_hilo_card(stream),
        },
        (GameKind::CardDuel, _) => {
            let (hand_a, hand_b) = deal_duel(stream);
            let strength_a = hand_strength(&hand_a);
            let strength_b = hand_strength(&hand_b);
            RoundOutcome::CardDuel {
                hand_a,
                hand_b,
                strength_a,
                strength_b,
                winner: crate::games::rules::duel_winner(strength_a, strength_b),
            }
        }
        // Stored payload disagrees with the round's game tag; replay the
        // kind's own derivation so the comparison fails loudly.
        (GameKind::Dice, _) => {
            let (die_one, die_two) = roll_dice(stream);
            RoundOutcome::Dice {
                die_one,
                die_two,
                total: die_one + die_two,
                target: 7,
            }
        }
    }
}

/// stake * multiplier / 100, widened against overflow.
fn scaled_payout(stake: u64, multiplier: u32) -> EngineResult<u64> {
    let wide = stake as u128 * multiplier as u128 / 100;
    u64::try_from(wide)
        .map_err(|_| EngineError::validation(format!("payout overflow for stake {}", stake)))
}
