//! Instant-game record types

use crate::betting::types::BetStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported instant games
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    CoinFlip,
    Dice,
    HiLo,
    CardDuel,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::CoinFlip => write!(f, "coin_flip"),
            GameKind::Dice => write!(f, "dice"),
            GameKind::HiLo => write!(f, "hi_lo"),
            GameKind::CardDuel => write!(f, "card_duel"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    Heads,
    Tails,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiceCall {
    Over,
    Under,
    Exact,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HiLoCall {
    High,
    Low,
    Exact,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuelHand {
    HandA,
    HandB,
}

/// Player's pick, one variant per game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameSelection {
    CoinFlip {
        side: CoinSide,
    },
    Dice {
        call: DiceCall,
        /// Sum target; None uses the configured default
        target: Option<u8>,
    },
    HiLo {
        call: HiLoCall,
    },
    CardDuel {
        hand: DuelHand,
    },
}

impl GameSelection {
    pub fn kind(&self) -> GameKind {
        match self {
            GameSelection::CoinFlip { .. } => GameKind::CoinFlip,
            GameSelection::Dice { .. } => GameKind::Dice,
            GameSelection::HiLo { .. } => GameKind::HiLo,
            GameSelection::CardDuel { .. } => GameKind::CardDuel,
        }
    }
}

/// Seed material backing one round. The hash is published before play;
/// the server seed itself is revealed once the round settles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedPair {
    pub server_seed: String,
    /// Hex sha256 of the server seed, the pre-play commitment
    pub server_seed_hash: String,
    pub client_seed: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Open,
    Closed,
    Settled,
}

/// Resolved outcome payload, one variant per game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum RoundOutcome {
    CoinFlip {
        landed: CoinSide,
    },
    Dice {
        die_one: u8,
        die_two: u8,
        total: u8,
        target: u8,
    },
    HiLo {
        /// Card value 1..=13
        card: u8,
    },
    CardDuel {
        /// Card indices 0..=51
        hand_a: [u8; 3],
        hand_b: [u8; 3],
        strength_a: u32,
        strength_b: u32,
        winner: DuelHand,
    },
}

/// One instance of an instant game. Terminal once settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasinoRound {
    pub id: String,
    pub game: GameKind,
    pub seeds: SeedPair,
    pub nonce: u64,
    pub status: RoundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RoundOutcome>,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<u64>,
}

/// A wager tied to a casino round; structurally parallel to a match bet
/// but resolved by the game engine instead of a match result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasinoBet {
    pub id: String,
    pub round_id: String,
    pub account_id: String,
    pub game: GameKind,
    pub selection: GameSelection,
    pub stake: u64,
    /// Payout multiplier in hundredths, fixed when the bet is taken
    pub multiplier: u32,
    pub payout: u64,
    pub status: BetStatus,
    pub placed_at: u64,
}

/// Inputs for a single-shot instant play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantPlayRequest {
    pub account_id: String,
    pub selection: GameSelection,
    pub stake: u64,
    /// Player-supplied entropy; generated when absent
    pub client_seed: Option<String>,
}

/// Result handed back to the caller after an instant play settles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantPlayResult {
    pub round: CasinoRound,
    pub bet: CasinoBet,
    pub won: bool,
    pub payout: u64,
}
