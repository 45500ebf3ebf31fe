//! Bet and match record types

use crate::errors::ItemFailure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Market category a bet belongs to; drives how the selection resolves.
/// Wire values are snake_case strings; anything unrecognized maps to
/// `Unknown` instead of failing the whole record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum BetType {
    /// Selection names the match winner
    MatchWinner,
    /// Selection names the top-performing player
    TopPerformer,
    /// Selection is OVER_<n>/UNDER_<n> against the final total
    TotalPoints,
    /// Selection is OVER_<n>/UNDER_<n> against the session total
    SessionTotal,
    /// Selection keys into the fancy-market outcome map
    Fancy,
    /// Selection keys into the per-player outcome map
    PlayerPerformance,
    /// Anything the resolver does not understand; always resolves to lost
    Unknown,
}

impl From<String> for BetType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "match_winner" => BetType::MatchWinner,
            "top_performer" => BetType::TopPerformer,
            "total_points" => BetType::TotalPoints,
            "session_total" => BetType::SessionTotal,
            "fancy" => BetType::Fancy,
            "player_performance" => BetType::PlayerPerformance,
            _ => BetType::Unknown,
        }
    }
}

impl From<BetType> for String {
    fn from(bet_type: BetType) -> Self {
        bet_type.to_string()
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::MatchWinner => write!(f, "match_winner"),
            BetType::TopPerformer => write!(f, "top_performer"),
            BetType::TotalPoints => write!(f, "total_points"),
            BetType::SessionTotal => write!(f, "session_total"),
            BetType::Fancy => write!(f, "fancy"),
            BetType::PlayerPerformance => write!(f, "player_performance"),
            BetType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Backing a selection to happen, or laying it not to.
/// Lay bets invert the resolver verdict at settlement time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    #[default]
    Back,
    Lay,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

/// A wager on a match outcome. Created Pending; mutated exactly once to a
/// terminal state by settlement or void.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub account_id: String,
    pub match_id: String,
    pub bet_type: BetType,
    pub selection: String,
    pub side: BetSide,
    pub stake: u64,
    /// Offered odds in hundredths (250 = 2.50x), fixed at placement
    pub odds: u32,
    /// stake * odds / 100, fixed regardless of later odds movement
    pub potential_win: u64,
    pub status: BetStatus,
    pub placed_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Open,
    /// Betting locked by an operator; settlement still possible
    Locked,
    /// Result known, settlement sweep not yet run
    Finished,
    Settled,
    Cancelled,
}

impl MatchStatus {
    pub fn accepts_bets(&self) -> bool {
        matches!(self, MatchStatus::Open)
    }

    pub fn is_final(&self) -> bool {
        matches!(self, MatchStatus::Settled | MatchStatus::Cancelled)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Open => write!(f, "open"),
            MatchStatus::Locked => write!(f, "locked"),
            MatchStatus::Finished => write!(f, "finished"),
            MatchStatus::Settled => write!(f, "settled"),
            MatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Catalog entry for a match plus its running bet totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub name: String,
    pub status: MatchStatus,
    /// Per-match stake overrides; None falls through to the global bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stake: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stake: Option<u64>,
    pub bet_count: u64,
    pub total_staked: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<u64>,
}

impl MatchRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: MatchStatus::Open,
            min_stake: None,
            max_stake: None,
            bet_count: 0,
            total_staked: 0,
            winner: None,
            settled_at: None,
        }
    }

    pub fn with_stake_bounds(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_stake = min;
        self.max_stake = max;
        self
    }
}

/// The final result of a match, as delivered by the catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatchResult {
    pub winner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_performer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_total: Option<i64>,
    /// Fancy-market verdicts keyed by selection
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fancy: HashMap<String, bool>,
    /// Per-player performance verdicts keyed by selection
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub player_performance: HashMap<String, bool>,
}

/// Outcome of a per-match settlement or void sweep. Per-bet failures are
/// collected here instead of aborting the sweep.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepReport {
    pub match_id: String,
    pub processed: usize,
    pub won: usize,
    pub lost: usize,
    pub voided: usize,
    pub failures: Vec<ItemFailure>,
}
