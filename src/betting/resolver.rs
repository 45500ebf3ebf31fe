//! Pure bet outcome resolution.
//!
//! `resolve_outcome` maps (bet type, selection, match result) to a win/lose
//! verdict with no side effects. Identical inputs always produce the
//! identical verdict; malformed or unknown inputs resolve to lost, never to
//! an error.

use crate::betting::types::{BetType, MatchResult};
use tracing::warn;

/// Direction of a threshold selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Threshold {
    Over(i64),
    Under(i64),
}

/// Parse `OVER_<n>` / `UNDER_<n>` selections. Case-sensitive on purpose:
/// selections are normalized upstream at capture time.
fn parse_threshold(selection: &str) -> Option<Threshold> {
    if let Some(raw) = selection.strip_prefix("OVER_") {
        return raw.parse().ok().map(Threshold::Over);
    }
    if let Some(raw) = selection.strip_prefix("UNDER_") {
        return raw.parse().ok().map(Threshold::Under);
    }
    None
}

fn resolve_threshold(selection: &str, actual: Option<i64>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match parse_threshold(selection) {
        // Strict comparisons: landing exactly on the line loses both sides.
        Some(Threshold::Over(line)) => actual > line,
        Some(Threshold::Under(line)) => actual < line,
        None => {
            warn!(selection, "unparseable threshold selection");
            false
        }
    }
}

/// Resolve a single selection against a match result.
///
/// Lay inversion is applied by the settlement layer, not here.
pub fn resolve_outcome(bet_type: BetType, selection: &str, result: &MatchResult) -> bool {
    match bet_type {
        BetType::MatchWinner => selection == result.winner,
        BetType::TopPerformer => result
            .top_performer
            .as_deref()
            .map(|top| selection == top)
            .unwrap_or(false),
        BetType::TotalPoints => resolve_threshold(selection, result.total_points),
        BetType::SessionTotal => resolve_threshold(selection, result.session_total),
        BetType::Fancy => result.fancy.get(selection).copied().unwrap_or(false),
        BetType::PlayerPerformance => result
            .player_performance
            .get(selection)
            .copied()
            .unwrap_or(false),
        BetType::Unknown => {
            warn!(selection, "unknown bet type, resolving as lost");
            false
        }
    }
}
