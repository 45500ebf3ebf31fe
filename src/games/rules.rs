//! Game resolution rules.
//!
//! Everything here is a pure function of the outcome stream and the
//! player's selection; the ledger side effects live in the instant-play
//! orchestrator.
//!
//! Cards are encoded as `0..=51`: suit = card / 13, rank = card % 13 with
//! 0 as Ace. Aces compare high (14) except in the A-2-3 sequence.

use crate::games::fair::OutcomeStream;
use crate::games::types::{CoinSide, DiceCall, DuelHand, GameSelection, HiLoCall, RoundOutcome};

/// Attempts allowed before the unique-card draw falls back to a
/// deterministic fill.
pub const CARD_DRAW_RETRY_BUDGET: usize = 64;

const RANKS_PER_SUIT: u8 = 13;

/// Strength categories for a 3-card hand, strongest first.
const CATEGORY_TRAIL: u32 = 5;
const CATEGORY_PURE_SEQUENCE: u32 = 4;
const CATEGORY_SEQUENCE: u32 = 3;
const CATEGORY_COLOUR: u32 = 2;
const CATEGORY_PAIR: u32 = 1;
const CATEGORY_HIGH_CARD: u32 = 0;

fn card_rank_ace_high(card: u8) -> u8 {
    let rank = card % RANKS_PER_SUIT + 1;
    if rank == 1 {
        14
    } else {
        rank
    }
}

fn card_suit(card: u8) -> u8 {
    card / RANKS_PER_SUIT
}

/// Sequence high card if the three ace-high ranks form a run.
/// Q-K-A is the 12-13-14 run; A-2-3 plays with the ace low.
fn sequence_high(ranks_desc: [u8; 3]) -> Option<u8> {
    let [a, b, c] = ranks_desc;
    if a == b + 1 && b == c + 1 {
        return Some(a);
    }
    if ranks_desc == [14, 3, 2] {
        return Some(3);
    }
    None
}

/// Rank a 3-card hand: trail > pure sequence > sequence > colour > pair >
/// high card, with in-category tiebreaks on card ranks. Returned values
/// compare directly; equal strengths are a true tie.
pub fn hand_strength(hand: &[u8; 3]) -> u32 {
    let mut ranks = [
        card_rank_ace_high(hand[0]),
        card_rank_ace_high(hand[1]),
        card_rank_ace_high(hand[2]),
    ];
    ranks.sort_unstable_by(|x, y| y.cmp(x));
    let [r0, r1, r2] = ranks;

    let is_colour = card_suit(hand[0]) == card_suit(hand[1]) && card_suit(hand[1]) == card_suit(hand[2]);
    let high_card_score = r0 as u32 * 225 + r1 as u32 * 15 + r2 as u32;

    if r0 == r1 && r1 == r2 {
        return CATEGORY_TRAIL * 10_000 + r0 as u32;
    }

    if let Some(high) = sequence_high(ranks) {
        let category = if is_colour {
            CATEGORY_PURE_SEQUENCE
        } else {
            CATEGORY_SEQUENCE
        };
        return category * 10_000 + high as u32;
    }

    if is_colour {
        return CATEGORY_COLOUR * 10_000 + high_card_score;
    }

    if r0 == r1 || r1 == r2 {
        let (pair_rank, kicker) = if r0 == r1 { (r0, r2) } else { (r1, r0) };
        return CATEGORY_PAIR * 10_000 + pair_rank as u32 * 15 + kicker as u32;
    }

    CATEGORY_HIGH_CARD * 10_000 + high_card_score
}

/// Ties favor hand A.
pub fn duel_winner(strength_a: u32, strength_b: u32) -> DuelHand {
    if strength_a >= strength_b {
        DuelHand::HandA
    } else {
        DuelHand::HandB
    }
}

pub fn flip_coin(stream: &mut OutcomeStream) -> CoinSide {
    if stream.next_float() < 0.5 {
        CoinSide::Heads
    } else {
        CoinSide::Tails
    }
}

pub fn roll_dice(stream: &mut OutcomeStream) -> (u8, u8) {
    let die_one = stream.next_int(1, 6) as u8;
    let die_two = stream.next_int(1, 6) as u8;
    (die_one, die_two)
}

pub fn resolve_dice(call: DiceCall, total: u8, target: u8) -> bool {
    match call {
        DiceCall::Over => total > target,
        DiceCall::Under => total < target,
        DiceCall::Exact => total == target,
    }
}

pub fn draw_hilo_card(stream: &mut OutcomeStream) -> u8 {
    stream.next_int(1, 13) as u8
}

pub fn resolve_hilo(call: HiLoCall, card: u8) -> bool {
    match call {
        HiLoCall::High => card > 7,
        HiLoCall::Low => card < 7,
        HiLoCall::Exact => card == 7,
    }
}

pub fn deal_duel(stream: &mut OutcomeStream) -> ([u8; 3], [u8; 3]) {
    let cards = stream.draw_unique(6, 52, CARD_DRAW_RETRY_BUDGET);
    (
        [cards[0], cards[1], cards[2]],
        [cards[3], cards[4], cards[5]],
    )
}

/// Run a selection against the stream; returns the outcome payload and
/// whether the player's pick won.
pub fn run_game(
    selection: &GameSelection,
    dice_default_target: u8,
    stream: &mut OutcomeStream,
) -> (RoundOutcome, bool) {
    match selection {
        GameSelection::CoinFlip { side } => {
            let landed = flip_coin(stream);
            (RoundOutcome::CoinFlip { landed }, landed == *side)
        }
        GameSelection::Dice { call, target } => {
            let target = target.unwrap_or(dice_default_target);
            let (die_one, die_two) = roll_dice(stream);
            let total = die_one + die_two;
            (
                RoundOutcome::Dice {
                    die_one,
                    die_two,
                    total,
                    target,
                },
                resolve_dice(*call, total, target),
            )
        }
        GameSelection::HiLo { call } => {
            let card = draw_hilo_card(stream);
            (RoundOutcome::HiLo { card }, resolve_hilo(*call, card))
        }
        GameSelection::CardDuel { hand } => {
            let (hand_a, hand_b) = deal_duel(stream);
            let strength_a = hand_strength(&hand_a);
            let strength_b = hand_strength(&hand_b);
            let winner = duel_winner(strength_a, strength_b);
            (
                RoundOutcome::CardDuel {
                    hand_a,
                    hand_b,
                    strength_a,
                    strength_b,
                    winner,
                },
                winner == *hand,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Card helper: suit * 13 + (rank - 1), rank 1 = Ace ... 13 = King
    fn card(suit: u8, rank: u8) -> u8 {
        suit * 13 + (rank - 1)
    }

    #[test]
    fn test_trail_beats_pure_sequence() {
        let trail = [card(0, 2), card(1, 2), card(2, 2)];
        let pure = [card(0, 12), card(0, 13), card(0, 1)]; // Q-K-A suited
        assert!(hand_strength(&trail) > hand_strength(&pure));
    }

    #[test]
    fn test_qka_is_a_valid_pure_sequence() {
        let qka = [card(0, 12), card(0, 13), card(0, 1)];
        let strength = hand_strength(&qka);
        assert_eq!(strength / 10_000, CATEGORY_PURE_SEQUENCE);
        // Highest possible run: beats J-Q-K suited.
        let jqk = [card(1, 11), card(1, 12), card(1, 13)];
        assert!(strength > hand_strength(&jqk));
    }

    #[test]
    fn test_ace_two_three_plays_low() {
        let a23 = [card(0, 1), card(1, 2), card(2, 3)];
        assert_eq!(hand_strength(&a23) / 10_000, CATEGORY_SEQUENCE);
        // 2-3-4 run outranks the ace-low run.
        let seq234 = [card(0, 2), card(1, 3), card(2, 4)];
        assert!(hand_strength(&seq234) > hand_strength(&a23));
    }

    #[test]
    fn test_sequence_beats_colour() {
        let seq = [card(0, 4), card(1, 5), card(2, 6)];
        let colour = [card(0, 2), card(0, 9), card(0, 13)];
        assert!(hand_strength(&seq) > hand_strength(&colour));
    }

    #[test]
    fn test_colour_beats_pair() {
        let colour = [card(2, 2), card(2, 5), card(2, 9)];
        let pair = [card(0, 13), card(1, 13), card(2, 4)];
        assert!(hand_strength(&colour) > hand_strength(&pair));
    }

    #[test]
    fn test_pair_beats_high_card() {
        let pair = [card(0, 2), card(1, 2), card(2, 4)];
        let high = [card(0, 1), card(1, 13), card(2, 11)];
        assert!(hand_strength(&pair) > hand_strength(&high));
    }

    #[test]
    fn test_pair_tiebreaks_on_pair_then_kicker() {
        let kings = [card(0, 13), card(1, 13), card(2, 2)];
        let queens = [card(0, 12), card(1, 12), card(2, 1)];
        assert!(hand_strength(&kings) > hand_strength(&queens));

        let kings_high_kicker = [card(0, 13), card(1, 13), card(2, 9)];
        assert!(hand_strength(&kings_high_kicker) > hand_strength(&kings));
    }

    #[test]
    fn test_aces_compare_high() {
        let ace_high = [card(0, 1), card(1, 9), card(2, 4)];
        let king_high = [card(0, 13), card(1, 9), card(2, 4)];
        assert!(hand_strength(&ace_high) > hand_strength(&king_high));
    }

    #[test]
    fn test_tie_favors_hand_a() {
        assert_eq!(duel_winner(100, 100), DuelHand::HandA);
        assert_eq!(duel_winner(101, 100), DuelHand::HandA);
        assert_eq!(duel_winner(100, 101), DuelHand::HandB);
    }

    #[test]
    fn test_dice_resolution_is_strict() {
        assert!(resolve_dice(DiceCall::Over, 8, 7));
        assert!(!resolve_dice(DiceCall::Over, 7, 7));
        assert!(resolve_dice(DiceCall::Under, 6, 7));
        assert!(!resolve_dice(DiceCall::Under, 7, 7));
        assert!(resolve_dice(DiceCall::Exact, 7, 7));
        assert!(!resolve_dice(DiceCall::Exact, 8, 7));
    }

    #[test]
    fn test_hilo_resolution() {
        assert!(resolve_hilo(HiLoCall::High, 8));
        assert!(!resolve_hilo(HiLoCall::High, 7));
        assert!(resolve_hilo(HiLoCall::Low, 6));
        assert!(!resolve_hilo(HiLoCall::Low, 7));
        assert!(resolve_hilo(HiLoCall::Exact, 7));
    }

    #[test]
    fn test_coin_flip_fixed_vector() {
        // serverSeed="abc", clientSeed="xyz", nonce=0 lands the same side
        // on every recomputation.
        let mut first = OutcomeStream::new("abc", "xyz", 0);
        let landed = flip_coin(&mut first);
        for _ in 0..5 {
            let mut stream = OutcomeStream::new("abc", "xyz", 0);
            assert_eq!(flip_coin(&mut stream), landed);
        }
    }

    #[test]
    fn test_run_game_dice_uses_default_target() {
        let mut stream = OutcomeStream::new("seed", "client", 0);
        let selection = GameSelection::Dice {
            call: DiceCall::Over,
            target: None,
        };
        let (outcome, _) = run_game(&selection, 7, &mut stream);
        match outcome {
            RoundOutcome::Dice { target, total, die_one, die_two, .. } => {
                assert_eq!(target, 7);
                assert_eq!(total, die_one + die_two);
                assert!((2..=12).contains(&total));
            }
            other => panic!("expected dice outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_run_game_card_duel_hands_are_disjoint() {
        let mut stream = OutcomeStream::new("seed", "client", 3);
        let selection = GameSelection::CardDuel {
            hand: DuelHand::HandA,
        };
        let (outcome, won) = run_game(&selection, 7, &mut stream);
        match outcome {
            RoundOutcome::CardDuel {
                hand_a,
                hand_b,
                strength_a,
                strength_b,
                winner,
            } => {
                let mut all: Vec<u8> = hand_a.iter().chain(hand_b.iter()).copied().collect();
                all.sort_unstable();
                all.dedup();
                assert_eq!(all.len(), 6);
                assert_eq!(winner == DuelHand::HandA, strength_a >= strength_b);
                assert_eq!(won, winner == DuelHand::HandA);
            }
            other => panic!("expected card duel outcome, got {:?}", other),
        }
    }
}
