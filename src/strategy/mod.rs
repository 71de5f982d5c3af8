//! Wager selection: pattern sequencing, stake progression and chip layout.
//!
//! Pipeline per betting window: pattern → side, progression → stake,
//! ladder → chip placements.

pub mod chips;
pub mod pattern;

use crate::types::BetOutcome;

/// Stake for the next window given how the previous wager resolved.
///
/// Back to the base unit after a win (or before any result), double after
/// a loss, unchanged after a tie.
pub fn next_stake(last_outcome: BetOutcome, current_stake: u64, bet_unit: u64) -> u64 {
    let stake = match last_outcome {
        BetOutcome::Win | BetOutcome::Unknown => bet_unit,
        BetOutcome::Loss => current_stake.saturating_mul(2),
        BetOutcome::Tie => current_stake,
    };
    stake.max(bet_unit)
}
