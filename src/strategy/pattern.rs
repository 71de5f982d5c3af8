//! Fixed seven-slot betting pattern.

use crate::types::Side;

/// Sides backed in order, wrapping after the last slot.
pub const BET_PATTERN: [Side; 7] = [
    Side::Banker,
    Side::Banker,
    Side::Banker,
    Side::Player,
    Side::Player,
    Side::Banker,
    Side::Player,
];

/// Advance the pattern. `None` means no slot has been used yet.
pub fn next(position: Option<usize>) -> (usize, Side) {
    let next = match position {
        None => 0,
        Some(p) => (p + 1) % BET_PATTERN.len(),
    };
    (next, BET_PATTERN[next])
}
