//! Status banner classification.
//!
//! The table shows a single status line that cycles through the betting
//! countdown ("PLACE YOUR BETS 12" .. "PLACE YOUR BETS 1"), transitional
//! text ("NO MORE BETS", dealing animations) and the round result.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::RoundResult;

/// Betting countdown, with or without the seconds counter.
static BETTING_WINDOW_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*place\s+your\s+bets?\s*(\d+)?\s*$").unwrap());

/// What the status banner currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Bets are accepted; `countdown` is the seconds left when shown.
    BettingOpen { countdown: Option<u32> },
    /// The round resolved.
    Resolved(RoundResult),
    /// Anything else.
    Other,
}

impl TableStatus {
    /// True for the window that has just opened with a full countdown.
    pub fn is_fresh_window(&self, anchor_countdown: u32) -> bool {
        matches!(self, TableStatus::BettingOpen { countdown: Some(c) } if *c == anchor_countdown)
    }
}

pub fn classify(text: &str) -> TableStatus {
    let normalized = text.trim().to_uppercase();
    match normalized.as_str() {
        "PLAYER WINS" => return TableStatus::Resolved(RoundResult::PlayerWins),
        "BANKER WINS" => return TableStatus::Resolved(RoundResult::BankerWins),
        "TIE" => return TableStatus::Resolved(RoundResult::Tie),
        _ => {}
    }

    if let Some(caps) = BETTING_WINDOW_PATTERN.captures(&normalized) {
        let countdown = caps.get(1).and_then(|m| m.as_str().parse().ok());
        return TableStatus::BettingOpen { countdown };
    }

    TableStatus::Other
}
