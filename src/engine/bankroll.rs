//! Bankroll tracker: balances, the profit target, loss streaks.
//!
//! Pure state mutated only by the session state machine. Balances come
//! exclusively from readings of the table; nothing here estimates payouts.

use rust_decimal::Decimal;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BankrollTracker {
    initial_balance: Decimal,
    target_balance: Decimal,
    current_balance: Decimal,
    consecutive_losses: u32,
    max_consecutive_losses: u32,
    rounds_played: u32,
}

impl BankrollTracker {
    /// Start tracking from the opening balance.
    ///
    /// `target = initial + initial * profit_rate`.
    pub fn new(initial_balance: Decimal, profit_rate: Decimal) -> Self {
        Self {
            initial_balance,
            target_balance: initial_balance + initial_balance * profit_rate,
            current_balance: initial_balance,
            consecutive_losses: 0,
            max_consecutive_losses: 0,
            rounds_played: 0,
        }
    }

    /// Store a freshly read balance.
    pub fn observe_balance(&mut self, balance: Decimal) {
        self.current_balance = balance;
    }

    /// Update the loss streak after a wager resolves.
    ///
    /// Ties neither reset nor extend the streak.
    pub fn record_round_result(&mut self, won: bool, tied: bool) {
        self.rounds_played += 1;
        if tied {
            return;
        }
        if won {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
            self.max_consecutive_losses = self.max_consecutive_losses.max(self.consecutive_losses);
        }
        debug!(
            streak = self.consecutive_losses,
            peak = self.max_consecutive_losses,
            "Loss streak updated"
        );
    }

    pub fn target_reached(&self) -> bool {
        self.current_balance >= self.target_balance
    }

    pub fn current_profit(&self) -> Decimal {
        self.current_balance - self.initial_balance
    }

    pub fn peak_loss_streak(&self) -> u32 {
        self.max_consecutive_losses
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    pub fn target_balance(&self) -> Decimal {
        self.target_balance
    }

    pub fn current_balance(&self) -> Decimal {
        self.current_balance
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
