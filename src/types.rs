//! Shared types for the BANCO session engine.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the table driver, strategy,
//! storage and engine modules can depend on them without cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier, as issued by the account store.
pub type AccountId = i64;

/// Identifier assigned to a receipt by the receipt store.
pub type ReceiptId = i64;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A side of the baccarat table that can be wagered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Banker,
    Player,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Banker => write!(f, "BANKER"),
            Side::Player => write!(f, "PLAYER"),
        }
    }
}

/// How a round on the table resolved, as announced by the status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundResult {
    BankerWins,
    PlayerWins,
    Tie,
}

impl RoundResult {
    /// The winning side, `None` for a tie.
    pub fn winner(&self) -> Option<Side> {
        match self {
            RoundResult::BankerWins => Some(Side::Banker),
            RoundResult::PlayerWins => Some(Side::Player),
            RoundResult::Tie => None,
        }
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundResult::BankerWins => write!(f, "BANKER WINS"),
            RoundResult::PlayerWins => write!(f, "PLAYER WINS"),
            RoundResult::Tie => write!(f, "TIE"),
        }
    }
}

/// Outcome of the session's own wager on a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetOutcome {
    Win,
    Loss,
    Tie,
    /// No wager has resolved yet.
    Unknown,
}

impl BetOutcome {
    /// Classify a resolved round against the side that was backed.
    pub fn settle(target: Side, result: RoundResult) -> Self {
        match result.winner() {
            None => BetOutcome::Tie,
            Some(winner) if winner == target => BetOutcome::Win,
            Some(_) => BetOutcome::Loss,
        }
    }
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetOutcome::Win => write!(f, "WIN"),
            BetOutcome::Loss => write!(f, "LOSS"),
            BetOutcome::Tie => write!(f, "TIE"),
            BetOutcome::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Bot activation flag held per account by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Active,
    Inactive,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Active => "active",
            BotStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for BotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" | "activate" => Ok(BotStatus::Active),
            "inactive" | "deactivate" => Ok(BotStatus::Inactive),
            _ => Err(anyhow::anyhow!("Unknown bot status: {s}")),
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a session met its profit target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Complete,
    Incomplete,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Complete => "complete",
            ReceiptStatus::Incomplete => "incomplete",
        }
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(ReceiptStatus::Complete),
            "incomplete" => Ok(ReceiptStatus::Incomplete),
            _ => Err(anyhow::anyhow!("Unknown receipt status: {s}")),
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Request to start a session for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub account_id: AccountId,
    /// Base stake in chip units.
    pub bet_unit: u64,
    /// Profit target as a fraction of the opening balance (0.05 = 5%).
    pub profit_rate: Decimal,
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// A winning round lifted the balance to the target.
    TargetReached,
    /// The account's bot status was switched off.
    Cancelled,
    /// The polling cycle hit an unrecoverable error.
    Failed(SessionError),
}

impl TerminationReason {
    /// Receipt status implied by this reason.
    pub fn receipt_status(&self) -> ReceiptStatus {
        match self {
            TerminationReason::TargetReached => ReceiptStatus::Complete,
            _ => ReceiptStatus::Incomplete,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TargetReached => write!(f, "target reached"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// Final financial record of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReceipt {
    pub session_id: Uuid,
    pub account_id: AccountId,
    pub initial_balance: Decimal,
    /// Last balance read from the table.
    pub balance: Decimal,
    /// `balance - initial_balance`.
    pub profit: Decimal,
    /// Configured profit target fraction.
    pub profit_rate: Decimal,
    /// Longest losing streak observed during the session.
    pub number_of_consecutive_losses: u32,
    pub rounds_played: u32,
    pub status: ReceiptStatus,
    pub termination: String,
    pub created_at: DateTime<Utc>,
}

impl OutcomeReceipt {
    /// Realised profit as a fraction of the opening balance.
    pub fn realized_rate(&self) -> Decimal {
        if self.initial_balance.is_zero() {
            Decimal::ZERO
        } else {
            self.profit / self.initial_balance
        }
    }
}

impl fmt::Display for OutcomeReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Account #{} session {} {}: balance={:.2} profit={:.2} ({:.2}% of {:.2}% target) | rounds={} | worst streak={} | {}",
            self.account_id,
            self.session_id,
            self.status,
            self.balance,
            self.profit,
            self.realized_rate() * Decimal::ONE_HUNDRED,
            self.profit_rate * Decimal::ONE_HUNDRED,
            self.rounds_played,
            self.number_of_consecutive_losses,
            self.termination,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures inside the polling cycle. Each one ends the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Balance unavailable: {0}")]
    BalanceUnavailable(String),

    #[error("Status text unavailable: {0}")]
    StatusUnavailable(String),

    #[error("Stake {stake} cannot be built from the chip ladder")]
    StakeUnrepresentable { stake: u64 },

    #[error("Stake {stake} exceeds the table balance {balance}")]
    StakeExceedsBalance { stake: u64, balance: Decimal },

    #[error("Table driver disconnected")]
    DriverDisconnected,

    #[error("Bet placement failed: {0}")]
    PlacementFailed(String),

    #[error("Account store error: {0}")]
    AccountStore(String),
}

/// Failures surfaced by the outcome reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Session {0} has already been reported")]
    DuplicateReport(Uuid),

    #[error("Receipt storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    /// The receipt was saved and the bot switched off, but the contact
    /// could not be told.
    #[error("Notification failed: {source}")]
    Notification {
        receipt: Box<OutcomeReceipt>,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
