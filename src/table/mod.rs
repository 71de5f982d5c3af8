//! Table driver integration.
//!
//! Defines the `GameDriver` trait the session engine polls, the semantic
//! field and control identifiers it speaks in, and balance parsing.
//! Markup selectors never leave the driver implementation:
//! - `remote`: HTTP client for a browser-automation sidecar

pub mod remote;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::types::Side;

/// A readable text field on the table UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The round status banner ("PLACE YOUR BETS 9", "BANKER WINS", ...).
    Status,
    /// The player's balance label.
    Balance,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Status => write!(f, "status"),
            Field::Balance => write!(f, "balance"),
        }
    }
}

/// A clickable control on the table UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Select the chip of the given denomination in the chip tray.
    Chip(u64),
    /// Drop the selected chip on a bet spot.
    BetSpot(Side),
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Chip(value) => write!(f, "chip:{value}"),
            Control::BetSpot(side) => write!(f, "spot:{side}"),
        }
    }
}

/// Driver-level failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("Automation surface disconnected")]
    Disconnected,

    #[error("Field not present: {0}")]
    FieldMissing(Field),

    #[error("Driver call timed out")]
    Timeout,

    #[error("Unparseable balance text: {0:?}")]
    InvalidBalance(String),

    #[error("Driver transport error: {0}")]
    Transport(String),
}

/// Abstraction over the externally rendered game table.
///
/// Calls against one driver must be awaited in sequence; implementors are
/// not required to tolerate concurrent use of the same page.
#[async_trait]
pub trait GameDriver: Send + Sync {
    /// Read the raw text of a field.
    async fn read_text(&self, field: Field) -> Result<String, DriverError>;

    /// Read the balance label verbatim (locale formatted, e.g. "1,234.50").
    async fn read_balance(&self) -> Result<String, DriverError> {
        self.read_text(Field::Balance).await
    }

    /// Click a logical control.
    async fn click(&self, control: &Control) -> Result<(), DriverError>;

    /// Whether the automation surface is still attached to the table.
    async fn is_connected(&self) -> bool;
}

/// Parse a locale-formatted balance by stripping thousands separators.
pub fn parse_balance(raw: &str) -> Result<Decimal, DriverError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim_start_matches(['$', '€', '£']);
    if cleaned.is_empty() {
        return Err(DriverError::FieldMissing(Field::Balance));
    }
    Decimal::from_str(cleaned).map_err(|_| DriverError::InvalidBalance(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
