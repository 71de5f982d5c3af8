//! Chip decomposition.
//!
//! Turns an integer stake into chip-tray actions: the denomination is
//! selected once, then the bet spot is clicked once per chip of that value.

use anyhow::Result;
use tracing::debug;

use crate::types::SessionError;

/// Denominations offered by the chip tray, strictly ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipLadder {
    denominations: Vec<u64>,
}

impl Default for ChipLadder {
    fn default() -> Self {
        Self {
            denominations: vec![1, 2, 5, 25, 100, 500, 1000, 5000],
        }
    }
}

/// One denomination selection followed by `count` placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipPlacement {
    pub denomination: u64,
    pub count: u64,
}

impl ChipPlacement {
    pub fn value(&self) -> u64 {
        self.denomination * self.count
    }
}

impl ChipLadder {
    /// Build a ladder, rejecting empty, zero-valued or unsorted input.
    pub fn new(denominations: Vec<u64>) -> Result<Self> {
        if denominations.is_empty() {
            anyhow::bail!("chip ladder is empty");
        }
        if denominations.contains(&0) {
            anyhow::bail!("chip ladder contains a zero denomination");
        }
        if denominations.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("chip ladder must be strictly ascending: {denominations:?}");
        }
        Ok(Self { denominations })
    }

    pub fn denominations(&self) -> &[u64] {
        &self.denominations
    }

    pub fn smallest(&self) -> u64 {
        self.denominations[0]
    }

    pub fn largest(&self) -> u64 {
        self.denominations[self.denominations.len() - 1]
    }

    /// Greedy largest-first decomposition of `stake`.
    ///
    /// Fails with `StakeUnrepresentable` rather than dropping a remainder.
    pub fn decompose(&self, stake: u64) -> Result<Vec<ChipPlacement>, SessionError> {
        if stake == 0 {
            return Err(SessionError::StakeUnrepresentable { stake });
        }

        let mut remaining = stake;
        let mut placements = Vec::new();

        for &denomination in self.denominations.iter().rev() {
            if remaining < denomination {
                continue;
            }
            let count = remaining / denomination;
            remaining -= count * denomination;
            placements.push(ChipPlacement { denomination, count });
        }

        if remaining != 0 {
            return Err(SessionError::StakeUnrepresentable { stake });
        }

        debug!(stake, ?placements, "Stake decomposed");
        Ok(placements)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
