//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (driver token, webhook URL) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::session::SessionSettings;
use crate::strategy::chips::ChipLadder;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub table: TableConfig,
    pub driver: DriverConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Single-session run used by the binary.
    #[serde(default)]
    pub session: Option<SessionRunConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Cadence of the poll-classify-act cycle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on any single driver call.
    #[serde(default = "default_driver_timeout_ms")]
    pub driver_timeout_ms: u64,
    /// Countdown shown when a betting window has just opened.
    #[serde(default = "default_anchor_countdown")]
    pub anchor_countdown: u32,
    pub default_bet_unit: u64,
    pub default_profit_rate: Decimal,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_driver_timeout_ms() -> u64 {
    5000
}

fn default_anchor_countdown() -> u32 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub chip_ladder: Vec<u64>,
    pub selectors: SelectorsConfig,
}

/// Markup selectors used by the remote driver. The engine never sees these.
#[derive(Debug, Deserialize, Clone)]
pub struct SelectorsConfig {
    pub status: String,
    pub balance: String,
    pub banker: String,
    pub player: String,
    /// Chip selector template; `{value}` is replaced by the denomination.
    pub chip: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriverConfig {
    pub base_url: String,
    pub api_token_env: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// sqlx SQLite URL; in-memory stores are used when absent.
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub webhook_url_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionRunConfig {
    pub account_id: i64,
    pub contact_email: Option<String>,
    pub bet_unit: Option<u64>,
    pub profit_rate: Option<Decimal>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn validate(&self) -> Result<()> {
        ChipLadder::new(self.table.chip_ladder.clone()).context("Invalid table.chip_ladder")?;
        if self.agent.default_bet_unit == 0 {
            anyhow::bail!("agent.default_bet_unit must be at least 1");
        }
        if self.agent.default_profit_rate <= Decimal::ZERO {
            anyhow::bail!("agent.default_profit_rate must be positive");
        }
        if self.agent.poll_interval_ms == 0 {
            anyhow::bail!("agent.poll_interval_ms must be positive");
        }
        if !self.table.selectors.chip.contains("{value}") {
            anyhow::bail!("table.selectors.chip must contain a {{value}} placeholder");
        }
        Ok(())
    }

    /// Engine timing and chip settings derived from this config.
    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            poll_interval: Duration::from_millis(self.agent.poll_interval_ms),
            driver_timeout: Duration::from_millis(self.agent.driver_timeout_ms),
            anchor_countdown: self.agent.anchor_countdown,
            chip_ladder: ChipLadder::new(self.table.chip_ladder.clone())?,
        })
    }
}
