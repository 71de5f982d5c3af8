//! SQLite persistence via sqlx.
//!
//! Decimals are stored as TEXT to keep exact cents. Status changes go
//! through single UPDATE statements, so SQLite's write lock serialises
//! concurrent sessions touching the same account.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AccountStore, ReceiptStore, StoredReceipt};
use crate::types::{AccountId, BotStatus, OutcomeReceipt, ReceiptId, ReceiptStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY,
        email TEXT,
        bot_status TEXT NOT NULL DEFAULT 'inactive',
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS receipts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL UNIQUE,
        account_id INTEGER NOT NULL,
        initial_balance TEXT NOT NULL,
        balance TEXT NOT NULL,
        profit TEXT NOT NULL,
        profit_rate TEXT NOT NULL,
        consecutive_losses INTEGER NOT NULL,
        rounds_played INTEGER NOT NULL,
        status TEXT NOT NULL,
        termination TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS receipts_account_idx ON receipts (account_id)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open SQLite database: {database_url}"))?;
        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "SQLite store ready");
        Ok(store)
    }

    /// Private in-memory database. A single connection, since each
    /// SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply SQLite schema")?;
        }
        Ok(())
    }

    /// Create or update an account row. New accounts start inactive.
    pub async fn upsert_account(&self, account_id: AccountId, email: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, email, bot_status, updated_at) VALUES (?, ?, 'inactive', ?)
             ON CONFLICT(id) DO UPDATE SET email = excluded.email, updated_at = excluded.updated_at",
        )
        .bind(account_id)
        .bind(email)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert account {account_id}"))?;
        Ok(())
    }

    async fn account_exists(&self, account_id: AccountId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    fn decode_receipt(row: &SqliteRow) -> Result<StoredReceipt> {
        let decimal = |column: &str| -> Result<Decimal> {
            let raw: String = row.try_get(column)?;
            Decimal::from_str(&raw).with_context(|| format!("Bad decimal in {column}: {raw}"))
        };

        let session_id: String = row.try_get("session_id")?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;
        let consecutive_losses: i64 = row.try_get("consecutive_losses")?;
        let rounds_played: i64 = row.try_get("rounds_played")?;

        Ok(StoredReceipt {
            id: row.try_get("id")?,
            receipt: OutcomeReceipt {
                session_id: Uuid::parse_str(&session_id).context("Bad session_id")?,
                account_id: row.try_get("account_id")?,
                initial_balance: decimal("initial_balance")?,
                balance: decimal("balance")?,
                profit: decimal("profit")?,
                profit_rate: decimal("profit_rate")?,
                number_of_consecutive_losses: u32::try_from(consecutive_losses)?,
                rounds_played: u32::try_from(rounds_played)?,
                status: ReceiptStatus::from_str(&status)?,
                termination: row.try_get("termination")?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .context("Bad created_at")?
                    .with_timezone(&Utc),
            },
        })
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get_bot_status(&self, account_id: AccountId) -> Result<BotStatus> {
        let row = sqlx::query("SELECT bot_status FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read bot status")?
            .with_context(|| format!("Account not found: {account_id}"))?;
        let raw: String = row.try_get("bot_status")?;
        BotStatus::from_str(&raw)
    }

    async fn set_bot_status(&self, account_id: AccountId, status: BotStatus) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET bot_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(account_id)
            .execute(&self.pool)
            .await
            .context("Failed to update bot status")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Account not found: {account_id}");
        }
        debug!(account_id, status = %status, "Bot status updated");
        Ok(())
    }

    async fn activate_if_inactive(&self, account_id: AccountId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET bot_status = 'active', updated_at = ? WHERE id = ? AND bot_status <> 'active'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .context("Failed to activate bot")?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.account_exists(account_id).await? {
            anyhow::bail!("Account not found: {account_id}");
        }
        Ok(false)
    }

    async fn contact_email(&self, account_id: AccountId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read account email")?
            .with_context(|| format!("Account not found: {account_id}"))?;
        Ok(row.try_get("email")?)
    }
}

#[async_trait]
impl ReceiptStore for SqliteStore {
    async fn save(&self, receipt: &OutcomeReceipt) -> Result<ReceiptId> {
        let result = sqlx::query(
            "INSERT INTO receipts (session_id, account_id, initial_balance, balance, profit, profit_rate,
                consecutive_losses, rounds_played, status, termination, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(receipt.session_id.to_string())
        .bind(receipt.account_id)
        .bind(receipt.initial_balance.to_string())
        .bind(receipt.balance.to_string())
        .bind(receipt.profit.to_string())
        .bind(receipt.profit_rate.to_string())
        .bind(i64::from(receipt.number_of_consecutive_losses))
        .bind(i64::from(receipt.rounds_played))
        .bind(receipt.status.as_str())
        .bind(&receipt.termination)
        .bind(receipt.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert receipt for session {}", receipt.session_id))?;

        Ok(result.last_insert_rowid())
    }

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<StoredReceipt>> {
        let rows = sqlx::query("SELECT * FROM receipts WHERE account_id = ? ORDER BY id")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list receipts")?;
        rows.iter().map(Self::decode_receipt).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
