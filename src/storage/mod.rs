//! Persistence layer.
//!
//! Account bot-status and outcome receipts live behind two traits so the
//! engine never depends on a concrete database:
//! - `memory`: `tokio::sync::Mutex` maps, for tests and dry runs
//! - `sqlite`: sqlx SQLite pool for the deployed binary

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, BotStatus, OutcomeReceipt, ReceiptId};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Per-account bot status, read for cancellation and written on
/// activation, deactivation and session end.
///
/// Implementations serialise reads and writes for the same account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_bot_status(&self, account_id: AccountId) -> Result<BotStatus>;

    async fn set_bot_status(&self, account_id: AccountId, status: BotStatus) -> Result<()>;

    /// Atomically flip Inactive → Active. Returns false if already Active.
    async fn activate_if_inactive(&self, account_id: AccountId) -> Result<bool>;

    /// Where session summaries for this account are delivered.
    async fn contact_email(&self, account_id: AccountId) -> Result<Option<String>>;
}

/// A receipt together with the id the store assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReceipt {
    pub id: ReceiptId,
    pub receipt: OutcomeReceipt,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn save(&self, receipt: &OutcomeReceipt) -> Result<ReceiptId>;

    /// Receipts for one account, oldest first.
    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<StoredReceipt>>;
}
