//! In-memory account and receipt store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AccountStore, ReceiptStore, StoredReceipt};
use crate::types::{AccountId, BotStatus, OutcomeReceipt, ReceiptId};

#[derive(Debug, Clone)]
struct AccountRecord {
    email: Option<String>,
    bot_status: BotStatus,
}

/// Store backed by process memory. One lock per table keeps status
/// reads and writes for an account strictly ordered.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<AccountId, AccountRecord>>,
    receipts: Mutex<Vec<StoredReceipt>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with an inactive bot.
    pub async fn insert_account(&self, account_id: AccountId, email: Option<String>) {
        self.accounts.lock().await.insert(
            account_id,
            AccountRecord {
                email,
                bot_status: BotStatus::Inactive,
            },
        );
    }

    /// Every receipt saved so far.
    pub async fn receipts(&self) -> Vec<StoredReceipt> {
        self.receipts.lock().await.clone()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_bot_status(&self, account_id: AccountId) -> Result<BotStatus> {
        let accounts = self.accounts.lock().await;
        let record = accounts
            .get(&account_id)
            .with_context(|| format!("Account not found: {account_id}"))?;
        Ok(record.bot_status)
    }

    async fn set_bot_status(&self, account_id: AccountId, status: BotStatus) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .get_mut(&account_id)
            .with_context(|| format!("Account not found: {account_id}"))?;
        record.bot_status = status;
        debug!(account_id, status = %status, "Bot status updated");
        Ok(())
    }

    async fn activate_if_inactive(&self, account_id: AccountId) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .get_mut(&account_id)
            .with_context(|| format!("Account not found: {account_id}"))?;
        if record.bot_status == BotStatus::Active {
            return Ok(false);
        }
        record.bot_status = BotStatus::Active;
        Ok(true)
    }

    async fn contact_email(&self, account_id: AccountId) -> Result<Option<String>> {
        let accounts = self.accounts.lock().await;
        let record = accounts
            .get(&account_id)
            .with_context(|| format!("Account not found: {account_id}"))?;
        Ok(record.email.clone())
    }
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn save(&self, receipt: &OutcomeReceipt) -> Result<ReceiptId> {
        let mut receipts = self.receipts.lock().await;
        let id = receipts.len() as ReceiptId + 1;
        receipts.push(StoredReceipt {
            id,
            receipt: receipt.clone(),
        });
        Ok(id)
    }

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<StoredReceipt>> {
        let receipts = self.receipts.lock().await;
        Ok(receipts
            .iter()
            .filter(|r| r.receipt.account_id == account_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
