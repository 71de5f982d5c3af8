//! Cooperative cancellation.
//!
//! The session asks once per betting window whether the operator switched
//! the bot off. Rounds already wagered on always run to completion.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::AccountStore;
use crate::types::{AccountId, BotStatus};

#[derive(Clone)]
pub struct CancellationWatcher {
    accounts: Arc<dyn AccountStore>,
}

impl CancellationWatcher {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// One bot-status read; true when the account is no longer active.
    pub async fn should_stop(&self, account_id: AccountId) -> Result<bool> {
        let status = self.accounts.get_bot_status(account_id).await?;
        debug!(account_id, status = %status, "Bot status checked");
        if status == BotStatus::Inactive {
            info!(account_id, "Cancellation requested");
            return Ok(true);
        }
        Ok(false)
    }
}
