//! Outcome reporting, exactly one receipt per session.
//!
//! Order on termination: persist the receipt, flip the bot to inactive,
//! then notify the account contact. A notification failure is returned to
//! the caller but never undoes the first two steps.

use anyhow::{anyhow, Context};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::session::SessionOutcome;
use crate::alerts::Notifier;
use crate::storage::{AccountStore, ReceiptStore};
use crate::types::{BotStatus, OutcomeReceipt, ReportError};

/// Build the receipt for a finished session.
pub fn build_receipt(outcome: &SessionOutcome) -> OutcomeReceipt {
    OutcomeReceipt {
        session_id: outcome.session_id,
        account_id: outcome.account_id,
        initial_balance: outcome.initial_balance,
        balance: outcome.final_balance,
        profit: outcome.profit(),
        profit_rate: outcome.profit_rate,
        number_of_consecutive_losses: outcome.peak_loss_streak,
        rounds_played: outcome.rounds_played,
        status: outcome.termination.receipt_status(),
        termination: outcome.termination.to_string(),
        created_at: Utc::now(),
    }
}

pub struct OutcomeReporter {
    receipts: Arc<dyn ReceiptStore>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    reported: Mutex<HashSet<Uuid>>,
}

impl OutcomeReporter {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            receipts,
            accounts,
            notifier,
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Persist and announce a session's outcome.
    ///
    /// A second call for the same session is rejected without touching
    /// storage. The session id is claimed before the write, so concurrent
    /// duplicate calls cannot both persist.
    pub async fn report(&self, outcome: &SessionOutcome) -> Result<OutcomeReceipt, ReportError> {
        if !self.reported.lock().await.insert(outcome.session_id) {
            warn!(session_id = %outcome.session_id, "Duplicate report ignored");
            return Err(ReportError::DuplicateReport(outcome.session_id));
        }

        let receipt = build_receipt(outcome);
        let receipt_id = match self.receipts.save(&receipt).await {
            Ok(id) => id,
            Err(e) => {
                error!(session_id = %receipt.session_id, error = %e, "Failed to persist receipt");
                return Err(ReportError::Storage(e));
            }
        };

        self.accounts
            .set_bot_status(receipt.account_id, BotStatus::Inactive)
            .await
            .map_err(ReportError::Storage)?;

        info!(
            receipt_id,
            account_id = receipt.account_id,
            status = %receipt.status,
            balance = %receipt.balance,
            profit = %receipt.profit,
            peak_streak = receipt.number_of_consecutive_losses,
            "Receipt recorded"
        );

        if let Err(source) = self.notify(&receipt).await {
            warn!(receipt_id, error = %source, "Summary delivery failed");
            return Err(ReportError::Notification {
                receipt: Box::new(receipt),
                source,
            });
        }
        Ok(receipt)
    }

    async fn notify(&self, receipt: &OutcomeReceipt) -> anyhow::Result<()> {
        let recipient = self
            .accounts
            .contact_email(receipt.account_id)
            .await
            .context("Contact lookup failed")?
            .ok_or_else(|| anyhow!("account {} has no contact email", receipt.account_id))?;

        self.notifier
            .notify(&recipient, receipt)
            .await
            .with_context(|| format!("Summary to {recipient} not delivered"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
