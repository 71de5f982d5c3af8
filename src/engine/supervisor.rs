//! Session supervisor: one task per active account.
//!
//! Activation goes through a conditional status flip in the account
//! store, so two concurrent starts for the same account cannot both win.
//! The flag alone is not enough: `deactivate` clears it immediately while
//! the old session plays out its round, so a start is also refused while
//! the account still has a live task here.

use anyhow::{Context, Result};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cancellation::CancellationWatcher;
use super::reporter::OutcomeReporter;
use super::session::{SessionSettings, SessionStateMachine};
use crate::storage::AccountStore;
use crate::table::remote::DriverFactory;
use crate::types::{AccountId, ActivationRequest, BotStatus, OutcomeReceipt, ReportError};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("account {0} already has an active session")]
    AlreadyActive(AccountId),

    #[error("invalid activation request: {0}")]
    InvalidRequest(String),

    #[error("account store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("table driver unavailable: {0}")]
    DriverUnavailable(#[source] anyhow::Error),
}

struct RunningSession {
    account_id: AccountId,
    task: JoinHandle<Result<OutcomeReceipt, ReportError>>,
}

impl RunningSession {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct SessionSupervisor {
    accounts: Arc<dyn AccountStore>,
    reporter: Arc<OutcomeReporter>,
    drivers: Arc<dyn DriverFactory>,
    settings: SessionSettings,
    running: Mutex<HashMap<Uuid, RunningSession>>,
}

impl SessionSupervisor {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        reporter: Arc<OutcomeReporter>,
        drivers: Arc<dyn DriverFactory>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            accounts,
            reporter,
            drivers,
            settings,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Activate the bot for an account and spawn its session.
    pub async fn start_session(&self, request: ActivationRequest) -> Result<Uuid, StartError> {
        if request.bet_unit == 0 {
            return Err(StartError::InvalidRequest("bet_unit must be at least 1".into()));
        }
        if request.profit_rate <= rust_decimal::Decimal::ZERO {
            return Err(StartError::InvalidRequest("profit_rate must be positive".into()));
        }

        let account_id = request.account_id;
        self.prune_finished().await;
        if self.has_live_session(account_id).await {
            return Err(StartError::AlreadyActive(account_id));
        }

        let activated = self
            .accounts
            .activate_if_inactive(account_id)
            .await
            .map_err(StartError::Store)?;
        if !activated {
            return Err(StartError::AlreadyActive(account_id));
        }

        let driver = match self.drivers.connect().await {
            Ok(driver) => driver,
            Err(e) => {
                if let Err(revert) = self.accounts.set_bot_status(account_id, BotStatus::Inactive).await {
                    error!(account_id, error = %revert, "Failed to revert activation");
                }
                return Err(StartError::DriverUnavailable(e));
            }
        };

        let machine = SessionStateMachine::new(
            &request,
            driver,
            CancellationWatcher::new(self.accounts.clone()),
            self.settings.clone(),
        );
        let session_id = machine.session().session_id;
        let reporter = self.reporter.clone();

        let task = tokio::spawn(async move {
            let outcome = machine.run().await;
            reporter.report(&outcome).await
        });

        self.running
            .lock()
            .await
            .insert(session_id, RunningSession { account_id, task });

        info!(
            account_id,
            session_id = %session_id,
            bet_unit = request.bet_unit,
            profit_rate = %request.profit_rate,
            "Session started"
        );
        Ok(session_id)
    }

    /// Ask the account's session to stop at its next betting window.
    pub async fn deactivate(&self, account_id: AccountId) -> Result<()> {
        self.accounts
            .set_bot_status(account_id, BotStatus::Inactive)
            .await
            .with_context(|| format!("Failed to deactivate account {account_id}"))?;
        info!(account_id, "Deactivation requested");
        Ok(())
    }

    /// Clear an Active flag left behind by a process that died mid-session.
    ///
    /// Only acts when this supervisor has no live session for the account.
    /// Returns true when a stale flag was cleared.
    pub async fn clear_stale_activation(&self, account_id: AccountId) -> Result<bool> {
        if self.has_live_session(account_id).await {
            return Ok(false);
        }
        let status = self
            .accounts
            .get_bot_status(account_id)
            .await
            .with_context(|| format!("Failed to read status of account {account_id}"))?;
        if status != BotStatus::Active {
            return Ok(false);
        }

        warn!(account_id, "Clearing stale active status from a previous run");
        self.deactivate(account_id).await?;
        Ok(true)
    }

    /// Sessions whose task is still running.
    pub async fn sessions(&self) -> Vec<(Uuid, AccountId)> {
        self.running
            .lock()
            .await
            .iter()
            .filter(|(_, s)| s.is_live())
            .map(|(id, s)| (*id, s.account_id))
            .collect()
    }

    /// Wait for a session to finish and return its receipt.
    pub async fn wait(&self, session_id: Uuid) -> Result<OutcomeReceipt> {
        let running = self
            .running
            .lock()
            .await
            .remove(&session_id)
            .with_context(|| format!("Unknown session: {session_id}"))?;
        Self::join(session_id, running).await
    }

    /// Deactivate every tracked session and wait for all of them.
    pub async fn shutdown(&self) -> Vec<Result<OutcomeReceipt>> {
        let drained: Vec<(Uuid, RunningSession)> = self.running.lock().await.drain().collect();
        info!(sessions = drained.len(), "Shutting down sessions");

        for (_, running) in &drained {
            if let Err(e) = self.deactivate(running.account_id).await {
                warn!(account_id = running.account_id, error = %e, "Deactivation failed during shutdown");
            }
        }

        join_all(drained.into_iter().map(|(id, running)| Self::join(id, running))).await
    }

    async fn has_live_session(&self, account_id: AccountId) -> bool {
        self.running
            .lock()
            .await
            .values()
            .any(|s| s.account_id == account_id && s.is_live())
    }

    /// Drop finished sessions nobody waited for. Their receipts are
    /// already persisted; the result is only logged.
    async fn prune_finished(&self) {
        let mut running = self.running.lock().await;
        let finished: Vec<Uuid> = running
            .iter()
            .filter(|(_, s)| !s.is_live())
            .map(|(id, _)| *id)
            .collect();

        for session_id in finished {
            let Some(done) = running.remove(&session_id) else {
                continue;
            };
            match done.task.now_or_never() {
                Some(Ok(Ok(_))) => debug!(session_id = %session_id, "Pruned finished session"),
                Some(Ok(Err(e))) => {
                    warn!(session_id = %session_id, error = %e, "Pruned session ended with a report error")
                }
                Some(Err(e)) => error!(session_id = %session_id, error = %e, "Pruned session task aborted"),
                None => {}
            }
        }
    }

    async fn join(session_id: Uuid, running: RunningSession) -> Result<OutcomeReceipt> {
        let reported = running
            .task
            .await
            .with_context(|| format!("Session task {session_id} aborted"))?;
        reported.with_context(|| format!("Session {session_id} could not be reported"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
