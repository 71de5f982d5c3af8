//! BANCO: autonomous baccarat session engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the account and receipt stores, and runs the configured
//! session until it finishes or Ctrl+C asks it to stop.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use banco::alerts::{LogNotifier, Notifier, WebhookNotifier};
use banco::config::{self, AppConfig};
use banco::engine::reporter::OutcomeReporter;
use banco::engine::supervisor::SessionSupervisor;
use banco::storage::{AccountStore, MemoryStore, ReceiptStore, SqliteStore};
use banco::table::remote::RemoteDriverFactory;
use banco::types::{ActivationRequest, OutcomeReceipt, ReportError};

const BANNER: &str = r#"
 ____    _    _   _  ____ ___
| __ )  / \  | \ | |/ ___/ _ \
|  _ \ / _ \ |  \| | |  | | | |
| |_) / ___ \| |\  | |__| |_| |
|____/_/   \_\_| \_|\____\___/

  Baccarat Autonomous Session Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_ms = cfg.agent.poll_interval_ms,
        anchor_countdown = cfg.agent.anchor_countdown,
        "BANCO starting up"
    );

    let Some(run) = cfg.session.clone() else {
        warn!("No [session] section configured, nothing to run");
        return Ok(());
    };

    // -- Initialise components -------------------------------------------

    let settings = cfg.session_settings()?;
    let (accounts, receipts) = open_stores(&cfg, run.account_id, run.contact_email.as_deref()).await?;
    let notifier = build_notifier(&cfg)?;
    let reporter = Arc::new(OutcomeReporter::new(receipts, accounts.clone(), notifier));
    let drivers = Arc::new(RemoteDriverFactory::new(
        cfg.driver.clone(),
        cfg.table.selectors.clone(),
    ));
    let supervisor = SessionSupervisor::new(accounts, reporter, drivers, settings);
    supervisor.clear_stale_activation(run.account_id).await?;

    // -- Run -------------------------------------------------------------

    let request = ActivationRequest {
        account_id: run.account_id,
        bet_unit: run.bet_unit.unwrap_or(cfg.agent.default_bet_unit),
        profit_rate: run.profit_rate.unwrap_or(cfg.agent.default_profit_rate),
    };
    let session_id = supervisor.start_session(request).await?;

    info!(session_id = %session_id, "Session running. Press Ctrl+C to stop.");

    let finished = supervisor.wait(session_id);
    tokio::pin!(finished);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = tokio::select! {
        result = &mut finished => result,
        _ = &mut shutdown => {
            info!("Shutdown signal received, stopping at the next betting window.");
            supervisor.deactivate(run.account_id).await?;
            finished.await
        }
    };

    match result {
        Ok(receipt) => log_receipt(&receipt),
        Err(e) => match e.downcast_ref::<ReportError>() {
            Some(ReportError::Notification { receipt, source }) => {
                warn!(error = %source, "Receipt recorded but the contact was not notified");
                log_receipt(receipt);
            }
            _ => {
                error!(error = %e, "Session ended without a receipt");
                return Err(e);
            }
        },
    }

    info!("BANCO shut down cleanly.");
    Ok(())
}

/// Open SQLite when a database URL is configured, memory otherwise, and
/// make sure the session's account exists.
async fn open_stores(
    cfg: &AppConfig,
    account_id: i64,
    contact_email: Option<&str>,
) -> Result<(Arc<dyn AccountStore>, Arc<dyn ReceiptStore>)> {
    match &cfg.storage.database_url {
        Some(url) => {
            let store = Arc::new(SqliteStore::connect(url).await?);
            store.upsert_account(account_id, contact_email).await?;
            let accounts: Arc<dyn AccountStore> = store.clone();
            let receipts: Arc<dyn ReceiptStore> = store;
            Ok((accounts, receipts))
        }
        None => {
            warn!("No storage.database_url configured, receipts will not survive restart");
            let store = Arc::new(MemoryStore::new());
            store
                .insert_account(account_id, contact_email.map(str::to_string))
                .await;
            let accounts: Arc<dyn AccountStore> = store.clone();
            let receipts: Arc<dyn ReceiptStore> = store;
            Ok((accounts, receipts))
        }
    }
}

fn build_notifier(cfg: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let url = cfg
        .alerts
        .webhook_url_env
        .as_deref()
        .and_then(|env| AppConfig::resolve_env(env).ok());

    match url {
        Some(url) => {
            info!("Delivering session summaries via webhook");
            let notifier = WebhookNotifier::new(url).context("Failed to set up webhook notifier")?;
            Ok(Arc::new(notifier))
        }
        None => {
            info!("No webhook configured, session summaries go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn log_receipt(receipt: &OutcomeReceipt) {
    info!(
        session_id = %receipt.session_id,
        status = %receipt.status,
        initial = format!("{:.2}", receipt.initial_balance),
        balance = format!("{:.2}", receipt.balance),
        profit = format!("{:.2}", receipt.profit),
        realized_rate = %receipt.realized_rate(),
        peak_streak = receipt.number_of_consecutive_losses,
        rounds = receipt.rounds_played,
        reason = %receipt.termination,
        "Session finished"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("banco=info"));

    let json_logging = std::env::var("BANCO_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!(agent = %cfg.agent.name, json = json_logging, "Logging initialised");
}
