//! Session summary delivery.
//!
//! `LogNotifier` writes the summary to the log; `WebhookNotifier` posts it
//! as JSON to a mail/relay endpoint that owns templating and delivery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::types::{OutcomeReceipt, ReceiptStatus};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a session summary to `recipient`.
    async fn notify(&self, recipient: &str, receipt: &OutcomeReceipt) -> Result<()>;
}

/// Subject line for a session summary.
pub fn subject_for(receipt: &OutcomeReceipt) -> String {
    match receipt.status {
        ReceiptStatus::Complete => format!("Session complete: profit {:.2}", receipt.profit),
        ReceiptStatus::Incomplete => format!("Session stopped: balance {:.2}", receipt.balance),
    }
}

/// Notifier that only logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, receipt: &OutcomeReceipt) -> Result<()> {
        info!(
            recipient,
            subject = %subject_for(receipt),
            summary = %receipt,
            "Session summary"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    subject: String,
    body: String,
    receipt: &'a OutcomeReceipt,
}

/// Posts summaries to an HTTP endpoint.
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("BANCO/0.1.0 (session-notifier)")
            .build()
            .context("Failed to build HTTP client for webhook notifier")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipient: &str, receipt: &OutcomeReceipt) -> Result<()> {
        let payload = WebhookPayload {
            recipient,
            subject: subject_for(receipt),
            body: receipt.to_string(),
            receipt,
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("Webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error {status}: {body}");
        }

        info!(recipient, session_id = %receipt.session_id, "Summary delivered");
        Ok(())
    }
}
