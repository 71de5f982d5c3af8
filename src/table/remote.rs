//! HTTP client for a page-automation sidecar.
//!
//! The sidecar owns the browser and exposes three endpoints:
//!
//! - `GET  /fields?selector=...` → `{"text": "..."}` (404 when absent)
//! - `POST /click` with `{"selector": "..."}`
//! - `GET  /health` → `{"connected": true}`
//!
//! Auth: optional `Authorization: Bearer {token}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Control, DriverError, Field, GameDriver};
use crate::config::{DriverConfig, SelectorsConfig};
use crate::types::Side;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FieldResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct ClickRequest<'a> {
    selector: &'a str,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    connected: bool,
}

// ---------------------------------------------------------------------------
// Selector map
// ---------------------------------------------------------------------------

/// Maps semantic fields and controls onto page selectors.
#[derive(Debug, Clone)]
pub struct SelectorMap {
    selectors: SelectorsConfig,
}

impl SelectorMap {
    pub fn new(selectors: SelectorsConfig) -> Self {
        Self { selectors }
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Status => &self.selectors.status,
            Field::Balance => &self.selectors.balance,
        }
    }

    pub fn control(&self, control: &Control) -> String {
        match control {
            Control::Chip(value) => self.selectors.chip.replace("{value}", &value.to_string()),
            Control::BetSpot(Side::Banker) => self.selectors.banker.clone(),
            Control::BetSpot(Side::Player) => self.selectors.player.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RemoteTableDriver {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
    selectors: SelectorMap,
}

impl RemoteTableDriver {
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        selectors: SelectorMap,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent("BANCO/0.1.0 (table-driver)")
            .build()
            .context("Failed to build HTTP client for table driver")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            selectors,
        })
    }

    /// Build from config, resolving the token from the environment.
    pub fn from_config(driver: &DriverConfig, selectors: &SelectorsConfig) -> Result<Self> {
        let token = match &driver.api_token_env {
            Some(env) => match std::env::var(env) {
                Ok(value) => Some(SecretString::new(value)),
                Err(_) => {
                    warn!(env = %env, "Driver token variable not set, connecting without auth");
                    None
                }
            },
            None => None,
        };
        Self::new(
            &driver.base_url,
            token,
            SelectorMap::new(selectors.clone()),
            Duration::from_secs(driver.request_timeout_secs),
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, DriverError> {
        self.authorized(request).send().await.map_err(transport_error)
    }
}

/// Connection-level failures mean the page is gone.
fn transport_error(e: reqwest::Error) -> DriverError {
    if e.is_connect() {
        DriverError::Disconnected
    } else if e.is_timeout() {
        DriverError::Timeout
    } else {
        DriverError::Transport(e.to_string())
    }
}

#[async_trait]
impl GameDriver for RemoteTableDriver {
    async fn read_text(&self, field: Field) -> Result<String, DriverError> {
        let selector = self.selectors.field(field);
        let url = format!(
            "{}/fields?selector={}",
            self.base_url,
            urlencoding::encode(selector)
        );
        debug!(field = %field, selector, "Reading field");

        let resp = self.send(self.http.get(&url)).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(DriverError::FieldMissing(field)),
            StatusCode::SERVICE_UNAVAILABLE => return Err(DriverError::Disconnected),
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(DriverError::Transport(format!("field read {s}: {body}")));
            }
            _ => {}
        }

        let body: FieldResponse = resp.json().await.map_err(transport_error)?;
        Ok(body.text)
    }

    async fn click(&self, control: &Control) -> Result<(), DriverError> {
        let selector = self.selectors.control(control);
        let url = format!("{}/click", self.base_url);
        debug!(control = %control, selector = %selector, "Clicking");

        let resp = self
            .send(self.http.post(&url).json(&ClickRequest { selector: &selector }))
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::SERVICE_UNAVAILABLE => Err(DriverError::Disconnected),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(DriverError::Transport(format!("click {control} {s}: {body}")))
            }
        }
    }

    async fn is_connected(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let resp = match self.send(self.http.get(&url)).await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return false,
        };
        resp.json::<HealthResponse>()
            .await
            .map(|h| h.connected)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Produces one driver handle per session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn GameDriver>>;
}

pub struct RemoteDriverFactory {
    driver: DriverConfig,
    selectors: SelectorsConfig,
}

impl RemoteDriverFactory {
    pub fn new(driver: DriverConfig, selectors: SelectorsConfig) -> Self {
        Self { driver, selectors }
    }
}

#[async_trait]
impl DriverFactory for RemoteDriverFactory {
    async fn connect(&self) -> Result<Arc<dyn GameDriver>> {
        let driver = RemoteTableDriver::from_config(&self.driver, &self.selectors)?;
        if !driver.is_connected().await {
            anyhow::bail!("Table driver at {} is not connected", self.driver.base_url);
        }
        Ok(Arc::new(driver))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
