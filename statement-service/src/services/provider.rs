//! Bank provider client.
//!
//! One API shape is assumed: a personal statement endpoint capped at
//! [`PAGE_SIZE`](crate::services::fetcher::PAGE_SIZE) items per call and a
//! client-info endpoint listing the token owner's accounts.

use crate::config::ProviderConfig;
use crate::models::{Credential, Transaction};
use crate::services::metrics::{PROVIDER_REQUESTS_TOTAL, PROVIDER_REQUEST_DURATION};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const TOKEN_HEADER: &str = "X-Token";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is throttling requests")]
    TooManyRequests { retry_after: Option<u64> },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider unreachable: {0}")]
    Connection(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// HTTP-like status, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TooManyRequests { .. } => Some(429),
            Self::Status { status, .. } => Some(*status),
            Self::Connection(_) | Self::Decode(_) => None,
        }
    }
}

/// Owner of a token and the accounts it can read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<ProviderAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub id: String,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub currency_code: Option<i32>,
    /// Minor units.
    #[serde(default)]
    pub balance: i64,
}

#[async_trait]
pub trait BankProvider: Send + Sync {
    /// One page of statement items for `[from, to]`, at most the page cap.
    async fn statement(
        &self,
        credential: &Credential,
        account_ref: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, ProviderError>;

    async fn client_info(&self, credential: &Credential) -> Result<ClientInfo, ProviderError>;
}

/// HTTP client for the provider's personal API.
#[derive(Clone)]
pub struct MonobankClient {
    client: Client,
    config: ProviderConfig,
}

impl MonobankClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        credential: &Credential,
        path: &str,
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let timer = PROVIDER_REQUEST_DURATION
            .with_label_values(&[endpoint])
            .start_timer();

        let sent = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, credential.expose())
            .timeout(timeout)
            .send()
            .await;
        timer.observe_duration();

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                PROVIDER_REQUESTS_TOTAL
                    .with_label_values(&[endpoint, "error"])
                    .inc();
                warn!(endpoint, credential = %credential.short_id(), error = %e, "Provider request failed");
                return Err(ProviderError::Connection(e.to_string()));
            }
        };

        let status = response.status();
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(endpoint, credential = %credential.short_id(), ?retry_after, "Provider throttled request");
            return Err(ProviderError::TooManyRequests { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "Provider rejected request");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint, bytes = body.len(), "Provider response received");
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BankProvider for MonobankClient {
    #[instrument(skip(self, credential), fields(credential = %credential.short_id()))]
    async fn statement(
        &self,
        credential: &Credential,
        account_ref: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let path = format!("/personal/statement/{}/{}/{}", account_ref, from, to);
        self.get_json("statement", credential, &path, self.config.statement_timeout)
            .await
    }

    #[instrument(skip(self, credential), fields(credential = %credential.short_id()))]
    async fn client_info(&self, credential: &Credential) -> Result<ClientInfo, ProviderError> {
        self.get_json(
            "client_info",
            credential,
            "/personal/client-info",
            self.config.client_info_timeout,
        )
        .await
    }
}
