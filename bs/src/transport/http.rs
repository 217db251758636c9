//! HTTP messaging gateway client
//!
//! Talks to a REST bridge sitting in front of the messaging session. The
//! bridge owns pairing and authentication; this client only checks numbers
//! and posts messages, with bounded retries on transient gateway errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{MessagingClient, TransportError};
use crate::config::TransportConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub struct HttpGatewayClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ContactStatusResponse {
    registered: bool,
}

impl HttpGatewayClient {
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn execute_with_retry<F>(&self, make_request: F) -> Result<reqwest::Response, TransportError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.authorize(make_request()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();

                    if attempt <= MAX_RETRIES && is_retryable_status(status) {
                        warn!(status, attempt, "gateway returned retryable status, backing off");
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        backoff *= 2;
                        continue;
                    }
                    return Err(TransportError::Api { status, message });
                }
                Err(e) => return Err(TransportError::Network(e)),
            }
        }
    }
}

#[async_trait]
impl MessagingClient for HttpGatewayClient {
    async fn check_registered(&self, canonical_id: &str) -> Result<bool, TransportError> {
        debug!(%canonical_id, "check_registered: called");
        let url = format!("{}/v1/contacts/{}", self.base_url, canonical_id);

        let response = self.execute_with_retry(|| self.http.get(&url)).await?;
        let body: ContactStatusResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        Ok(body.registered)
    }

    async fn send_message(&self, canonical_id: &str, text: &str) -> Result<(), TransportError> {
        debug!(%canonical_id, text_len = text.len(), "send_message: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({ "to": canonical_id, "body": text });

        self.execute_with_retry(|| self.http.post(&url).json(&body)).await?;
        Ok(())
    }
}
