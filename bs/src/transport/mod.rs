//! Messaging transport abstraction
//!
//! The dispatcher talks to the platform through [`MessagingClient`];
//! session establishment and pairing live behind the concrete client.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::TransportConfig;

mod http;
mod null;

pub use http::HttpGatewayClient;
pub use null::NullClient;

/// Errors from transport calls; all of them are transient from the
/// orchestrator's point of view (the contact stays pending)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Whether the identifier is a registered, reachable recipient
    async fn check_registered(&self, canonical_id: &str) -> Result<bool, TransportError>;

    /// Deliver a rendered message
    async fn send_message(&self, canonical_id: &str, text: &str) -> Result<(), TransportError>;
}

/// Create a messaging client from config; `dry_run` forces the null client
pub fn create_client(config: &TransportConfig, dry_run: bool) -> Result<Arc<dyn MessagingClient>, TransportError> {
    if dry_run {
        debug!("create_client: dry run, using null client");
        return Ok(Arc::new(NullClient));
    }

    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpGatewayClient::from_config(config)?)),
        "null" => Ok(Arc::new(NullClient)),
        other => Err(TransportError::InvalidResponse(format!(
            "Unknown transport provider: '{}'. Supported: http, null",
            other
        ))),
    }
}
