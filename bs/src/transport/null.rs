//! No-op client for dry runs
//!
//! Reports every identifier as registered and logs sends without
//! delivering anything.

use async_trait::async_trait;
use tracing::info;

use super::{MessagingClient, TransportError};

#[derive(Debug, Default)]
pub struct NullClient;

#[async_trait]
impl MessagingClient for NullClient {
    async fn check_registered(&self, canonical_id: &str) -> Result<bool, TransportError> {
        info!(%canonical_id, "dry run: treating number as registered");
        Ok(true)
    }

    async fn send_message(&self, canonical_id: &str, text: &str) -> Result<(), TransportError> {
        info!(%canonical_id, text_len = text.len(), "dry run: message not delivered");
        Ok(())
    }
}
