//! Delivery sink boundary.
//!
//! The pipeline hands one structured payload per item to a sink and only
//! commits state when the sink reports success. Failed deliveries are
//! not retried within the cycle; the item is reclassified next run.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::pipeline::embed::EmbedPayload;

/// Destination for notification payloads.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one payload; `Ok` is the signal to commit state.
    async fn deliver(&self, payload: &EmbedPayload) -> Result<()>;
}

/// Webhook sink posting embeds to a Discord-compatible endpoint.
pub struct WebhookSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn deliver(&self, payload: &EmbedPayload) -> Result<()> {
        let body = serde_json::json!({ "embeds": [payload] });
        let response = self
            .client
            .post(format!("{}?wait=true", self.webhook_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(300).collect();
            return Err(AppError::delivery(format!(
                "webhook returned {status}: {snippet}"
            )));
        }
        Ok(())
    }
}

/// Sink that only logs, for dry runs.
pub struct DryRunSink;

#[async_trait]
impl DeliverySink for DryRunSink {
    async fn deliver(&self, payload: &EmbedPayload) -> Result<()> {
        log::info!("[dry-run] Would send: {}", payload.title);
        Ok(())
    }
}
