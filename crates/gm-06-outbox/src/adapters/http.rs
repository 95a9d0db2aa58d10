//! HTTP delivery sink for the marketplace back-office.

use async_trait::async_trait;
use serde::Deserialize;
use shared_types::{OutboxEntry, OutboxKind};
use tracing::debug;

use crate::ports::{DeliveryError, DeliveryReceipt, DeliverySink};

/// Marketplace endpoint configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Base URL, e.g. `https://marketplace.example`.
    pub base_url: String,
    /// Per-request timeout (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Id-bearing response body the marketplace returns on success, including
/// for idempotent duplicates.
#[derive(Debug, Deserialize)]
struct RemoteAck {
    #[serde(alias = "uuid")]
    id: Option<String>,
}

/// Delivers outbox entries over HTTP.
pub struct HttpDeliverySink {
    client: reqwest::Client,
    config: MarketplaceConfig,
}

impl HttpDeliverySink {
    pub fn new(config: MarketplaceConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client, config })
    }

    fn url_for(&self, kind: OutboxKind) -> String {
        let path = match kind {
            OutboxKind::Usage => "/api/v1/usage",
            OutboxKind::Settlement => "/api/v1/settlements",
            OutboxKind::LifecycleCallback => "/api/v1/callbacks/lifecycle",
        };
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<DeliveryReceipt, DeliveryError> {
        let url = self.url_for(entry.kind);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", &entry.idempotency_key)
            .json(&entry.payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Retriable(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 409 {
            // A duplicate submission answers with the original id.
            let remote_id = response
                .json::<RemoteAck>()
                .await
                .ok()
                .and_then(|ack| ack.id);
            debug!(entry_id = %entry.entry_id, %url, ?remote_id, "Entry delivered");
            return Ok(DeliveryReceipt { remote_id });
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(DeliveryError::Permanent(format!("{status}: {body}")))
        } else {
            Err(DeliveryError::Retriable(format!("{status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_routing() {
        let sink = HttpDeliverySink::new(MarketplaceConfig {
            base_url: "https://market.example/".into(),
            request_timeout_ms: 1_000,
        })
        .unwrap();
        assert_eq!(
            sink.url_for(OutboxKind::Usage),
            "https://market.example/api/v1/usage"
        );
        assert_eq!(
            sink.url_for(OutboxKind::LifecycleCallback),
            "https://market.example/api/v1/callbacks/lifecycle"
        );
    }
}
