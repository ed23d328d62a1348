//! Outgoing webhook subscriber.
//!
//! POSTs `{event_name, version, timestamp, data}` as JSON. When a secret is
//! configured the body is signed with HMAC-SHA256 and the hex digest sent in
//! `X-Sublarr-Signature`. Retries with exponential backoff on 429/5xx and
//! network errors; ten consecutive failed deliveries auto-disable a webhook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::store::{HookStore, WebhookConfig};

use super::bus::{EventEnvelope, EventSubscriber};
use super::catalog::event_def;

type HmacSha256 = Hmac<Sha256>;

/// Backoff schedule between delivery attempts.
const BACKOFF_SECS: &[u64] = &[2, 4, 8];

pub struct WebhookSubscriber {
    store: HookStore,
    client: reqwest::Client,
    /// Shrinks backoff sleeps in tests.
    backoff_scale_ms: u64,
}

impl WebhookSubscriber {
    pub fn new(store: HookStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            backoff_scale_ms: 1000,
        })
    }

    #[cfg(test)]
    pub fn with_fast_backoff(store: HookStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            backoff_scale_ms: 1,
        })
    }

    async fn deliver_one(&self, webhook: &WebhookConfig, event: &EventEnvelope) {
        let version = event_def(&event.name).map(|d| d.version).unwrap_or(1);
        let body = serde_json::json!({
            "event_name": event.name,
            "version": version,
            "timestamp": event.timestamp.to_rfc3339(),
            "data": event.payload,
        });
        let body_bytes = body.to_string();

        let signature = webhook
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| sign_body(secret, body_bytes.as_bytes()));

        let max_attempts = (webhook.retry_count as usize).min(BACKOFF_SECS.len()) + 1;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = BACKOFF_SECS[attempt - 1] * self.backoff_scale_ms;
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let mut request = self
                .client
                .post(&webhook.url)
                .header("content-type", "application/json")
                .header("X-Sublarr-Event", &event.name)
                .body(body_bytes.clone());

            if let Some(sig) = &signature {
                request = request.header("X-Sublarr-Signature", format!("sha256={}", sig));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let _ = self.store.record_webhook_result(webhook.id, true);
                        tracing::debug!(
                            webhook = webhook.id,
                            event = %event.name,
                            "Webhook delivered"
                        );
                        return;
                    }
                    // Retry only on 429 and 5xx
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    last_error = format!("HTTP {}", status);
                    if !retryable {
                        break;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
        }

        let disabled = self
            .store
            .record_webhook_result(webhook.id, false)
            .unwrap_or(false);
        tracing::warn!(
            webhook = webhook.id,
            event = %event.name,
            error = %last_error,
            auto_disabled = disabled,
            "Webhook delivery failed"
        );
    }
}

/// HMAC-SHA256 hex digest of the body.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Verify a signature against a body; used by tests and inbound validation.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected: Vec<u8> = match hex_decode(signature_hex) {
        Some(bytes) => bytes,
        None => return false,
    };
    mac.verify_slice(&expected).is_ok()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[async_trait]
impl EventSubscriber for WebhookSubscriber {
    fn name(&self) -> &str {
        "webhooks"
    }

    fn wants(&self, event_name: &str) -> bool {
        event_name != "hook_executed"
    }

    async fn deliver(&self, event: &EventEnvelope) {
        let webhooks = match self.store.webhooks_for_event(&event.name) {
            Ok(webhooks) => webhooks,
            Err(e) => {
                tracing::error!("Failed to load webhooks: {}", e);
                return;
            }
        };

        for webhook in webhooks {
            self.deliver_one(&webhook, event).await;
        }
    }
}
