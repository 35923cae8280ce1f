use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Webhook Event Types ───────────────────────────────────────

/// A structured security/operational event sent to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// Event type identifier, e.g. "origin_blocked", "denylist_repeat".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// Event-specific details (origin, counts, reasons, ids).
    pub details: serde_json::Value,
}

impl WebhookEvent {
    fn new(event_type: &str, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details,
        }
    }

    /// An origin crossed the failure threshold and was blocked.
    pub fn origin_blocked(
        origin: &str,
        blocked_until: &chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self::new(
            "origin_blocked",
            serde_json::json!({
                "origin": origin,
                "blocked_until": blocked_until.to_rfc3339(),
            }),
        )
    }

    pub fn origin_manually_blocked(origin: &str, reason: &str) -> Self {
        Self::new(
            "origin_manually_blocked",
            serde_json::json!({ "origin": origin, "reason": reason }),
        )
    }

    /// Repeated denylisted attempts from one origin inside the window.
    pub fn denylist_repeat(
        origin: &str,
        resource_id: &str,
        requester_id: &str,
        attempts: u32,
    ) -> Self {
        Self::new(
            "denylist_repeat",
            serde_json::json!({
                "origin": origin,
                "resource_id": resource_id,
                "requester_id": requester_id,
                "attempts": attempts,
            }),
        )
    }

    pub fn credential_revoked(credential_id: &str) -> Self {
        Self::new(
            "credential_revoked",
            serde_json::json!({ "credential_id": credential_id }),
        )
    }

    /// An audit append failed. The decision already returned to the
    /// caller; this is the operational-alerting path.
    pub fn audit_write_failed(error: &str) -> Self {
        Self::new(
            "audit_write_failed",
            serde_json::json!({ "error": error }),
        )
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let result = mac.finalize();
    let bytes = result.into_bytes();
    format!("sha256={}", hex::encode(bytes))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches security events to one or more configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Keygate-Signature header)
/// - Up to 3 retries with exponential back-off (1s → 5s → 25s)
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Keygate-Webhook/1.0")
                .build()
                .expect("failed to build webhook HTTP client"),
        }
    }

    /// Send a signed webhook event to a single URL with retry.
    ///
    /// If `signing_secret` is `Some`, the request body is signed with HMAC-SHA256
    /// and the signature is sent in the `X-Keygate-Signature` header.
    ///
    /// Retries up to 3 times on failure with exponential back-off.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send_signed(
        &self,
        url: &str,
        event: &WebhookEvent,
        signing_secret: Option<&str>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signing_secret.map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5, 25];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-keygate-delivery-id", &delivery_id)
                .header("x-keygate-timestamp", &timestamp)
                .header("x-keygate-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-keygate-signature", sig.as_str());
            }

            let result = req.body(payload.clone()).send().await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivered successfully"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %status,
                        body = %body,
                        "webhook delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error, will retry"
                    );
                }
            }
        }

        // All attempts exhausted
        warn!(
            url,
            event_type = %event.event_type,
            delivery_id = %delivery_id,
            "webhook delivery failed after all retries"
        );
        Err(anyhow::anyhow!(
            "webhook delivery failed after 3 retries: {}",
            url
        ))
    }

    /// Dispatch an event to all configured webhook URLs (fire-and-forget).
    ///
    /// Each URL is attempted independently with retry; failures in one do not block others.
    pub fn dispatch(&self, urls: &[String], signing_secret: Option<&str>, event: WebhookEvent) {
        if urls.is_empty() {
            return;
        }

        let notifier = self.clone();
        let urls = urls.to_vec();
        let secret = signing_secret.map(String::from);

        tokio::spawn(async move {
            for url in &urls {
                if let Err(e) = notifier.send_signed(url, &event, secret.as_deref()).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────
