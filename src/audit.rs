//! Append-only audit trail of access decisions.

use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{AuditEntry, AuditQuery};
use crate::notification::{WebhookEvent, WebhookNotifier};
use crate::registry::Registry;
use crate::store::AuditStore;

/// Best-effort writer over an `AuditStore`. A failed append never
/// reaches the caller of an access decision — it is logged and routed
/// to the notification sink instead.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    notifier: WebhookNotifier,
    webhook_urls: Vec<String>,
    webhook_secret: Option<String>,
}

impl AuditLog {
    pub fn new(
        store: Arc<dyn AuditStore>,
        notifier: WebhookNotifier,
        webhook_urls: Vec<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            webhook_urls,
            webhook_secret,
        }
    }

    /// Append one entry. Awaited by the decision path so the usage
    /// increment and its log line land in order, but errors stop here.
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append(&entry).await {
            tracing::error!(
                credential = %entry.credential_id,
                resource = %entry.resource_id,
                reason = entry.reason.as_str(),
                "failed to write audit log: {}",
                e
            );
            self.notifier.dispatch(
                &self.webhook_urls,
                self.webhook_secret.as_deref(),
                WebhookEvent::audit_write_failed(&e.to_string()),
            );
        } else {
            tracing::debug!(
                credential = %entry.credential_id,
                resource = %entry.resource_id,
                reason = entry.reason.as_str(),
                "audit entry recorded"
            );
        }
    }

    /// Ownership-scoped read: the caller must be the credential that
    /// owns the queried resource. Inactive resources still resolve —
    /// their history stays readable.
    pub async fn query(
        &self,
        registry: &Registry,
        caller_id: &str,
        q: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let res = registry
            .get(&q.resource_id)
            .await?
            .ok_or(AppError::ResourceNotFound)?;
        if res.owner_credential_id != caller_id {
            return Err(AppError::NotResourceOwner);
        }
        Ok(self.store.query(q).await?)
    }
}
