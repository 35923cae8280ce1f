//! Credential issuance and lifecycle on top of a `CredentialStore`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;

use crate::errors::AppError;
use crate::models::{Credential, CredentialStatus, Plan};
use crate::store::{CredentialStore, StoreError};

/// Retries on id collision before giving up. With 128 bits of entropy
/// a single retry should never be observed in practice.
const MAX_ISSUE_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
}

impl Credentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Issue a new key under `plan`. `duration_override` replaces the
    /// plan's default validity period; `max_usage` of None means
    /// unlimited.
    pub async fn issue(
        &self,
        plan: Plan,
        max_usage: Option<i64>,
        duration_override: Option<Duration>,
    ) -> Result<Credential, AppError> {
        if max_usage.is_some_and(|m| m <= 0) {
            return Err(AppError::InvalidRequest(
                "max_usage must be positive".into(),
            ));
        }
        let duration = duration_override.unwrap_or_else(|| plan.duration());
        if duration <= Duration::zero() {
            return Err(AppError::InvalidRequest(
                "duration must be positive".into(),
            ));
        }

        let mut last_err = StoreError::DuplicateId;
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let now = Utc::now();
            let cred = Credential {
                id: generate_key(plan),
                plan,
                status: CredentialStatus::Active,
                created_at: now,
                expires_at: now + duration,
                usage_count: 0,
                max_usage,
                origin_bindings: vec![],
                last_used_at: None,
            };
            match self.store.insert_credential(&cred).await {
                Ok(()) => {
                    tracing::info!(id = %cred.id, plan = plan.as_str(), "credential issued");
                    return Ok(cred);
                }
                Err(StoreError::DuplicateId) => {
                    tracing::warn!(id = %cred.id, "key id collision, regenerating");
                    last_err = StoreError::DuplicateId;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.into())
    }

    /// Pure lookup plus state check. Does not mutate — expiry is
    /// computed against the clock, not swept.
    pub async fn validate(&self, id: &str) -> Result<Credential, AppError> {
        let cred = self
            .store
            .get_credential(id)
            .await?
            .ok_or(AppError::CredentialNotFound)?;

        match cred.status {
            CredentialStatus::Revoked => Err(AppError::CredentialRevoked),
            _ if cred.is_expired(Utc::now()) => Err(AppError::CredentialExpired),
            _ => Ok(cred),
        }
    }

    /// Raw lookup without the state check, for owner resolution and
    /// admin inspection.
    pub async fn get(&self, id: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.store.get_credential(id).await?)
    }

    pub async fn record_usage(
        &self,
        id: &str,
        origin: Option<&str>,
    ) -> Result<Credential, StoreError> {
        self.store.record_usage(id, origin).await
    }

    /// Idempotent; revoking an already revoked key succeeds.
    pub async fn revoke(&self, id: &str) -> Result<(), AppError> {
        match self.store.revoke_credential(id).await {
            Ok(()) => {
                tracing::info!(id, "credential revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AppError::CredentialNotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// Generate a key id: plan tag plus 128 bits of entropy rendered as
/// eight 4-hex-char segments, e.g. `TRL-9F2A-03BC-...`.
fn generate_key(plan: Plan) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);

    let mut id = String::with_capacity(4 + 8 * 5);
    id.push_str(plan.key_prefix());
    for chunk in bytes.chunks(2) {
        id.push('-');
        id.push_str(&hex::encode_upper(chunk));
    }
    id
}
