pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccessRule, AuditEntry, AuditQuery, Credential, Resource};

/// Storage-layer failures. Domain outcomes (`NotFound`,
/// `UsageLimitExceeded`, `DuplicateId`) are distinct from `Backend` so
/// callers can tell "access denied" apart from "system unavailable".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate id")]
    DuplicateId,

    #[error("usage limit exceeded")]
    UsageLimitExceeded,

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

/// Persistence contract for credential records.
///
/// Implementations: `PgStore` (Postgres via sqlx), `MemoryStore`
/// (DashMap, used in tests and single-node deployments).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a freshly issued credential. Fails `DuplicateId` if the
    /// generated id already exists (caller retries with a new id).
    async fn insert_credential(&self, cred: &Credential) -> Result<(), StoreError>;

    /// Pure lookup; never mutates, expiry is computed by the caller.
    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    /// Atomically bump the usage counter, honoring `max_usage`.
    ///
    /// Must be linearizable per id: two concurrent callers racing for
    /// the last slot of a usage-limited key must not both succeed.
    /// Also the lazy write-path expiry transition (active → expired)
    /// and the advisory origin binding live here. Returns the updated
    /// record.
    async fn record_usage(&self, id: &str, origin: Option<&str>)
        -> Result<Credential, StoreError>;

    /// Mark revoked. Idempotent — revoking twice is not an error.
    async fn revoke_credential(&self, id: &str) -> Result<(), StoreError>;
}

/// Persistence contract for protected-resource records.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    async fn insert_resource(&self, res: &Resource) -> Result<(), StoreError>;

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>, StoreError>;

    /// Apply an allow/deny/clear rule for one requester. Insertion into
    /// one list removes the requester from the other in the same
    /// statement, so the lists stay disjoint under concurrency.
    async fn set_access(
        &self,
        resource_id: &str,
        requester_id: &str,
        rule: AccessRule,
    ) -> Result<(), StoreError>;

    /// Soft delete — the row survives for audit resolution.
    async fn deactivate_resource(&self, id: &str) -> Result<(), StoreError>;
}

/// Append-only audit persistence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Newest-first page of entries matching the filters.
    async fn query(&self, q: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError>;
}
