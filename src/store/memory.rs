use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::{
    AccessRule, AuditEntry, AuditQuery, Credential, CredentialStatus, Resource,
};
use crate::store::{AuditStore, CredentialStore, ResourceRegistry, StoreError};

/// In-memory backend over DashMap. The per-entry shard lock makes
/// `record_usage` a serialized check-and-increment, which is the
/// linearizability the usage counter needs.
///
/// Used by the test suite and viable for single-node deployments where
/// durability is not required.
#[derive(Default)]
pub struct MemoryStore {
    credentials: DashMap<String, Credential>,
    resources: DashMap<String, Resource>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of audit entries ever written. Test hook.
    pub fn audit_len(&self) -> usize {
        self.audit.lock().expect("audit log poisoned").len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_credential(&self, cred: &Credential) -> Result<(), StoreError> {
        match self.credentials.entry(cred.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId),
            Entry::Vacant(slot) => {
                slot.insert(cred.clone());
                Ok(())
            }
        }
    }

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.get(id).map(|c| c.clone()))
    }

    async fn record_usage(
        &self,
        id: &str,
        origin: Option<&str>,
    ) -> Result<Credential, StoreError> {
        // get_mut holds the shard lock for the whole check-and-bump.
        let mut entry = self.credentials.get_mut(id).ok_or(StoreError::NotFound)?;
        let now = Utc::now();

        // Lazy write-path expiry transition; reads never do this.
        if entry.status == CredentialStatus::Active && now > entry.expires_at {
            entry.status = CredentialStatus::Expired;
        }

        if let Some(max) = entry.max_usage {
            if entry.usage_count >= max {
                return Err(StoreError::UsageLimitExceeded);
            }
        }

        entry.usage_count += 1;
        entry.last_used_at = Some(now);
        if let Some(fp) = origin {
            if !entry.origin_bindings.iter().any(|b| b == fp) {
                entry.origin_bindings.push(fp.to_string());
            }
        }
        Ok(entry.clone())
    }

    async fn revoke_credential(&self, id: &str) -> Result<(), StoreError> {
        let mut entry = self.credentials.get_mut(id).ok_or(StoreError::NotFound)?;
        entry.status = CredentialStatus::Revoked;
        Ok(())
    }
}

#[async_trait]
impl ResourceRegistry for MemoryStore {
    async fn insert_resource(&self, res: &Resource) -> Result<(), StoreError> {
        match self.resources.entry(res.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId),
            Entry::Vacant(slot) => {
                slot.insert(res.clone());
                Ok(())
            }
        }
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.resources.get(id).map(|r| r.clone()))
    }

    async fn set_access(
        &self,
        resource_id: &str,
        requester_id: &str,
        rule: AccessRule,
    ) -> Result<(), StoreError> {
        let mut res = self
            .resources
            .get_mut(resource_id)
            .ok_or(StoreError::NotFound)?;

        res.allow_list.retain(|r| r != requester_id);
        res.deny_list.retain(|r| r != requester_id);
        match rule {
            AccessRule::Allow => res.allow_list.push(requester_id.to_string()),
            AccessRule::Deny => res.deny_list.push(requester_id.to_string()),
            AccessRule::Clear => {}
        }
        Ok(())
    }

    async fn deactivate_resource(&self, id: &str) -> Result<(), StoreError> {
        let mut res = self.resources.get_mut(id).ok_or(StoreError::NotFound)?;
        res.is_active = false;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.audit
            .lock()
            .expect("audit log poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn query(&self, q: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let log = self.audit.lock().expect("audit log poisoned");
        let mut matched: Vec<AuditEntry> =
            log.iter().filter(|e| q.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched
            .into_iter()
            .skip(q.offset.max(0) as usize)
            .take(q.limit.max(0) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::{AccessMode, Plan};

    fn credential(id: &str, max_usage: Option<i64>) -> Credential {
        let now = Utc::now();
        Credential {
            id: id.into(),
            plan: Plan::Standard,
            status: CredentialStatus::Active,
            created_at: now,
            expires_at: now + Duration::days(365),
            usage_count: 0,
            max_usage,
            origin_bindings: vec![],
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let cred = credential("STD-DUP", None);
        store.insert_credential(&cred).await.unwrap();
        let err = store.insert_credential(&cred).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId));
    }

    #[tokio::test]
    async fn record_usage_enforces_max() {
        let store = MemoryStore::new();
        store
            .insert_credential(&credential("STD-CAP", Some(2)))
            .await
            .unwrap();

        store.record_usage("STD-CAP", None).await.unwrap();
        let updated = store.record_usage("STD-CAP", None).await.unwrap();
        assert_eq!(updated.usage_count, 2);

        let err = store.record_usage("STD-CAP", None).await.unwrap_err();
        assert!(matches!(err, StoreError::UsageLimitExceeded));
    }

    #[tokio::test]
    async fn record_usage_binds_origin_once() {
        let store = MemoryStore::new();
        store
            .insert_credential(&credential("STD-FP", None))
            .await
            .unwrap();

        store.record_usage("STD-FP", Some("fp-a")).await.unwrap();
        store.record_usage("STD-FP", Some("fp-a")).await.unwrap();
        let updated = store.record_usage("STD-FP", Some("fp-b")).await.unwrap();
        assert_eq!(updated.origin_bindings, vec!["fp-a", "fp-b"]);
    }

    #[tokio::test]
    async fn record_usage_flips_expired_status_on_write() {
        let store = MemoryStore::new();
        let mut cred = credential("STD-OLD", None);
        cred.expires_at = Utc::now() - Duration::seconds(1);
        store.insert_credential(&cred).await.unwrap();

        // Read path leaves the stale status alone.
        let read = store.get_credential("STD-OLD").await.unwrap().unwrap();
        assert_eq!(read.status, CredentialStatus::Active);

        let updated = store.record_usage("STD-OLD", None).await.unwrap();
        assert_eq!(updated.status, CredentialStatus::Expired);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryStore::new();
        store
            .insert_credential(&credential("STD-REV", None))
            .await
            .unwrap();

        store.revoke_credential("STD-REV").await.unwrap();
        store.revoke_credential("STD-REV").await.unwrap();
        let cred = store.get_credential("STD-REV").await.unwrap().unwrap();
        assert_eq!(cred.status, CredentialStatus::Revoked);
    }

    #[tokio::test]
    async fn set_access_keeps_lists_disjoint() {
        let store = MemoryStore::new();
        let res = Resource {
            id: "res_1".into(),
            owner_credential_id: "OWN-1".into(),
            access_mode: AccessMode::AllowDenyList,
            allow_list: vec![],
            deny_list: vec![],
            is_active: true,
            created_at: Utc::now(),
        };
        store.insert_resource(&res).await.unwrap();

        store.set_access("res_1", "u1", AccessRule::Deny).await.unwrap();
        store.set_access("res_1", "u1", AccessRule::Allow).await.unwrap();

        let res = store.get_resource("res_1").await.unwrap().unwrap();
        assert_eq!(res.allow_list, vec!["u1"]);
        assert!(res.deny_list.is_empty());

        store.set_access("res_1", "u1", AccessRule::Clear).await.unwrap();
        let res = store.get_resource("res_1").await.unwrap().unwrap();
        assert!(res.allow_list.is_empty());
        assert!(res.deny_list.is_empty());
    }
}
