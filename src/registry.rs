//! Resource management on top of a `ResourceRegistry` store.
//!
//! Ownership is strict: only the credential that created a resource
//! may mutate it. There are no roles and no inheritance.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AccessMode, AccessRule, Membership, Resource};
use crate::store::{ResourceRegistry, StoreError};

#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn ResourceRegistry>,
}

impl Registry {
    pub fn new(store: Arc<dyn ResourceRegistry>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        owner_credential_id: &str,
        access_mode: AccessMode,
    ) -> Result<Resource, AppError> {
        let res = Resource {
            id: format!("res_{}", Uuid::new_v4().simple()),
            owner_credential_id: owner_credential_id.to_string(),
            access_mode,
            allow_list: vec![],
            deny_list: vec![],
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_resource(&res).await?;
        tracing::info!(id = %res.id, owner = owner_credential_id, mode = access_mode.as_str(), "resource created");
        Ok(res)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Resource>, AppError> {
        Ok(self.store.get_resource(id).await?)
    }

    /// Apply an allow/deny/clear rule. The caller must be the owning
    /// credential; the owner never changes, so the check does not race
    /// with the update.
    pub async fn set_access(
        &self,
        resource_id: &str,
        requester_id: &str,
        rule: AccessRule,
        caller_id: &str,
    ) -> Result<(), AppError> {
        self.require_owner(resource_id, caller_id).await?;
        match self.store.set_access(resource_id, requester_id, rule).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AppError::ResourceNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn check_membership(
        &self,
        resource_id: &str,
        requester_id: &str,
    ) -> Result<Membership, AppError> {
        let res = self
            .store
            .get_resource(resource_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or(AppError::ResourceNotFound)?;
        Ok(res.membership(requester_id))
    }

    /// Soft delete. The record stays so audit entries keep resolving.
    pub async fn deactivate(&self, resource_id: &str, caller_id: &str) -> Result<(), AppError> {
        self.require_owner(resource_id, caller_id).await?;
        match self.store.deactivate_resource(resource_id).await {
            Ok(()) => {
                tracing::info!(id = resource_id, "resource deactivated");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AppError::ResourceNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn require_owner(&self, resource_id: &str, caller_id: &str) -> Result<(), AppError> {
        let res = self
            .store
            .get_resource(resource_id)
            .await?
            .ok_or(AppError::ResourceNotFound)?;
        if res.owner_credential_id != caller_id {
            return Err(AppError::NotResourceOwner);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListKind;
    use crate::store::memory::MemoryStore;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn only_owner_may_mutate() {
        let reg = registry();
        let res = reg.create("OWN-A", AccessMode::AllowDenyList).await.unwrap();

        let err = reg
            .set_access(&res.id, "u1", AccessRule::Allow, "OWN-B")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotResourceOwner));

        reg.set_access(&res.id, "u1", AccessRule::Allow, "OWN-A")
            .await
            .unwrap();
        let m = reg.check_membership(&res.id, "u1").await.unwrap();
        assert!(m.allowed);
        assert_eq!(m.listed, ListKind::Allow);
    }

    #[tokio::test]
    async fn requester_never_on_both_lists() {
        let reg = registry();
        let res = reg.create("OWN-A", AccessMode::AllowDenyList).await.unwrap();

        for rule in [
            AccessRule::Allow,
            AccessRule::Deny,
            AccessRule::Allow,
            AccessRule::Deny,
        ] {
            reg.set_access(&res.id, "u1", rule, "OWN-A").await.unwrap();
            let current = reg.get(&res.id).await.unwrap().unwrap();
            let on_allow = current.allow_list.iter().filter(|r| *r == "u1").count();
            let on_deny = current.deny_list.iter().filter(|r| *r == "u1").count();
            assert!(on_allow + on_deny <= 1, "requester listed more than once");
        }
    }

    #[tokio::test]
    async fn deactivate_is_soft() {
        let reg = registry();
        let res = reg.create("OWN-A", AccessMode::Open).await.unwrap();
        reg.deactivate(&res.id, "OWN-A").await.unwrap();

        // Record still resolves; membership checks treat it as gone.
        let stored = reg.get(&res.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(matches!(
            reg.check_membership(&res.id, "u1").await,
            Err(AppError::ResourceNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.set_access("res_missing", "u1", AccessRule::Allow, "OWN-A")
                .await,
            Err(AppError::ResourceNotFound)
        ));
    }
}
