//! End-to-end decision tests over the in-memory backend: rule
//! precedence, list semantics, usage caps under concurrency, and the
//! full issue/grant/revoke lifecycle.

use std::sync::Arc;

use chrono::Duration;

use keygate::audit::AuditLog;
use keygate::credentials::Credentials;
use keygate::engine::{AccessRequest, DecisionEngine};
use keygate::guard::{GuardConfig, RateAndAbuseGuard};
use keygate::models::{
    AccessMode, AccessRule, AuditQuery, Plan, Reason, VerdictState,
};
use keygate::notification::WebhookNotifier;
use keygate::registry::Registry;
use keygate::store::memory::MemoryStore;

struct Harness {
    store: Arc<MemoryStore>,
    credentials: Credentials,
    registry: Registry,
    guard: Arc<RateAndAbuseGuard>,
    audit: AuditLog,
    engine: DecisionEngine,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = WebhookNotifier::new();
        let guard = Arc::new(RateAndAbuseGuard::new(GuardConfig::default()));
        let credentials = Credentials::new(store.clone());
        let registry = Registry::new(store.clone());
        let audit = AuditLog::new(store.clone(), notifier.clone(), vec![], None);
        let engine = DecisionEngine::new(
            credentials.clone(),
            registry.clone(),
            guard.clone(),
            audit.clone(),
            notifier,
            vec![],
            None,
        );
        Self {
            store,
            credentials,
            registry,
            guard,
            audit,
            engine,
        }
    }

    fn request(credential: &str, resource: &str) -> AccessRequest {
        AccessRequest {
            credential_id: credential.to_string(),
            resource_id: resource.to_string(),
            requester_id: "user-1".to_string(),
            origin: "fp-test".to_string(),
        }
    }
}

#[tokio::test]
async fn open_resource_grants_valid_credential() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Granted);
    assert_eq!(verdict.reason, Reason::OpenAccess);
    assert!(verdict.remaining_usage.is_none());

    // The grant consumed one usage slot.
    let stored = h.credentials.get(&cred.id).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 1);
    assert!(stored.last_used_at.is_some());
}

#[tokio::test]
async fn unknown_credential_errors_not_denies() {
    let h = Harness::new();
    let verdict = h
        .engine
        .decide(&Harness::request("STD-DOES-NOT-EXIST", "res_x"))
        .await
        .unwrap();
    assert_eq!(verdict.state, VerdictState::Errored);
    assert_eq!(verdict.reason, Reason::InvalidCredential);
}

#[tokio::test]
async fn blocked_origin_wins_over_everything() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Owner, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    // Five failures from this origin trip the automatic block.
    for _ in 0..5 {
        let req = AccessRequest {
            origin: "fp-bad".into(),
            ..Harness::request("STD-NOPE", &res.id)
        };
        h.engine.decide(&req).await.unwrap();
    }

    // Even a valid owner credential from that origin is now blocked,
    // before any credential lookup happens.
    let req = AccessRequest {
        origin: "fp-bad".into(),
        ..Harness::request(&cred.id, &res.id)
    };
    let verdict = h.engine.decide(&req).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Blocked);
    assert_eq!(verdict.reason, Reason::OriginBlocked);

    // No usage was consumed while blocked.
    let stored = h.credentials.get(&cred.id).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 0);
}

#[tokio::test]
async fn revocation_wins_over_expiry_and_usage() {
    let h = Harness::new();
    // Already expired and exhausted, then revoked on top.
    let cred = h
        .credentials
        .issue(Plan::Trial, Some(1), Some(Duration::milliseconds(1)))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    h.credentials.revoke(&cred.id).await.unwrap();

    let verdict = h.engine.decide(&Harness::request(&cred.id, "res_x")).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Denied);
    assert_eq!(verdict.reason, Reason::Revoked);
}

#[tokio::test]
async fn expiry_wins_over_usage_cap() {
    let h = Harness::new();
    let cred = h
        .credentials
        .issue(Plan::Trial, Some(1), Some(Duration::milliseconds(1)))
        .await
        .unwrap();
    // The key is both capped at one use and already expired; the
    // verdict must say expired, not usage_exceeded.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let verdict = h.engine.decide(&Harness::request(&cred.id, "res_x")).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Denied);
    assert_eq!(verdict.reason, Reason::Expired);
}

#[tokio::test]
async fn owner_plan_bypasses_resource_rules() {
    let h = Harness::new();
    let owner = h.credentials.issue(Plan::Owner, None, None).await.unwrap();
    let creator = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h
        .registry
        .create(&creator.id, AccessMode::AllowDenyList)
        .await
        .unwrap();
    // Owner requester is explicitly denylisted; the plan still wins.
    h.registry
        .set_access(&res.id, "user-1", AccessRule::Deny, &creator.id)
        .await
        .unwrap();

    let verdict = h.engine.decide(&Harness::request(&owner.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Granted);
    assert_eq!(verdict.reason, Reason::OwnerBypass);
}

#[tokio::test]
async fn inactive_resource_is_unavailable() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();
    h.registry.deactivate(&res.id, &cred.id).await.unwrap();

    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Errored);
    assert_eq!(verdict.reason, Reason::ResourceUnavailable);
}

#[tokio::test]
async fn deny_beats_allow_mode_and_allow_beats_absence() {
    let h = Harness::new();
    let owner = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h
        .registry
        .create(&owner.id, AccessMode::AllowDenyList)
        .await
        .unwrap();

    // Not listed at all: list mode denies.
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.reason, Reason::NotAllowlisted);

    // Allowlisted: grant.
    h.registry
        .set_access(&res.id, "user-1", AccessRule::Allow, &owner.id)
        .await
        .unwrap();
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Granted);
    assert_eq!(verdict.reason, Reason::Allowlisted);

    // Moved to the deny list: the allow entry is gone and deny wins.
    h.registry
        .set_access(&res.id, "user-1", AccessRule::Deny, &owner.id)
        .await
        .unwrap();
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Denied);
    assert_eq!(verdict.reason, Reason::Denylisted);
}

#[tokio::test]
async fn open_mode_ignores_lists_entirely() {
    let h = Harness::new();
    let owner = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&owner.id, AccessMode::Open).await.unwrap();
    // A stale deny entry has no effect while the mode is open.
    h.registry
        .set_access(&res.id, "user-1", AccessRule::Deny, &owner.id)
        .await
        .unwrap();

    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Granted);
    assert_eq!(verdict.reason, Reason::OpenAccess);
}

#[tokio::test]
async fn usage_cap_holds_under_concurrency() {
    for cap in [1_i64, 5, 50] {
        let h = Harness::new();
        let cred = h
            .credentials
            .issue(Plan::Standard, Some(cap), None)
            .await
            .unwrap();
        let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

        let engine = Arc::new(h.engine);
        let mut handles = Vec::new();
        for i in 0..(cap as usize + 20) {
            let engine = engine.clone();
            let cred_id = cred.id.clone();
            let res_id = res.id.clone();
            handles.push(tokio::spawn(async move {
                let req = AccessRequest {
                    credential_id: cred_id,
                    resource_id: res_id,
                    requester_id: format!("user-{i}"),
                    origin: "fp-concurrent".into(),
                };
                engine.decide(&req).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_granted() {
                granted += 1;
            }
        }
        assert_eq!(granted as i64, cap, "cap {cap} over-granted");

        let stored = h.credentials.get(&cred.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, cap);
    }
}

#[tokio::test]
async fn remaining_usage_counts_down() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, Some(3), None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    for expected in [2_i64, 1, 0] {
        let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
        assert!(verdict.is_granted());
        assert_eq!(verdict.remaining_usage, Some(expected));
    }

    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Denied);
    assert_eq!(verdict.reason, Reason::UsageExceeded);
}

#[tokio::test]
async fn grant_binds_origin_to_credential() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();

    let stored = h.credentials.get(&cred.id).await.unwrap().unwrap();
    assert_eq!(stored.origin_bindings, vec!["fp-test"]);
}

#[tokio::test]
async fn every_verdict_is_audited() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    h.engine
        .decide(&Harness::request("STD-NOPE", &res.id))
        .await
        .unwrap();
    h.credentials.revoke(&cred.id).await.unwrap();
    h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();

    assert_eq!(h.store.audit_len(), 3);

    // The owning credential reads back its resource's history,
    // newest first.
    let entries = h
        .audit
        .query(&h.registry, &cred.id, &AuditQuery::for_resource(&res.id))
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].reason, Reason::Revoked);
    assert_eq!(entries[2].reason, Reason::OpenAccess);
}

#[tokio::test]
async fn audit_reads_are_owner_scoped() {
    let h = Harness::new();
    let owner = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let other = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&owner.id, AccessMode::Open).await.unwrap();

    let q = AuditQuery::for_resource(&res.id);
    assert!(h.audit.query(&h.registry, &owner.id, &q).await.is_ok());
    assert!(h.audit.query(&h.registry, &other.id, &q).await.is_err());
}

#[tokio::test]
async fn trial_lifecycle_issue_grant_revoke() {
    let h = Harness::new();

    // Self-serve trial key, 30-day validity.
    let cred = h.credentials.issue(Plan::Trial, None, None).await.unwrap();
    assert!(cred.id.starts_with("TRL-"));
    assert_eq!(cred.expires_at - cred.created_at, Duration::days(30));
    h.credentials.validate(&cred.id).await.unwrap();

    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert!(verdict.is_granted());

    // Revocation takes effect on the very next decision and sticks.
    h.credentials.revoke(&cred.id).await.unwrap();
    h.credentials.revoke(&cred.id).await.unwrap();
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert_eq!(verdict.state, VerdictState::Denied);
    assert_eq!(verdict.reason, Reason::Revoked);
}

#[tokio::test]
async fn successful_grant_clears_failure_streak() {
    let h = Harness::new();
    let cred = h.credentials.issue(Plan::Standard, None, None).await.unwrap();
    let res = h.registry.create(&cred.id, AccessMode::Open).await.unwrap();

    // Four failures, one short of the threshold.
    for _ in 0..4 {
        h.engine
            .decide(&Harness::request("STD-NOPE", &res.id))
            .await
            .unwrap();
    }
    // A grant from the same origin resets the counter.
    let verdict = h.engine.decide(&Harness::request(&cred.id, &res.id)).await.unwrap();
    assert!(verdict.is_granted());

    // Four more failures still do not block.
    for _ in 0..4 {
        h.engine
            .decide(&Harness::request("STD-NOPE", &res.id))
            .await
            .unwrap();
    }
    assert!(!h.guard.is_blocked("fp-test"));
}
