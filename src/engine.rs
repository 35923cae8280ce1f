//! The access-decision engine.
//!
//! Evaluates the decision rules in a strict order — the order is a
//! contract, not an implementation detail: a blocked origin must win
//! over a bad credential, a revocation over an expiry, an expiry over
//! a usage cap, and the owner plan over every resource rule.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditLog;
use crate::credentials::Credentials;
use crate::errors::AppError;
use crate::guard::RateAndAbuseGuard;
use crate::models::{
    AuditEntry, CredentialStatus, ListKind, Plan, Reason, Verdict,
};
use crate::notification::{WebhookEvent, WebhookNotifier};
use crate::registry::Registry;
use crate::store::StoreError;

/// One inbound access request as seen by the engine.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub credential_id: String,
    pub resource_id: String,
    pub requester_id: String,
    /// Stable fingerprint of the requesting network origin.
    pub origin: String,
}

pub struct DecisionEngine {
    credentials: Credentials,
    registry: Registry,
    guard: Arc<RateAndAbuseGuard>,
    audit: AuditLog,
    notifier: WebhookNotifier,
    webhook_urls: Vec<String>,
    webhook_secret: Option<String>,
}

impl DecisionEngine {
    pub fn new(
        credentials: Credentials,
        registry: Registry,
        guard: Arc<RateAndAbuseGuard>,
        audit: AuditLog,
        notifier: WebhookNotifier,
        webhook_urls: Vec<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            credentials,
            registry,
            guard,
            audit,
            notifier,
            webhook_urls,
            webhook_secret,
        }
    }

    /// Decide whether `req` may access its resource.
    ///
    /// Domain denials come back as a `Verdict`; only storage failures
    /// surface as errors. Every verdict, including Errored, is written
    /// to the audit log before returning.
    pub async fn decide(&self, req: &AccessRequest) -> Result<Verdict, AppError> {
        let verdict = self.evaluate(req).await?;

        self.bookkeep(req, &verdict);

        let entry = AuditEntry::from_verdict(
            &verdict,
            &req.credential_id,
            &req.resource_id,
            &req.requester_id,
            &req.origin,
        );
        self.audit.record(entry).await;

        tracing::info!(
            credential = %req.credential_id,
            resource = %req.resource_id,
            requester = %req.requester_id,
            origin = %req.origin,
            verdict = ?verdict.state,
            reason = verdict.reason.as_str(),
            "access decision"
        );

        Ok(verdict)
    }

    async fn evaluate(&self, req: &AccessRequest) -> Result<Verdict, AppError> {
        // 1. Blocked origins short-circuit before any credential work.
        if self.guard.is_blocked(&req.origin) {
            return Ok(Verdict::blocked());
        }

        // 2–5. Credential checks, in precedence order.
        let Some(cred) = self.credentials.get(&req.credential_id).await? else {
            return Ok(Verdict::errored(Reason::InvalidCredential));
        };
        if cred.status == CredentialStatus::Revoked {
            return Ok(Verdict::denied(Reason::Revoked));
        }
        if cred.is_expired(Utc::now()) {
            return Ok(Verdict::denied(Reason::Expired));
        }
        if cred.usage_exhausted() {
            return Ok(Verdict::denied(Reason::UsageExceeded));
        }

        // 6. Owner plan bypasses resource checks entirely.
        if cred.plan == Plan::Owner {
            return self.grant(req, Reason::OwnerBypass).await;
        }

        // 7. Resource must exist and be active.
        let resource = self
            .registry
            .get(&req.resource_id)
            .await?
            .filter(|r| r.is_active);
        let Some(resource) = resource else {
            return Ok(Verdict::errored(Reason::ResourceUnavailable));
        };

        // 8–9. Access mode and list membership.
        let membership = resource.membership(&req.requester_id);
        match membership.listed {
            ListKind::Deny => Ok(Verdict::denied(Reason::Denylisted)),
            ListKind::Allow => self.grant(req, Reason::Allowlisted).await,
            ListKind::None if membership.allowed => self.grant(req, Reason::OpenAccess).await,
            ListKind::None => Ok(Verdict::denied(Reason::NotAllowlisted)),
        }
    }

    /// 10. Commit the grant by recording usage. A concurrent request
    /// may have taken the last slot between the read and this write;
    /// the store's atomic check downgrades that race to a denial.
    async fn grant(&self, req: &AccessRequest, reason: Reason) -> Result<Verdict, AppError> {
        match self
            .credentials
            .record_usage(&req.credential_id, Some(&req.origin))
            .await
        {
            Ok(updated) => Ok(Verdict::granted(reason, updated.remaining_usage())),
            Err(StoreError::UsageLimitExceeded) => Ok(Verdict::denied(Reason::UsageExceeded)),
            Err(StoreError::NotFound) => Ok(Verdict::errored(Reason::InvalidCredential)),
            Err(e) => Err(e.into()),
        }
    }

    /// Guard counters and security events, driven by the verdict.
    fn bookkeep(&self, req: &AccessRequest, verdict: &Verdict) {
        match verdict.reason {
            // Credential-validation failures feed the block counter.
            Reason::InvalidCredential | Reason::Revoked | Reason::Expired => {
                if let Some(blocked_until) = self.guard.record_failure(&req.origin) {
                    self.notifier.dispatch(
                        &self.webhook_urls,
                        self.webhook_secret.as_deref(),
                        WebhookEvent::origin_blocked(&req.origin, &blocked_until),
                    );
                }
            }
            Reason::Denylisted => {
                if let Some(attempts) = self.guard.note_denylisted(&req.origin) {
                    tracing::warn!(
                        origin = %req.origin,
                        resource = %req.resource_id,
                        requester = %req.requester_id,
                        attempts,
                        "repeated denylisted attempts"
                    );
                    self.notifier.dispatch(
                        &self.webhook_urls,
                        self.webhook_secret.as_deref(),
                        WebhookEvent::denylist_repeat(
                            &req.origin,
                            &req.resource_id,
                            &req.requester_id,
                            attempts,
                        ),
                    );
                }
            }
            _ => {}
        }

        if verdict.is_granted() {
            self.guard.record_success(&req.origin);
        }
    }
}
