use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan attached to a credential.
///
/// `Owner` is a sentinel plan that bypasses resource checks entirely.
/// It is issued through the same path as every other plan — there is
/// no magic key string anywhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Trial,
    Standard,
    Premium,
    Owner,
}

impl Plan {
    /// Tag prefixed to generated key ids, e.g. `TRL-9F2A-...`.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Plan::Trial => "TRL",
            Plan::Standard => "STD",
            Plan::Premium => "PRM",
            Plan::Owner => "OWN",
        }
    }

    /// Default validity period for keys issued under this plan.
    /// Owner keys get 10 years, which is non-expiring for practical purposes.
    pub fn duration(&self) -> Duration {
        match self {
            Plan::Trial => Duration::days(30),
            Plan::Standard | Plan::Premium => Duration::days(365),
            Plan::Owner => Duration::days(3650),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Standard => "standard",
            Plan::Premium => "premium",
            Plan::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(Plan::Trial),
            "standard" => Some(Plan::Standard),
            "premium" => Some(Plan::Premium),
            "owner" => Some(Plan::Owner),
            _ => None,
        }
    }
}

/// Persisted credential state. `Expired` is derived from `expires_at`
/// and only written lazily on the write path; `Revoked` is explicit
/// and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Revoked,
    Expired,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Revoked => "revoked",
            CredentialStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "revoked" => Some(CredentialStatus::Revoked),
            "expired" => Some(CredentialStatus::Expired),
            _ => None,
        }
    }
}

/// An issued access key. Records are never deleted — revocation and
/// expiry are status transitions so the audit trail stays intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub plan: Plan,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub usage_count: i64,
    /// None = unlimited.
    pub max_usage: Option<i64>,
    /// First-use origin fingerprints, advisory only. Grows monotonically.
    pub origin_bindings: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Expiry is computed at read time; reads never mutate `status`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CredentialStatus::Expired || now > self.expires_at
    }

    pub fn usage_exhausted(&self) -> bool {
        self.max_usage.is_some_and(|max| self.usage_count >= max)
    }

    /// Remaining uses, or None for unlimited keys.
    pub fn remaining_usage(&self) -> Option<i64> {
        self.max_usage.map(|max| (max - self.usage_count).max(0))
    }
}
