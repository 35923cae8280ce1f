use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::verdict::{Reason, Verdict, VerdictState};

/// One access attempt, written for every verdict including Errored.
/// Immutable once appended; the log is ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub resource_id: String,
    pub requester_id: String,
    pub credential_id: String,
    pub verdict: VerdictState,
    pub reason: Reason,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_verdict(
        verdict: &Verdict,
        credential_id: &str,
        resource_id: &str,
        requester_id: &str,
        origin: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.to_string(),
            requester_id: requester_id.to_string(),
            credential_id: credential_id.to_string(),
            verdict: verdict.state,
            reason: verdict.reason,
            origin: origin.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Filters for ownership-scoped audit reads. `resource_id` is required
/// because reads are scoped to the resource's owning credential.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    pub resource_id: String,
    pub requester_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl AuditQuery {
    pub fn for_resource(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            requester_id: None,
            since: None,
            until: None,
            limit: default_limit(),
            offset: 0,
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if entry.resource_id != self.resource_id {
            return false;
        }
        if let Some(ref requester) = self.requester_id {
            if entry.requester_id != *requester {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}
