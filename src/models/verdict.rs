use serde::{Deserialize, Serialize};

/// Terminal state of an access decision. There are no retries inside
/// the engine; a caller may simply re-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictState {
    Granted,
    Denied,
    Blocked,
    Errored,
}

/// Machine-readable reason code attached to every verdict. These are
/// stable identifiers the calling layer localizes — never prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    OriginBlocked,
    InvalidCredential,
    Revoked,
    Expired,
    UsageExceeded,
    OwnerBypass,
    ResourceUnavailable,
    OpenAccess,
    Denylisted,
    Allowlisted,
    NotAllowlisted,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::OriginBlocked => "origin_blocked",
            Reason::InvalidCredential => "invalid_credential",
            Reason::Revoked => "revoked",
            Reason::Expired => "expired",
            Reason::UsageExceeded => "usage_exceeded",
            Reason::OwnerBypass => "owner_bypass",
            Reason::ResourceUnavailable => "resource_unavailable",
            Reason::OpenAccess => "open_access",
            Reason::Denylisted => "denylisted",
            Reason::Allowlisted => "allowlisted",
            Reason::NotAllowlisted => "not_allowlisted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "origin_blocked" => Some(Reason::OriginBlocked),
            "invalid_credential" => Some(Reason::InvalidCredential),
            "revoked" => Some(Reason::Revoked),
            "expired" => Some(Reason::Expired),
            "usage_exceeded" => Some(Reason::UsageExceeded),
            "owner_bypass" => Some(Reason::OwnerBypass),
            "resource_unavailable" => Some(Reason::ResourceUnavailable),
            "open_access" => Some(Reason::OpenAccess),
            "denylisted" => Some(Reason::Denylisted),
            "allowlisted" => Some(Reason::Allowlisted),
            "not_allowlisted" => Some(Reason::NotAllowlisted),
            _ => None,
        }
    }
}

/// The decision returned to the delivery layer. Domain denials are
/// verdicts, not errors — only storage failures propagate as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub state: VerdictState,
    pub reason: Reason,
    /// Uses left on the credential after this decision, when usage-limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_usage: Option<i64>,
}

impl Verdict {
    pub fn granted(reason: Reason, remaining_usage: Option<i64>) -> Self {
        Self {
            state: VerdictState::Granted,
            reason,
            remaining_usage,
        }
    }

    pub fn denied(reason: Reason) -> Self {
        Self {
            state: VerdictState::Denied,
            reason,
            remaining_usage: None,
        }
    }

    pub fn blocked() -> Self {
        Self {
            state: VerdictState::Blocked,
            reason: Reason::OriginBlocked,
            remaining_usage: None,
        }
    }

    pub fn errored(reason: Reason) -> Self {
        Self {
            state: VerdictState::Errored,
            reason,
            remaining_usage: None,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.state == VerdictState::Granted
    }
}
