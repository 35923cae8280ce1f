use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a resource decides who may fetch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Any requester with a valid credential.
    Open,
    /// Per-requester allow/deny lists; unlisted requesters are denied.
    AllowDenyList,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Open => "open",
            AccessMode::AllowDenyList => "allow_deny_list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AccessMode::Open),
            "allow_deny_list" => Some(AccessMode::AllowDenyList),
            _ => None,
        }
    }
}

/// Mutation applied by `set_access`. Inserting into one list always
/// removes the requester from the other, so a requester is never on
/// both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRule {
    Allow,
    Deny,
    Clear,
}

/// Which list a requester was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Allow,
    Deny,
    None,
}

/// Result of a membership check against a resource's lists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Membership {
    pub allowed: bool,
    pub listed: ListKind,
}

/// A protected deliverable. Soft-deleted only (`is_active = false`)
/// so audit entries keep resolving and ids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub owner_credential_id: String,
    pub access_mode: AccessMode,
    pub allow_list: Vec<String>,
    pub deny_list: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn membership(&self, requester_id: &str) -> Membership {
        match self.access_mode {
            AccessMode::Open => Membership {
                allowed: true,
                listed: ListKind::None,
            },
            AccessMode::AllowDenyList => {
                // Deny takes precedence. set_access keeps the lists
                // disjoint, so both lists holding the id is unreachable
                // through the API.
                if self.deny_list.iter().any(|r| r == requester_id) {
                    Membership {
                        allowed: false,
                        listed: ListKind::Deny,
                    }
                } else if self.allow_list.iter().any(|r| r == requester_id) {
                    Membership {
                        allowed: true,
                        listed: ListKind::Allow,
                    }
                } else {
                    Membership {
                        allowed: false,
                        listed: ListKind::None,
                    }
                }
            }
        }
    }
}
