pub mod audit;
pub mod credential;
pub mod resource;
pub mod verdict;

pub use audit::{AuditEntry, AuditQuery};
pub use credential::{Credential, CredentialStatus, Plan};
pub use resource::{AccessMode, AccessRule, ListKind, Membership, Resource};
pub use verdict::{Reason, Verdict, VerdictState};
