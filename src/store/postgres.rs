use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    AccessMode, AccessRule, AuditEntry, AuditQuery, Credential, CredentialStatus, Plan,
    Reason, Resource, VerdictState,
};
use crate::store::{AuditStore, CredentialStore, ResourceRegistry, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_credential(&self, cred: &Credential) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO credentials (id, plan, status, created_at, expires_at, usage_count, max_usage, origin_bindings)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&cred.id)
        .bind(cred.plan.as_str())
        .bind(cred.status.as_str())
        .bind(cred.created_at)
        .bind(cred.expires_at)
        .bind(cred.usage_count)
        .bind(cred.max_usage)
        .bind(&cred.origin_bindings)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId);
        }
        Ok(())
    }

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, plan, status, created_at, expires_at, usage_count, max_usage, origin_bindings, last_used_at FROM credentials WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn record_usage(
        &self,
        id: &str,
        origin: Option<&str>,
    ) -> Result<Credential, StoreError> {
        // Write-path lazy expiry: flip stale active rows before the bump
        // so a stale status never masks the real denial reason.
        sqlx::query(
            "UPDATE credentials SET status = 'expired' WHERE id = $1 AND status = 'active' AND expires_at < NOW()",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        // Check and increment in one statement — the WHERE clause is the
        // compare half of the compare-and-swap, so two racing callers
        // cannot both take the last slot.
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"UPDATE credentials
               SET usage_count = usage_count + 1,
                   last_used_at = NOW(),
                   origin_bindings = CASE
                       WHEN $2::TEXT IS NOT NULL AND NOT ($2 = ANY(origin_bindings))
                       THEN array_append(origin_bindings, $2)
                       ELSE origin_bindings
                   END
               WHERE id = $1 AND (max_usage IS NULL OR usage_count < max_usage)
               RETURNING id, plan, status, created_at, expires_at, usage_count, max_usage, origin_bindings, last_used_at"#,
        )
        .bind(id)
        .bind(origin)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Credential::try_from(row),
            None => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM credentials WHERE id = $1)",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
                if exists {
                    Err(StoreError::UsageLimitExceeded)
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn revoke_credential(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET status = 'revoked', revoked_at = COALESCE(revoked_at, NOW()) WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRegistry for PgStore {
    async fn insert_resource(&self, res: &Resource) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO resources (id, owner_credential_id, access_mode, allow_list, deny_list, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&res.id)
        .bind(&res.owner_credential_id)
        .bind(res.access_mode.as_str())
        .bind(&res.allow_list)
        .bind(&res.deny_list)
        .bind(res.is_active)
        .bind(res.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId);
        }
        Ok(())
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, owner_credential_id, access_mode, allow_list, deny_list, is_active, created_at FROM resources WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Resource::try_from).transpose()
    }

    async fn set_access(
        &self,
        resource_id: &str,
        requester_id: &str,
        rule: AccessRule,
    ) -> Result<(), StoreError> {
        // Removal from the opposite list and insertion happen in one
        // statement so the disjoint-lists invariant holds under
        // concurrent updates.
        let sql = match rule {
            AccessRule::Allow => {
                r#"UPDATE resources
                   SET allow_list = array_append(array_remove(allow_list, $2), $2),
                       deny_list = array_remove(deny_list, $2),
                       updated_at = NOW()
                   WHERE id = $1"#
            }
            AccessRule::Deny => {
                r#"UPDATE resources
                   SET deny_list = array_append(array_remove(deny_list, $2), $2),
                       allow_list = array_remove(allow_list, $2),
                       updated_at = NOW()
                   WHERE id = $1"#
            }
            AccessRule::Clear => {
                r#"UPDATE resources
                   SET allow_list = array_remove(allow_list, $2),
                       deny_list = array_remove(deny_list, $2),
                       updated_at = NOW()
                   WHERE id = $1"#
            }
        };

        let result = sqlx::query(sql)
            .bind(resource_id)
            .bind(requester_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn deactivate_resource(&self, id: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE resources SET is_active = false, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO audit_log (id, resource_id, requester_id, credential_id, verdict, reason, origin, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(entry.id)
        .bind(&entry.resource_id)
        .bind(&entry.requester_id)
        .bind(&entry.credential_id)
        .bind(verdict_text(entry.verdict))
        .bind(entry.reason.as_str())
        .bind(&entry.origin)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, q: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"SELECT id, resource_id, requester_id, credential_id, verdict, reason, origin, created_at
               FROM audit_log
               WHERE resource_id = $1
                 AND ($2::TEXT IS NULL OR requester_id = $2)
                 AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
                 AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
               ORDER BY created_at DESC
               LIMIT $5 OFFSET $6"#,
        )
        .bind(&q.resource_id)
        .bind(q.requester_id.as_deref())
        .bind(q.since)
        .bind(q.until)
        .bind(q.limit.max(0))
        .bind(q.offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

fn verdict_text(state: VerdictState) -> &'static str {
    match state {
        VerdictState::Granted => "granted",
        VerdictState::Denied => "denied",
        VerdictState::Blocked => "blocked",
        VerdictState::Errored => "errored",
    }
}

fn parse_verdict(s: &str) -> Option<VerdictState> {
    match s {
        "granted" => Some(VerdictState::Granted),
        "denied" => Some(VerdictState::Denied),
        "blocked" => Some(VerdictState::Blocked),
        "errored" => Some(VerdictState::Errored),
        _ => None,
    }
}

// -- Row types --

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: String,
    plan: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    usage_count: i64,
    max_usage: Option<i64>,
    origin_bindings: Vec<String>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, StoreError> {
        let plan = Plan::parse(&row.plan)
            .ok_or_else(|| StoreError::Backend(anyhow!("unknown plan '{}'", row.plan)))?;
        let status = CredentialStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(anyhow!("unknown status '{}'", row.status)))?;
        Ok(Credential {
            id: row.id,
            plan,
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
            usage_count: row.usage_count,
            max_usage: row.max_usage,
            origin_bindings: row.origin_bindings,
            last_used_at: row.last_used_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: String,
    owner_credential_id: String,
    access_mode: String,
    allow_list: Vec<String>,
    deny_list: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = StoreError;

    fn try_from(row: ResourceRow) -> Result<Self, StoreError> {
        let access_mode = AccessMode::parse(&row.access_mode).ok_or_else(|| {
            StoreError::Backend(anyhow!("unknown access mode '{}'", row.access_mode))
        })?;
        Ok(Resource {
            id: row.id,
            owner_credential_id: row.owner_credential_id,
            access_mode,
            allow_list: row.allow_list,
            deny_list: row.deny_list,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    resource_id: String,
    requester_id: String,
    credential_id: String,
    verdict: String,
    reason: String,
    origin: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, StoreError> {
        let verdict = parse_verdict(&row.verdict)
            .ok_or_else(|| StoreError::Backend(anyhow!("unknown verdict '{}'", row.verdict)))?;
        let reason = Reason::parse(&row.reason)
            .ok_or_else(|| StoreError::Backend(anyhow!("unknown reason '{}'", row.reason)))?;
        Ok(AuditEntry {
            id: row.id,
            resource_id: row.resource_id,
            requester_id: row.requester_id,
            credential_id: row.credential_id,
            verdict,
            reason,
            origin: row.origin,
            timestamp: row.created_at,
        })
    }
}
