use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use crate::engine::AccessRequest;
use crate::errors::AppError;
use crate::models::{AccessMode, AccessRule, AuditQuery, Plan, Verdict};
use crate::notification::WebhookEvent;
use crate::AppState;

/// Header carrying the caller's own credential for ownership-scoped
/// operations (resource management, audit reads).
const CALLER_HEADER: &str = "x-keygate-credential";
/// Header carrying the admin key for gated operations.
const ADMIN_HEADER: &str = "x-keygate-admin-key";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected) = state.config.admin_key else {
        // Dev mode — config::load already warned loudly about this.
        return Ok(());
    };
    let provided = headers.get(ADMIN_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(expected.as_str()) {
        return Err(AppError::AdminKeyRequired);
    }
    Ok(())
}

fn caller_credential(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .ok_or_else(|| {
            AppError::InvalidRequest(format!("missing {} header", CALLER_HEADER))
        })
}

// ── Access decisions ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccessBody {
    pub credential_id: String,
    pub resource_id: String,
    pub requester_id: String,
    pub origin_fingerprint: String,
}

pub async fn request_access(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccessBody>,
) -> Result<Json<Verdict>, AppError> {
    let req = AccessRequest {
        credential_id: body.credential_id,
        resource_id: body.resource_id,
        requester_id: body.requester_id,
        origin: body.origin_fingerprint,
    };
    let verdict = state.engine.decide(&req).await?;
    Ok(Json(verdict))
}

// ── Credentials ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssueBody {
    pub plan: String,
    pub max_usage: Option<i64>,
    pub duration_days: Option<i64>,
}

pub async fn issue_credential(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<IssueBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    require_admin(&state, &headers)?;

    let plan = Plan::parse(&body.plan)
        .ok_or_else(|| AppError::InvalidRequest(format!("unknown plan '{}'", body.plan)))?;
    let duration = body.duration_days.map(Duration::days);
    let cred = state.credentials.issue(plan, body.max_usage, duration).await?;
    Ok((StatusCode::CREATED, Json(json!({ "credential": cred }))))
}

/// Self-serve trial issuance — the one ungated path, matching the
/// 30-day free-trial flow of the delivery product.
pub async fn issue_trial(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let cred = state.credentials.issue(Plan::Trial, None, None).await?;
    Ok((StatusCode::CREATED, Json(json!({ "credential": cred }))))
}

pub async fn get_credential(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    let cred = state
        .credentials
        .get(&id)
        .await?
        .ok_or(AppError::CredentialNotFound)?;
    Ok(Json(json!({ "credential": cred })))
}

pub async fn revoke_credential(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    state.credentials.revoke(&id).await?;
    state.notifier.dispatch(
        &state.config.webhook_urls,
        state.config.webhook_secret.as_deref(),
        WebhookEvent::credential_revoked(&id),
    );
    Ok(Json(json!({ "revoked": true })))
}

// ── Resources ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateResourceBody {
    pub access_mode: String,
}

pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateResourceBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let caller = caller_credential(&headers)?;
    // The owner must hold a currently valid credential.
    state.credentials.validate(&caller).await?;

    let mode = AccessMode::parse(&body.access_mode).ok_or_else(|| {
        AppError::InvalidRequest(format!("unknown access mode '{}'", body.access_mode))
    })?;
    let res = state.registry.create(&caller, mode).await?;
    Ok((StatusCode::CREATED, Json(json!({ "resource": res }))))
}

#[derive(Debug, Deserialize)]
pub struct SetAccessBody {
    pub requester_id: String,
    /// One of "allow", "deny", "clear".
    pub rule: AccessRule,
}

pub async fn set_resource_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SetAccessBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = caller_credential(&headers)?;
    state
        .registry
        .set_access(&id, &body.requester_id, body.rule, &caller)
        .await?;
    Ok(Json(json!({ "updated": true })))
}

#[derive(Debug, Deserialize)]
pub struct MembershipParams {
    pub requester_id: String,
}

pub async fn check_membership(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<MembershipParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let membership = state
        .registry
        .check_membership(&id, &params.requester_id)
        .await?;
    Ok(Json(json!({ "membership": membership })))
}

pub async fn deactivate_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = caller_credential(&headers)?;
    state.registry.deactivate(&id, &caller).await?;
    Ok(Json(json!({ "deactivated": true })))
}

// ── Audit ────────────────────────────────────────────────────

pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<AuditQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = caller_credential(&headers)?;
    let entries = state.audit.query(&state.registry, &caller, &q).await?;
    Ok(Json(json!({ "entries": entries })))
}

// ── Origin administration ────────────────────────────────────

pub async fn origin_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(origin): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    match state.guard.status(&origin) {
        Some(status) => Ok(Json(json!({ "origin": status }))),
        None => Ok(Json(json!({ "origin": null }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
    pub reason: String,
}

pub async fn block_origin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(origin): Path<String>,
    Json(body): Json<BlockBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    state.guard.manual_block(&origin, &body.reason);
    state.notifier.dispatch(
        &state.config.webhook_urls,
        state.config.webhook_secret.as_deref(),
        WebhookEvent::origin_manually_blocked(&origin, &body.reason),
    );
    Ok(Json(json!({ "blocked": true })))
}

pub async fn unblock_origin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(origin): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    state.guard.manual_unblock(&origin);
    Ok(Json(json!({ "blocked": false })))
}
