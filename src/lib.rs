//! Keygate — credential issuance, validation, and access decisions
//! gating delivery of protected payloads.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod models;
pub mod notification;
pub mod registry;
pub mod store;

use audit::AuditLog;
use credentials::Credentials;
use engine::DecisionEngine;
use guard::RateAndAbuseGuard;
use notification::WebhookNotifier;
use store::{AuditStore, CredentialStore, ResourceRegistry};

/// Shared application state passed to handlers.
pub struct AppState {
    pub credentials: Credentials,
    pub registry: registry::Registry,
    pub engine: DecisionEngine,
    pub guard: Arc<RateAndAbuseGuard>,
    pub audit: AuditLog,
    pub notifier: WebhookNotifier,
    pub config: config::Config,
}

impl AppState {
    /// Wire the core components over the given storage backends. The
    /// three handles usually point at one store (PgStore implements
    /// all three traits), but tests may mix backends freely.
    pub fn new(
        credential_store: Arc<dyn CredentialStore>,
        resource_store: Arc<dyn ResourceRegistry>,
        audit_store: Arc<dyn AuditStore>,
        config: config::Config,
    ) -> Self {
        let notifier = WebhookNotifier::new();
        let guard = Arc::new(RateAndAbuseGuard::new(config.guard_config()));
        let credentials = Credentials::new(credential_store);
        let registry = registry::Registry::new(resource_store);
        let audit = AuditLog::new(
            audit_store,
            notifier.clone(),
            config.webhook_urls.clone(),
            config.webhook_secret.clone(),
        );
        let engine = DecisionEngine::new(
            credentials.clone(),
            registry.clone(),
            guard.clone(),
            audit.clone(),
            notifier.clone(),
            config.webhook_urls.clone(),
            config.webhook_secret.clone(),
        );
        Self {
            credentials,
            registry,
            engine,
            guard,
            audit,
            notifier,
            config,
        }
    }
}
