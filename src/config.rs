use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Gates issuance, revocation, and origin administration.
    pub admin_key: Option<String>,
    /// Comma-separated list of webhook URLs to notify on security events.
    pub webhook_urls: Vec<String>,
    /// Optional HMAC secret for signing webhook payloads.
    pub webhook_secret: Option<String>,
    /// Failed validations from one origin before a block. Default: 5.
    pub block_threshold: u32,
    /// How long a breached origin stays blocked, in minutes. Default: 30.
    pub block_minutes: i64,
    /// Window in seconds over which failures are counted. Default: 900.
    pub failure_window_secs: i64,
}

impl Config {
    pub fn guard_config(&self) -> crate::guard::GuardConfig {
        crate::guard::GuardConfig {
            failure_threshold: self.block_threshold,
            tracking_window: chrono::Duration::seconds(self.failure_window_secs),
            block_duration: chrono::Duration::minutes(self.block_minutes),
            ..crate::guard::GuardConfig::default()
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let admin_key = std::env::var("KEYGATE_ADMIN_KEY").ok();

    if admin_key.is_none() {
        let env_mode = std::env::var("KEYGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "KEYGATE_ADMIN_KEY is not set. Admin endpoints (issuance, revocation, \
                 origin blocks) must be gated in production."
            );
        }
        eprintln!("⚠️  KEYGATE_ADMIN_KEY is not set — admin endpoints are open. Set it for production.");
    }

    Ok(Config {
        port: std::env::var("KEYGATE_PORT")
            .unwrap_or_else(|_| "8088".into())
            .parse()
            .unwrap_or(8088),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/keygate".into()),
        admin_key,
        webhook_urls: std::env::var("KEYGATE_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        webhook_secret: std::env::var("KEYGATE_WEBHOOK_SECRET").ok(),
        block_threshold: std::env::var("KEYGATE_BLOCK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5),
        block_minutes: std::env::var("KEYGATE_BLOCK_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        failure_window_secs: std::env::var("KEYGATE_FAILURE_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(900),
    })
}
