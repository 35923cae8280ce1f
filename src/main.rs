use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keygate::cli::{Cli, Commands, CredentialCommands};
use keygate::credentials::Credentials;
use keygate::models::Plan;
use keygate::store::postgres::PgStore;
use keygate::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keygate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    match args.command {
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        Some(Commands::Credential { command }) => {
            let db = Arc::new(PgStore::connect(&cfg.database_url).await?);
            db.migrate().await?;
            let credentials = Credentials::new(db);
            handle_credential_command(&credentials, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    }
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let db = Arc::new(PgStore::connect(&cfg.database_url).await?);
    db.migrate().await?;

    let state = Arc::new(AppState::new(db.clone(), db.clone(), db, cfg));

    let app = axum::Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", api::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "keygate listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate verdicts with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn handle_credential_command(
    credentials: &Credentials,
    command: CredentialCommands,
) -> anyhow::Result<()> {
    match command {
        CredentialCommands::Issue {
            plan,
            max_usage,
            duration_days,
        } => {
            let plan = Plan::parse(&plan)
                .ok_or_else(|| anyhow::anyhow!("unknown plan '{}'", plan))?;
            let cred = credentials
                .issue(plan, max_usage, duration_days.map(chrono::Duration::days))
                .await
                .map_err(|e| anyhow::anyhow!("issue failed: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&cred)?);
        }
        CredentialCommands::Inspect { id } => {
            match credentials
                .get(&id)
                .await
                .map_err(|e| anyhow::anyhow!("lookup failed: {}", e))?
            {
                Some(cred) => println!("{}", serde_json::to_string_pretty(&cred)?),
                None => println!("credential not found"),
            }
        }
        CredentialCommands::Revoke { id } => {
            credentials
                .revoke(&id)
                .await
                .map_err(|e| anyhow::anyhow!("revoke failed: {}", e))?;
            println!("revoked {}", id);
        }
    }
    Ok(())
}
