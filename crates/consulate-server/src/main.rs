mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use consulate_api::auth::ensure_seed_admin;
use consulate_api::notify::{Mailer, MailerConfig};
use consulate_api::router::build_router;
use consulate_api::state::{AppState, AppStateInner, AuthSettings};
use consulate_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "consulate=debug,consulate_api=debug,consulate_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::load()?;

    let db = Database::open(&config.db_path, config.db_pool_size)?;
    info!(
        "Database {} open with {} connections",
        config.db_path.display(),
        db.pool_size()
    );

    if let Some((email, password)) = &config.seed_admin {
        ensure_seed_admin(&db, email, password)?;
    }

    let mailer = Mailer::new(MailerConfig {
        api_url: config.email_api_url.clone(),
        api_key: config.email_api_key.clone(),
        from: config.email_from.clone(),
    })?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        notifier: Arc::new(mailer),
        auth: AuthSettings {
            jwt_secret: config.jwt_secret.clone(),
            token_ttl_days: config.jwt_expires_days,
            admin_emails: config.admin_emails.clone(),
        },
        contact_email: config.contact_email.clone(),
    });

    // Single frontend origin; cookies need credentials
    let cors = CorsLayer::new()
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Consulate server listening on {}", addr);
    info!("CORS origin: {}", config.frontend_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
