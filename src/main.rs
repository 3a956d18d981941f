use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};

use dealtrack::api::handler::{self, ApiState};
use dealtrack::config::AppConfig;
use dealtrack::storage::{self, Db};

#[derive(Parser)]
#[command(
    name = "dealtrack",
    about = "Persistence and statistics service for affiliate deal tracking"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealtrack=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        db = %config.database.path.display(),
        "starting dealtrack"
    );

    // Open the database and run migrations
    let db = Db::connect(&config.database).await?;
    tracing::info!("database initialized");

    // Spawn retention background task
    let retention_db = db.clone();
    let retention_cfg = config.retention.clone();
    let retention_handle = tokio::spawn(async move {
        storage::retention::retention_loop(retention_db, retention_cfg).await;
    });

    let api_state = Arc::new(ApiState { db: db.clone() });

    // CORS: everything served here is GET; restrict to the dashboard origin
    // when one is configured, otherwise allow any
    let cors = if config.dashboard.origin.is_empty() {
        CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods([axum::http::Method::GET])
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(
                config
                    .dashboard
                    .origin
                    .parse()
                    .expect("dashboard.origin must be a valid header value"),
            ))
            .allow_methods([axum::http::Method::GET])
    };

    let app = Router::new()
        .route("/api/stats", get(handler::get_stats))
        .route("/api/deals", get(handler::list_deals))
        .route("/api/deals/{id}", get(handler::get_deal))
        .route("/api/users", get(handler::list_users))
        .route("/r/{deal_id}", get(handler::redirect_deal))
        .route("/health", get(handler::health))
        .layer(cors)
        .with_state(api_state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    retention_handle.abort();
    db.close();

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
