use pulse_analytics::config::Config;
use pulse_analytics::ingest::handler::AppState;
use pulse_analytics::ingest::ratelimit::RateLimiter;
use pulse_analytics::maintenance::Maintenance;
use pulse_analytics::{server, storage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_analytics=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(std::path::Path::new));

    tracing::info!(
        host = %config.host,
        port = config.port,
        "Starting Pulse Analytics"
    );

    let store = storage::open(config.database_path.as_deref());

    if config.retention_days == 0 {
        tracing::warn!(
            "No retention_days configured; stored events grow without bound. \
             Set retention_days to enable periodic eviction."
        );
    }

    let api_token = config.api_token.clone().unwrap_or_else(|| {
        let token = uuid::Uuid::new_v4().to_string();
        tracing::warn!("No PULSE_API_TOKEN set, using random token: {token}. Set PULSE_API_TOKEN for a stable secret across restarts.");
        token
    });

    let rate_limiter = RateLimiter::new(
        Duration::from_secs(config.rate_limit_window_secs),
        config.rate_limit_max_requests,
    );

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        rate_limiter: rate_limiter.clone(),
        api_token,
        storage_timeout: Duration::from_secs(config.storage_timeout_secs),
        allowed_origin: config.allowed_origin.clone(),
        max_payload_bytes: config.max_payload_bytes,
    });

    let maintenance = Maintenance::new(
        store,
        rate_limiter,
        Duration::from_secs(config.cleanup_interval_secs),
        config.retention_days,
    )
    .start();

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    maintenance.stop();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
