use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_gateway::auth::jwt::JwtAuthenticator;
use relay_gateway::config::Config;
use relay_gateway::gateway::LoggingHooks;
use relay_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present; env vars may also be set externally.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        heartbeat_interval_ms = config.heartbeat_interval.as_millis() as u64,
        heartbeat_timeout_ms = config.heartbeat_timeout.as_millis() as u64,
        max_connections = config.max_connections,
        handshake_ttl_secs = config.handshake_ttl.as_secs(),
        "relay-gateway configured"
    );

    let authenticator = Arc::new(JwtAuthenticator::new(config.jwt_secret.as_bytes()));
    let state = AppState::new(config, authenticator, Arc::new(LoggingHooks));

    // Authenticated upgrades whose connect never arrives are swept on this timer.
    let sweeper = state.gateway.spawn_handshake_sweeper();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(relay_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("relay-gateway stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
    }
}
