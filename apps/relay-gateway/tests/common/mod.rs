use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use jsonwebtoken::{EncodingKey, Header};

use relay_gateway::auth::jwt::{GatewayClaims, JwtAuthenticator};
use relay_gateway::config::Config;
use relay_gateway::gateway::LoggingHooks;
use relay_gateway::AppState;

pub const JWT_SECRET: &str = "test-gateway-secret";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Config with short timers suitable for tests.
pub fn test_config() -> Config {
    Config {
        jwt_secret: JWT_SECRET.to_string(),
        admin_token: ADMIN_TOKEN.to_string(),
        port: 0,
        heartbeat_interval: Duration::from_secs(1),
        heartbeat_timeout: Duration::from_secs(5),
        max_connections: 100,
        handshake_ttl: Duration::from_secs(30),
    }
}

/// Build a test AppState with a JWT authenticator and logging hooks.
pub fn test_state_with(config: Config) -> AppState {
    let authenticator = Arc::new(JwtAuthenticator::new(config.jwt_secret.as_bytes()));
    AppState::new(config, authenticator, Arc::new(LoggingHooks))
}

pub fn test_state() -> AppState {
    test_state_with(test_config())
}

/// Build the full router over a fresh state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = relay_gateway::routes::router().with_state(state.clone());
    (app, state)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_secs() as i64
}

fn mint(identity: &str, exp: i64, data: serde_json::Value) -> String {
    let claims = GatewayClaims {
        sub: identity.to_string(),
        exp,
        data,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint a connection token for `identity`, valid for five minutes.
pub fn mint_token(identity: &str, data: serde_json::Value) -> String {
    mint(identity, unix_now() + 300, data)
}

/// Mint a token that expired ten minutes ago.
pub fn mint_expired_token(identity: &str) -> String {
    mint(identity, unix_now() - 600, serde_json::Value::Null)
}

pub fn admin_bearer() -> String {
    format!("Bearer {ADMIN_TOKEN}")
}

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
