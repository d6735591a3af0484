use std::time::Duration;

/// Default heartbeat interval advertised to clients in READY.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret used to verify client connection tokens.
    pub jwt_secret: String,
    /// Bearer token required by the dispatch API.
    pub admin_token: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Interval clients are told to heartbeat at.
    pub heartbeat_interval: Duration,
    /// A client that stays silent this long is disconnected.
    pub heartbeat_timeout: Duration,
    /// Maximum concurrent sockets. `0` disables the limit.
    pub max_connections: usize,
    /// How long an authenticated upgrade may wait for its connect event.
    pub handshake_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let heartbeat_interval =
            Duration::from_millis(parsed_var("HEARTBEAT_INTERVAL_MS").unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS));
        // Clients get 1.5× the interval before they are considered gone.
        let heartbeat_timeout = parsed_var("HEARTBEAT_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(heartbeat_interval * 3 / 2);

        Self {
            jwt_secret: required_var("JWT_SECRET"),
            admin_token: required_var("ADMIN_TOKEN"),
            port: parsed_var("PORT").unwrap_or(4100),
            heartbeat_interval,
            heartbeat_timeout: nonzero(heartbeat_timeout, "HEARTBEAT_TIMEOUT_MS"),
            max_connections: parsed_var("MAX_CONNECTIONS").unwrap_or(10_000),
            handshake_ttl: nonzero(
                Duration::from_secs(parsed_var("HANDSHAKE_TTL_SECS").unwrap_or(30)),
                "HANDSHAKE_TTL_SECS",
            ),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn nonzero(value: Duration, name: &str) -> Duration {
    assert!(!value.is_zero(), "{name} must be greater than zero");
    value
}
