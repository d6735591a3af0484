pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use gateway::{Gateway, LifecycleHooks};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    /// Sockets currently open, checked against `config.max_connections`.
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> Self {
        let gateway = Gateway::new(authenticator, hooks, config.handshake_ttl);
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}
