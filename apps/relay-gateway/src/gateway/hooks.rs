//! Business callbacks fired around a connection's lifetime.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Injected by the application embedding the gateway.
///
/// Both callbacks run outside the registry lock, so they may call back into
/// the registry freely.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// A connection for `identity` is now the bound one. Returning an error
    /// disconnects it.
    async fn on_connected(&self, identity: &str, data: &Value) -> Result<()>;

    /// The bound connection for `identity` has gone away.
    async fn on_disconnected(&self, identity: &str, data: &Value);
}

/// Hooks that only log. Used when no business logic is attached.
pub struct LoggingHooks;

#[async_trait]
impl LifecycleHooks for LoggingHooks {
    async fn on_connected(&self, identity: &str, _data: &Value) -> Result<()> {
        tracing::info!(%identity, "client connected");
        Ok(())
    }

    async fn on_disconnected(&self, identity: &str, _data: &Value) {
        tracing::info!(%identity, "client disconnected");
    }
}
