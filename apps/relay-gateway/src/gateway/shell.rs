//! Connection lifecycle: authenticate → connect → disconnect.
//!
//! Each physical attempt moves `Upgrading → Authenticated → Connected →
//! Disconnected` and never revisits a state. A failed authentication, or a
//! connect with no pending handshake, goes straight to `Disconnected`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time;

use super::bridge::{correlation_token, HandshakeBridge};
use super::handle::{CloseReason, Handle};
use super::hooks::LifecycleHooks;
use super::registry::ConnectionRegistry;
use crate::auth::Authenticator;
use crate::error::{GatewayError, Result};

/// Floor for the sweeper period; `time::interval` panics on zero.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(50);

/// Owns the registry and the handshake bridge and drives them from the
/// transport's callbacks.
pub struct Gateway {
    registry: ConnectionRegistry,
    bridge: HandshakeBridge,
    authenticator: Arc<dyn Authenticator>,
    hooks: Arc<dyn LifecycleHooks>,
    handshake_ttl: Duration,
}

impl Gateway {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        hooks: Arc<dyn LifecycleHooks>,
        handshake_ttl: Duration,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            bridge: HandshakeBridge::new(),
            authenticator,
            hooks,
            handshake_ttl,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Upgrade-phase callback. On success returns the correlation token the
    /// transport must hand back to [`Gateway::on_connect`].
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<String> {
        let credential = credential
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::AuthenticationFailed("missing credential".to_string()))?;

        let (identity, data) = self.authenticator.authenticate(credential).await?;

        let token = correlation_token();
        tracing::debug!(%identity, "upgrade authenticated");
        self.bridge.put(token.clone(), identity, data);
        Ok(token)
    }

    /// Connect-phase callback. Binds `handle` to the identity authenticated
    /// under `token` and fires the connected hook.
    ///
    /// Every error path has already disconnected the handle. Registry cleanup
    /// is left to the transport's disconnect callback.
    pub async fn on_connect(&self, token: &str, handle: Handle) -> Result<String> {
        let Some((identity, data)) = self.bridge.take_and_clear(token) else {
            tracing::debug!(handle_id = %handle.id(), "connect without pending handshake");
            drop_handle(&handle, CloseReason::Rejected);
            return Err(GatewayError::HandshakeNotFound);
        };

        if let Err(err) = self.registry.register(&identity, handle.clone(), data.clone()) {
            tracing::warn!(?err, %identity, handle_id = %handle.id(), "registration failed");
            drop_handle(&handle, CloseReason::Rejected);
            return Err(err);
        }

        if let Err(err) = self.hooks.on_connected(&identity, &data).await {
            tracing::warn!(?err, %identity, "connected hook refused client");
            drop_handle(&handle, CloseReason::Rejected);
            return Err(err);
        }

        tracing::info!(%identity, handle_id = %handle.id(), "client bound");
        Ok(identity)
    }

    /// Disconnect-phase callback. Returns the identity that was unbound, if
    /// this handle was still the bound one.
    pub async fn on_disconnect(&self, handle: &Handle) -> Option<String> {
        let (identity, data) = self.registry.deregister(handle)?;
        self.hooks.on_disconnected(&identity, &data).await;
        tracing::info!(%identity, handle_id = %handle.id(), "client unbound");
        Some(identity)
    }

    pub fn send(&self, identity: &str, event: &str, payload: Value) -> Result<()> {
        self.registry.send(identity, event, payload)
    }

    /// Drop handshakes whose connect never arrived.
    pub fn sweep_handshakes(&self) -> usize {
        self.bridge.sweep_expired(self.handshake_ttl)
    }

    pub fn pending_handshakes(&self) -> usize {
        self.bridge.len()
    }

    /// Periodically sweep abandoned handshakes for as long as the gateway lives.
    pub fn spawn_handshake_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::downgrade(self);
        let period = self.handshake_ttl.max(MIN_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                let removed = gateway.sweep_handshakes();
                if removed > 0 {
                    tracing::info!(removed, "swept abandoned handshakes");
                }
            }
        })
    }
}

fn drop_handle(handle: &Handle, reason: CloseReason) {
    if let Err(err) = handle.disconnect(reason) {
        tracing::debug!(?err, handle_id = %handle.id(), "disconnect failed");
    }
}
