//! Identity-keyed connection registry with a reverse handle-id index and
//! the weighted idle set.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use super::client::ClientRecord;
use super::handle::{CloseReason, Handle};
use super::waiting::WaitingSet;
use crate::error::{GatewayError, Result};

/// Outcome of [`ConnectionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First live handle for this identity.
    Bound,
    /// A previous handle was evicted and disconnected.
    Replaced,
    /// The handle was already bound to this identity; nothing changed.
    Duplicate,
}

/// Point-in-time sizes of the registry maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub clients: usize,
    pub handles: usize,
    pub waiting: usize,
}

struct RegistryState {
    /// identity -> record
    clients: HashMap<String, ClientRecord>,
    /// handle id -> identity
    handles: HashMap<String, String>,
    waiting: WaitingSet,
}

/// Shared registry of all live client bindings.
///
/// A single `parking_lot::Mutex` covers the client map, the reverse index
/// and the waiting set. The lock is held only for map mutations: socket
/// disconnects and writes always happen after it is released.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                clients: HashMap::new(),
                handles: HashMap::new(),
                waiting: WaitingSet::new(),
            }),
        }
    }

    /// Bind `handle` to `identity`, evicting any other handle the identity
    /// held. The evicted handle is disconnected after the lock is released;
    /// failures there are logged, not returned.
    pub fn register(&self, identity: &str, handle: Handle, data: Value) -> Result<Registration> {
        if identity.is_empty() {
            return Err(GatewayError::Rejected("empty identity".to_string()));
        }

        let (outcome, evicted) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            // A handle id belongs to exactly one identity. Detach it from any
            // other identity before binding.
            if let Some(other) = state
                .handles
                .get(handle.id())
                .filter(|owner| owner.as_str() != identity)
                .cloned()
            {
                tracing::warn!(
                    handle_id = %handle.id(),
                    previous_identity = %other,
                    %identity,
                    "handle re-registered under a different identity"
                );
                state.clients.remove(&other);
                state.waiting.leave(&other);
            }

            match state.clients.get_mut(identity) {
                Some(record) if record.handle_id() == Some(handle.id()) => {
                    return Ok(Registration::Duplicate);
                }
                Some(record) => {
                    let previous = record.bind(handle.clone(), data);
                    if let Some(previous) = &previous {
                        state.handles.remove(previous.id());
                    }
                    state
                        .handles
                        .insert(handle.id().to_string(), identity.to_string());
                    match previous {
                        Some(previous) => (Registration::Replaced, Some(previous)),
                        None => (Registration::Bound, None),
                    }
                }
                None => {
                    state.clients.insert(
                        identity.to_string(),
                        ClientRecord::new(handle.clone(), data),
                    );
                    state
                        .handles
                        .insert(handle.id().to_string(), identity.to_string());
                    (Registration::Bound, None)
                }
            }
        };

        if let Some(old) = evicted {
            tracing::info!(
                %identity,
                old_handle_id = %old.id(),
                new_handle_id = %handle.id(),
                "evicting stale connection"
            );
            if let Err(err) = old.disconnect(CloseReason::Replaced) {
                tracing::warn!(?err, handle_id = %old.id(), "failed to disconnect evicted handle");
            }
        }

        Ok(outcome)
    }

    /// Remove whatever is bound to `handle` and disconnect it.
    ///
    /// Returns the identity and data it was bound to, or `None` when the
    /// handle is unknown (never registered, evicted, or already cleaned up).
    /// Safe to call any number of times for the same handle.
    pub fn deregister(&self, handle: &Handle) -> Option<(String, Value)> {
        let removed = {
            let mut state = self.state.lock();
            match state.handles.remove(handle.id()) {
                Some(identity) => {
                    state.waiting.leave(&identity);
                    let data = state
                        .clients
                        .remove(&identity)
                        .map(ClientRecord::into_data)
                        .unwrap_or(Value::Null);
                    Some((identity, data))
                }
                None => None,
            }
        };

        if let Err(err) = handle.disconnect(CloseReason::Closed) {
            tracing::debug!(?err, handle_id = %handle.id(), "disconnect during deregister failed");
        }

        removed
    }

    pub fn exists(&self, identity: &str) -> bool {
        self.state.lock().clients.contains_key(identity)
    }

    /// Identity currently bound to a handle id.
    pub fn client_id(&self, handle_id: &str) -> Option<String> {
        self.state.lock().handles.get(handle_id).cloned()
    }

    /// Opaque data supplied when `identity` authenticated.
    pub fn client_data(&self, identity: &str) -> Result<Value> {
        self.state
            .lock()
            .clients
            .get(identity)
            .map(|record| record.data().clone())
            .ok_or_else(|| GatewayError::NotFound(identity.to_string()))
    }

    /// Send one event to the connection bound to `identity`.
    ///
    /// The lock is held only to fetch the handle. Liveness is re-checked
    /// before writing; a close racing with the write surfaces as
    /// [`GatewayError::Transport`].
    pub fn send(&self, identity: &str, event: &str, payload: Value) -> Result<()> {
        let handle = {
            let state = self.state.lock();
            state.clients.get(identity).and_then(ClientRecord::handle)
        };

        let handle = handle.ok_or_else(|| GatewayError::TargetOffline(identity.to_string()))?;
        if !handle.is_connected() {
            return Err(GatewayError::TargetOffline(identity.to_string()));
        }
        handle.emit(event, payload)
    }

    /// Force the connection bound to `identity` closed. Bookkeeping happens
    /// in the transport's disconnect callback, like any other close.
    pub fn kick(&self, identity: &str) -> Result<()> {
        let handle = {
            let state = self.state.lock();
            state.clients.get(identity).and_then(ClientRecord::handle)
        };

        let handle = handle.ok_or_else(|| GatewayError::NotFound(identity.to_string()))?;
        tracing::info!(%identity, handle_id = %handle.id(), "kicking client");
        handle.disconnect(CloseReason::Kicked)
    }

    /// Snapshot of registered identities.
    pub fn identities(&self) -> Vec<String> {
        self.state.lock().clients.keys().cloned().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            clients: state.clients.len(),
            handles: state.handles.len(),
            waiting: state.waiting.len(),
        }
    }

    // -- waiting set -------------------------------------------------------

    /// Add one idle token for `identity`. Returns the new weight.
    pub fn waiting(&self, identity: &str) -> u32 {
        self.state.lock().waiting.increment(identity)
    }

    /// Like [`waiting`](Self::waiting), but only for an identity that is
    /// registered at the moment of the call.
    pub fn waiting_if_registered(&self, identity: &str) -> Result<u32> {
        let mut state = self.state.lock();
        if !state.clients.contains_key(identity) {
            return Err(GatewayError::NotFound(identity.to_string()));
        }
        Ok(state.waiting.increment(identity))
    }

    /// Remove one idle token. `true` means the identity just left the set.
    pub fn countdown(&self, identity: &str) -> bool {
        self.state.lock().waiting.countdown(identity)
    }

    pub fn leave_waiting(&self, identity: &str) {
        self.state.lock().waiting.leave(identity);
    }

    /// Identities currently waiting, in no particular order.
    pub fn idle_clients(&self) -> Vec<String> {
        self.state.lock().waiting.identities()
    }

    /// Waiting identities with their weights, heaviest first.
    pub fn idle_ranking(&self) -> Vec<(String, u32)> {
        self.state.lock().waiting.ranked()
    }

    pub fn most_idle(&self) -> Option<String> {
        self.state.lock().waiting.most_idle()
    }

    pub fn waiting_weight(&self, identity: &str) -> u32 {
        self.state.lock().waiting.weight(identity)
    }

    /// Every reverse entry points at a record bound to that very handle,
    /// and every bound record has its reverse entry.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        let reverse_ok = state.handles.iter().all(|(handle_id, identity)| {
            state
                .clients
                .get(identity)
                .and_then(ClientRecord::handle_id)
                == Some(handle_id.as_str())
        });
        let forward_ok = state.clients.iter().all(|(identity, record)| {
            record
                .handle_id()
                .and_then(|id| state.handles.get(id))
                .map(|owner| owner == identity)
                .unwrap_or(false)
        });
        reverse_ok && forward_ok
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
