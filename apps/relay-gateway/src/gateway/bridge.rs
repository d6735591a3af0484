//! Handshake bridge: carries an authentication result from the upgrade
//! request to the connection-established callback.
//!
//! Keyed by a random correlation token minted at authentication time. Uses
//! its own `DashMap` rather than the registry lock; the two share no
//! invariant.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use relay_common::id::prefix;
use serde_json::Value;

/// Bytes of randomness in a correlation token.
const TOKEN_BYTES: usize = 24;

struct PendingHandshake {
    identity: String,
    data: Value,
    created_at: Instant,
}

pub struct HandshakeBridge {
    pending: DashMap<String, PendingHandshake>,
}

/// Mint a fresh correlation token (`hs_` prefixed, URL safe).
pub fn correlation_token() -> String {
    relay_common::generate_opaque_token(prefix::HANDSHAKE, TOKEN_BYTES)
}

impl HandshakeBridge {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Record a verified identity under `token`.
    pub fn put(&self, token: String, identity: String, data: Value) {
        let previous = self.pending.insert(
            token,
            PendingHandshake {
                identity,
                data,
                created_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            // Tokens are random per request; a collision means a caller reused one.
            tracing::warn!(identity = %previous.identity, "overwrote pending handshake");
        }
    }

    /// Atomically remove and return the entry for `token`.
    pub fn take_and_clear(&self, token: &str) -> Option<(String, Value)> {
        self.pending
            .remove(token)
            .map(|(_, pending)| (pending.identity, pending.data))
    }

    /// Drop handshakes whose connect never arrived within `ttl`.
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| now.duration_since(pending.created_at) < ttl);
        before.saturating_sub(self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for HandshakeBridge {
    fn default() -> Self {
        Self::new()
    }
}
