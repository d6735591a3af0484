//! Weighted idle set: how many outstanding "idle" tokens each identity holds.
//!
//! Not synchronized on its own. The [`ConnectionRegistry`](super::registry::ConnectionRegistry)
//! owns the only instance and mutates it under the same lock as the client map,
//! so a disconnect removes both atomically.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct WaitingSet {
    weights: HashMap<String, u32>,
}

impl WaitingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one idle token, creating the entry at 1. Returns the new weight.
    pub fn increment(&mut self, identity: &str) -> u32 {
        let weight = self.weights.entry(identity.to_string()).or_insert(0);
        *weight += 1;
        *weight
    }

    /// Remove one idle token. Returns `true` when this removed the last one
    /// and the identity left the set; `false` otherwise, including when the
    /// identity was not waiting at all.
    pub fn countdown(&mut self, identity: &str) -> bool {
        match self.weights.get_mut(identity) {
            Some(weight) if *weight <= 1 => {
                self.weights.remove(identity);
                true
            }
            Some(weight) => {
                *weight -= 1;
                false
            }
            None => false,
        }
    }

    /// Drop the identity regardless of weight. Returns the weight it had.
    pub fn leave(&mut self, identity: &str) -> Option<u32> {
        self.weights.remove(identity)
    }

    /// Current weight; absent means zero.
    pub fn weight(&self, identity: &str) -> u32 {
        self.weights.get(identity).copied().unwrap_or(0)
    }

    /// Snapshot of waiting identities, in no particular order.
    pub fn identities(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    /// Snapshot of `(identity, weight)` pairs, heaviest first. Ties are
    /// ordered by identity so the result is deterministic.
    pub fn ranked(&self) -> Vec<(String, u32)> {
        let mut ranked: Vec<(String, u32)> = self
            .weights
            .iter()
            .map(|(identity, weight)| (identity.clone(), *weight))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// The identity holding the most idle tokens.
    pub fn most_idle(&self) -> Option<String> {
        self.weights
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(identity, _)| identity.clone())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
