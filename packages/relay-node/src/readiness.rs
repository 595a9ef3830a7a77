//! Process-wide readiness flag gating relay admission.

use std::sync::Mutex;

/// Whether the node has completed a full bootstrap pass.
///
/// Read by every `/relay` request and written by both background loops.
/// Last writer wins; a value read here may be stale as soon as it is
/// returned, so callers re-check live engine state before acting on it.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: Mutex<bool>,
}

impl ReadinessGate {
    /// Starts not ready.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, ready: bool) {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner()) = ready;
    }
}
