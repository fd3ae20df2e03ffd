//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::generator::PasswordGenerator;
use crate::store::{CounterStore, Recorder};

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Cached counters, read by `/metrics`, pinged by `/health`.
    pub store: CounterStore,
    /// Queue feeding issued kinds into the store.
    pub recorder: Recorder,
    /// Password source for the generation endpoints.
    pub generator: Arc<dyn PasswordGenerator>,
}

impl AppState {
    /// Create a new [`AppState`] from its collaborators.
    pub fn new(
        store: CounterStore,
        recorder: Recorder,
        generator: Arc<dyn PasswordGenerator>,
    ) -> Self {
        Self {
            store,
            recorder,
            generator,
        }
    }
}
