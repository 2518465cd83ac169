//! Shared application state for the HTTP API.

use std::sync::Arc;

use companion_core::{Orchestrator, PetManager, StatusPoller};

/// Handles to the engine services, shared by every handler.
pub struct AppState {
    /// Pet record manager.
    pub manager: Arc<PetManager>,
    /// Generation job orchestrator.
    pub orchestrator: Orchestrator,
    /// Generation status reader.
    pub poller: StatusPoller,
}

impl AppState {
    /// Bundle the engine services.
    pub const fn new(
        manager: Arc<PetManager>,
        orchestrator: Orchestrator,
        poller: StatusPoller,
    ) -> Self {
        Self {
            manager,
            orchestrator,
            poller,
        }
    }
}
