//! Status poller: the read side of the generation pipeline.
//!
//! Callers pull [`GenerationStatusView`] snapshots. Reads are cheap point
//! lookups; the only write is the lazy expiry of a job that has outlived
//! the ceiling, so no reader ever sees a job stuck in flight forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use companion_pets::generation::{elapsed, is_expired};
use companion_types::{EntityId, EtaBucket, GenerationState, GenerationStatusView};

use crate::config::GenerationConfig;
use crate::error::CompanionError;
use crate::manager::PetManager;
use crate::orchestrator::expire_job;

/// Reads generation status for callers.
#[derive(Clone)]
pub struct StatusPoller {
    manager: Arc<PetManager>,
    timing: GenerationConfig,
}

impl StatusPoller {
    /// Create a poller.
    pub const fn new(manager: Arc<PetManager>, timing: GenerationConfig) -> Self {
        Self { manager, timing }
    }

    /// Current status of the entity's generation pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] or
    /// [`companion_pets::PetError::NotHatched`].
    pub async fn get_status(&self, entity_id: EntityId) -> Result<GenerationStatusView, CompanionError> {
        let pet = self.manager.get_pet(entity_id).await?;
        let ceiling = chrono::Duration::from_std(self.timing.timeout())
            .unwrap_or(chrono::Duration::MAX);

        if let Some(job_id) = pet.generation.job_id
            && is_expired(&pet.generation, Utc::now(), ceiling)
        {
            expire_job(&self.manager, entity_id, job_id, &self.timing).await?;
            let refreshed = self.manager.get_pet(entity_id).await?;
            return Ok(view(&refreshed.generation));
        }

        Ok(view(&pet.generation))
    }

    /// Re-read status every `interval` until the job is no longer in
    /// flight.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Timeout`] if the job is still in flight
    /// after `max_wait`, plus everything [`Self::get_status`] returns.
    pub async fn wait_for_terminal(
        &self,
        entity_id: EntityId,
        interval: Duration,
        max_wait: Duration,
    ) -> Result<GenerationStatusView, CompanionError> {
        let deadline = tokio::time::Instant::now()
            .checked_add(max_wait)
            .ok_or_else(|| CompanionError::Timeout(String::from("wait deadline overflows")))?;

        loop {
            let status = self.get_status(entity_id).await?;
            if !status.status.is_in_flight() {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CompanionError::Timeout(format!(
                    "generation for {entity_id} still {:?} after {}ms",
                    status.status,
                    max_wait.as_millis()
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Snapshot the caller-facing view of a generation state.
pub fn view(state: &GenerationState) -> GenerationStatusView {
    let estimated_time_remaining = if state.status.is_in_flight() {
        elapsed(state, Utc::now()).map(|e| EtaBucket::for_elapsed_secs(e.num_seconds()))
    } else {
        None
    };

    GenerationStatusView {
        status: state.status,
        job_id: state.job_id,
        requested: state.requested.clone(),
        started_at: state.started_at,
        completed_at: state.completed_at,
        error: state.error.clone(),
        failure: state.failure,
        estimated_time_remaining,
    }
}
