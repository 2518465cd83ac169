//! Generation job orchestrator.
//!
//! Drives one media job per pet through the vendor:
//!
//! 1. `start_generation` commits `pending` (CAS; a second concurrent start
//!    sees `AlreadyInProgress`) and spawns the job task
//! 2. The task renders one prompt per variant and submits them all. Any
//!    submission error fails the job at once
//! 3. Every submission acknowledged: `pending -> generating`
//! 4. Poll outstanding vendor jobs with exponential backoff plus jitter.
//!    Transient errors (transport, 429, 5xx) are retried up to
//!    `max_poll_failures` consecutive rounds; any other poll error or a
//!    vendor-reported failure ends the job
//! 5. All variants delivered: commit media and `completed` in one write
//!
//! The whole task runs under the timeout ceiling. Every write is fenced on
//! the job id, so a job that was reaped or superseded stops quietly.
//! The store is never held across vendor I/O.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use companion_pets::generation::{begin_job, complete_job, fail_job, is_expired, mark_generating};
use companion_pets::{PetError, pet_mut};
use companion_types::{
    EntityId, GenerationFailure, GenerationJobId, GenerationPreset, GenerationState, MediaVariant,
    PetRecord,
};
use futures::future::join_all;
use rand::Rng;
use tokio::time::timeout;

use crate::config::GenerationConfig;
use crate::error::CompanionError;
use crate::manager::PetManager;
use crate::prompt::PromptEngine;
use crate::vendor::{MediaVendor, VendorError, VendorJobId, VendorJobState};

/// Why a job task stopped before completing.
#[derive(Debug)]
enum Halt {
    /// The job failed; record it.
    Failed {
        failure: GenerationFailure,
        message: String,
    },
    /// Another job or the sweeper owns the record now.
    Superseded,
    /// A store write failed.
    Store(CompanionError),
}

impl Halt {
    fn failed(failure: GenerationFailure, message: impl Into<String>) -> Self {
        Self::Failed {
            failure,
            message: message.into(),
        }
    }
}

/// Starts generation jobs and reaps expired ones.
#[derive(Clone)]
pub struct Orchestrator {
    manager: Arc<PetManager>,
    vendor: Arc<dyn MediaVendor>,
    prompts: Arc<PromptEngine>,
    timing: GenerationConfig,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        manager: Arc<PetManager>,
        vendor: Arc<dyn MediaVendor>,
        prompts: Arc<PromptEngine>,
        timing: GenerationConfig,
    ) -> Self {
        Self {
            manager,
            vendor,
            prompts,
            timing,
        }
    }

    /// The timing parameters.
    pub const fn timing(&self) -> &GenerationConfig {
        &self.timing
    }

    /// Start a generation job for every variant in `preset`.
    ///
    /// Returns as soon as `pending` is committed; the job itself runs on a
    /// separate task.
    ///
    /// # Errors
    ///
    /// Returns [`PetError::AlreadyInProgress`] while a job is in flight,
    /// [`PetError::NotHatched`] without a pet, and
    /// [`CompanionError::EntityNotFound`] for unknown entities.
    pub async fn start_generation(
        &self,
        entity_id: EntityId,
        preset: GenerationPreset,
    ) -> Result<GenerationState, CompanionError> {
        let job_id = GenerationJobId::new();
        let variants = MediaVariant::for_preset(preset);

        let (record, ()) = self
            .manager
            .mutate(entity_id, |record| {
                begin_job(pet_mut(record)?, job_id, variants.clone(), Utc::now())?;
                Ok(((), Vec::new()))
            })
            .await?;
        let pet = record.pet.ok_or(CompanionError::Pet(PetError::NotHatched))?;
        let state = pet.generation.clone();

        tracing::info!(
            entity_id = %entity_id,
            job_id = %job_id,
            preset = ?preset,
            variants = state.requested.len(),
            "generation started"
        );

        let this = self.clone();
        tokio::spawn(async move { this.run_job(entity_id, job_id, &pet).await });
        Ok(state)
    }

    /// Fail every in-flight job older than the ceiling.
    ///
    /// Returns the number of jobs failed.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Db`] if the in-flight scan fails. Failures
    /// on individual entities are logged and skipped.
    pub async fn reap_expired(&self) -> Result<usize, CompanionError> {
        let in_flight = self.manager.store().list_in_flight().await?;
        let mut reaped: usize = 0;

        for record in in_flight {
            let Some(job_id) = record.pet.as_ref().and_then(|p| p.generation.job_id) else {
                continue;
            };
            match expire_job(&self.manager, record.entity_id, job_id, &self.timing).await {
                Ok(true) => reaped = reaped.saturating_add(1),
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    entity_id = %record.entity_id,
                    job_id = %job_id,
                    error = %err,
                    "failed to reap expired job"
                ),
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "expired generation jobs reaped");
        }
        Ok(reaped)
    }

    // -----------------------------------------------------------------------
    // Job task
    // -----------------------------------------------------------------------

    async fn run_job(&self, entity_id: EntityId, job_id: GenerationJobId, pet: &PetRecord) {
        let ceiling = self.timing.timeout();
        let outcome = match timeout(ceiling, self.drive(entity_id, job_id, pet)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Halt::failed(
                GenerationFailure::Timeout,
                format!("generation timed out after {}s", ceiling.as_secs()),
            )),
        };

        let result = match outcome {
            Ok(results) => self.complete(entity_id, job_id, &results).await,
            Err(Halt::Failed { failure, message }) => {
                self.fail(entity_id, job_id, failure, message).await
            }
            Err(Halt::Superseded) => Ok(()),
            Err(Halt::Store(err)) => Err(err),
        };

        if let Err(err) = result {
            tracing::warn!(
                entity_id = %entity_id,
                job_id = %job_id,
                error = %err,
                "generation job could not record its outcome"
            );
        }
    }

    /// Submit, acknowledge, and poll until every variant is delivered.
    async fn drive(
        &self,
        entity_id: EntityId,
        job_id: GenerationJobId,
        pet: &PetRecord,
    ) -> Result<BTreeMap<MediaVariant, String>, Halt> {
        let requests = self
            .prompts
            .render_all(pet, &pet.generation.requested)
            .map_err(|e| Halt::failed(GenerationFailure::Internal, e.to_string()))?;

        let submissions = join_all(requests.iter().map(|r| self.vendor.submit(r))).await;
        let mut outstanding: Vec<(MediaVariant, VendorJobId)> = Vec::with_capacity(requests.len());
        for (request, submission) in requests.iter().zip(submissions) {
            match submission {
                Ok(handle) => outstanding.push((request.variant, handle)),
                Err(err) => {
                    return Err(Halt::failed(
                        GenerationFailure::Vendor,
                        format!("{} submission rejected: {err}", request.variant.key()),
                    ));
                }
            }
        }

        self.transition(entity_id, |pet| mark_generating(pet, job_id))
            .await?;
        tracing::info!(
            entity_id = %entity_id,
            job_id = %job_id,
            vendor = self.vendor.name(),
            submissions = outstanding.len(),
            "generation submitted"
        );

        self.poll_until_done(entity_id, job_id, outstanding).await
    }

    async fn poll_until_done(
        &self,
        entity_id: EntityId,
        job_id: GenerationJobId,
        mut outstanding: Vec<(MediaVariant, VendorJobId)>,
    ) -> Result<BTreeMap<MediaVariant, String>, Halt> {
        let mut results = BTreeMap::new();
        let mut delay = self.timing.poll_interval();
        let mut failures: u32 = 0;

        while !outstanding.is_empty() {
            tokio::time::sleep(jittered(delay, self.timing.jitter_pct)).await;

            let polls = join_all(outstanding.iter().map(|(_, handle)| self.vendor.poll(handle))).await;
            let mut pending = Vec::with_capacity(outstanding.len());
            let mut transient = None;

            for ((variant, handle), poll) in outstanding.into_iter().zip(polls) {
                let poll = match poll {
                    Ok(poll) => poll,
                    Err(err) if err.is_transient() => {
                        transient = Some(err);
                        pending.push((variant, handle));
                        continue;
                    }
                    Err(err) => {
                        return Err(Halt::failed(
                            GenerationFailure::Vendor,
                            format!("polling {} failed: {err}", variant.key()),
                        ));
                    }
                };
                match poll.state {
                    VendorJobState::Succeeded => {
                        let Some(url) = poll.output_url.filter(|u| !u.trim().is_empty()) else {
                            return Err(Halt::failed(
                                GenerationFailure::PartialResult,
                                format!("vendor finished {} without an output", variant.key()),
                            ));
                        };
                        results.insert(variant, url);
                    }
                    VendorJobState::Failed => {
                        let err = VendorError::JobFailed(
                            poll.error.unwrap_or_else(|| "no reason given".to_owned()),
                        );
                        return Err(Halt::failed(
                            GenerationFailure::Vendor,
                            format!("{}: {err}", variant.key()),
                        ));
                    }
                    VendorJobState::Queued | VendorJobState::Running => {
                        pending.push((variant, handle));
                    }
                }
            }
            outstanding = pending;

            if let Some(err) = transient {
                failures = failures.saturating_add(1);
                tracing::warn!(
                    entity_id = %entity_id,
                    job_id = %job_id,
                    failures,
                    error = %err,
                    "transient poll error"
                );
                if failures >= self.timing.max_poll_failures {
                    return Err(Halt::failed(
                        GenerationFailure::PollExhausted,
                        format!("vendor unreachable after {failures} poll attempts: {err}"),
                    ));
                }
            } else {
                failures = 0;
            }

            tracing::debug!(
                entity_id = %entity_id,
                job_id = %job_id,
                done = results.len(),
                remaining = outstanding.len(),
                delay_ms = delay.as_millis(),
                "poll round finished"
            );
            delay = delay.saturating_mul(2).min(self.timing.max_poll_interval());
        }

        Ok(results)
    }

    async fn complete(
        &self,
        entity_id: EntityId,
        job_id: GenerationJobId,
        results: &BTreeMap<MediaVariant, String>,
    ) -> Result<(), CompanionError> {
        let written = self
            .manager
            .mutate(entity_id, |record| {
                complete_job(pet_mut(record)?, job_id, results, Utc::now())?;
                Ok(((), Vec::new()))
            })
            .await;

        match written {
            Ok(_) => {
                tracing::info!(
                    entity_id = %entity_id,
                    job_id = %job_id,
                    variants = results.len(),
                    "generation completed"
                );
                Ok(())
            }
            Err(CompanionError::Pet(PetError::PartialResult { missing })) => {
                let message = format!("vendor returned no output for {}", missing.join(", "));
                self.fail(entity_id, job_id, GenerationFailure::PartialResult, message)
                    .await
            }
            Err(err) if is_superseded(&err) => {
                tracing::debug!(job_id = %job_id, "job superseded before completion");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn fail(
        &self,
        entity_id: EntityId,
        job_id: GenerationJobId,
        failure: GenerationFailure,
        message: String,
    ) -> Result<(), CompanionError> {
        let written = self
            .manager
            .mutate(entity_id, |record| {
                fail_job(pet_mut(record)?, job_id, failure, message.as_str(), Utc::now())?;
                Ok(((), Vec::new()))
            })
            .await;

        match written {
            Ok(_) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    job_id = %job_id,
                    failure = ?failure,
                    error = %message,
                    "generation failed"
                );
                Ok(())
            }
            Err(err) if is_superseded(&err) => {
                tracing::debug!(job_id = %job_id, "job superseded before failure was recorded");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Apply a fenced transition; a stale job halts quietly.
    async fn transition<F>(&self, entity_id: EntityId, mut f: F) -> Result<(), Halt>
    where
        F: FnMut(&mut PetRecord) -> Result<(), PetError> + Send,
    {
        let written = self
            .manager
            .mutate(entity_id, |record| {
                f(pet_mut(record)?)?;
                Ok(((), Vec::new()))
            })
            .await;
        match written {
            Ok(_) => Ok(()),
            Err(err) if is_superseded(&err) => Err(Halt::Superseded),
            Err(err) => Err(Halt::Store(err)),
        }
    }
}

/// Fail `job_id` on `entity_id` if it has outlived the ceiling.
///
/// Returns whether the job was failed by this call.
pub(crate) async fn expire_job(
    manager: &PetManager,
    entity_id: EntityId,
    job_id: GenerationJobId,
    timing: &GenerationConfig,
) -> Result<bool, CompanionError> {
    let ceiling = chrono::Duration::from_std(timing.timeout()).unwrap_or(chrono::Duration::MAX);
    let message = format!("generation timed out after {}s", timing.timeout_secs);

    let written = manager
        .mutate(entity_id, |record| {
            let pet = pet_mut(record)?;
            if !is_expired(&pet.generation, Utc::now(), ceiling) {
                return Ok((false, Vec::new()));
            }
            fail_job(
                pet,
                job_id,
                GenerationFailure::Timeout,
                message.as_str(),
                Utc::now(),
            )?;
            Ok((true, Vec::new()))
        })
        .await;

    match written {
        Ok((_, expired)) => {
            if expired {
                tracing::warn!(entity_id = %entity_id, job_id = %job_id, "expired job forced to failed");
            }
            Ok(expired)
        }
        Err(err) if is_superseded(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

const fn is_superseded(err: &CompanionError) -> bool {
    matches!(
        err,
        CompanionError::Pet(PetError::StaleJob { .. } | PetError::InvalidTransition { .. })
    )
}

/// `delay` plus up to `jitter_pct` percent of random extra.
fn jittered(delay: Duration, jitter_pct: u32) -> Duration {
    let span = delay
        .as_millis()
        .saturating_mul(u128::from(jitter_pct))
        .checked_div(100)
        .unwrap_or(0);
    let span = u64::try_from(span).unwrap_or(u64::MAX);
    if span == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=span);
    delay.saturating_add(Duration::from_millis(extra))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_band() {
        let base = Duration::from_millis(2_000);
        for _ in 0..50 {
            let d = jittered(base, 20);
            assert!(d >= base);
            assert!(d <= Duration::from_millis(2_400));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let base = Duration::from_millis(1_500);
        assert_eq!(jittered(base, 0), base);
    }

    #[test]
    fn superseded_errors() {
        assert!(is_superseded(&CompanionError::Pet(PetError::StaleJob {
            job_id: GenerationJobId::new()
        })));
        assert!(!is_superseded(&CompanionError::Pet(PetError::NotHatched)));
    }
}
