//! Generation job state machine.
//!
//! ```text
//! none|completed|failed --begin_job--> pending
//! pending     --mark_generating-->     generating
//! generating  --complete_job-->        completed   (all variants, atomically)
//! pending|generating --fail_job-->     failed      (no media written)
//! ```
//!
//! Every transition after [`begin_job`] is fenced on the job id: a job that
//! has been superseded (or reaped) gets [`PetError::StaleJob`] and cannot
//! touch the state of its successor.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use companion_types::{
    GenerationFailure, GenerationJobId, GenerationState, GenerationStatus, MediaVariant, PetRecord,
};

use crate::error::PetError;

/// Start a new job.
///
/// Old media stays in place; only the generation fields reset.
///
/// # Errors
///
/// - [`PetError::AlreadyInProgress`] while a job is pending or generating
/// - [`PetError::EmptyRequest`] if `variants` is empty
pub fn begin_job(
    pet: &mut PetRecord,
    job_id: GenerationJobId,
    variants: Vec<MediaVariant>,
    now: DateTime<Utc>,
) -> Result<(), PetError> {
    let status = pet.generation.status;
    if status.is_in_flight() {
        return Err(PetError::AlreadyInProgress { status });
    }
    if variants.is_empty() {
        return Err(PetError::EmptyRequest);
    }

    let mut requested = variants;
    requested.sort_unstable();
    requested.dedup();

    pet.generation = GenerationState {
        status: GenerationStatus::Pending,
        job_id: Some(job_id),
        requested,
        started_at: Some(now),
        completed_at: None,
        error: None,
        failure: None,
    };
    Ok(())
}

/// Move a pending job to `generating` once every submission is acknowledged.
///
/// # Errors
///
/// [`PetError::StaleJob`] if `job_id` is not the current job, or
/// [`PetError::InvalidTransition`] if the job is not pending.
pub fn mark_generating(pet: &mut PetRecord, job_id: GenerationJobId) -> Result<(), PetError> {
    fence(&pet.generation, job_id)?;
    expect_status(
        &pet.generation,
        GenerationStatus::Pending,
        GenerationStatus::Generating,
    )?;
    pet.generation.status = GenerationStatus::Generating;
    Ok(())
}

/// Complete a job, writing every requested variant in one step.
///
/// `results` may carry extra variants; only the requested ones are stored.
///
/// # Errors
///
/// - [`PetError::StaleJob`] if `job_id` is not the current job
/// - [`PetError::InvalidTransition`] if the job is not generating
/// - [`PetError::PartialResult`] if any requested variant is missing; no
///   media is written in that case
pub fn complete_job(
    pet: &mut PetRecord,
    job_id: GenerationJobId,
    results: &BTreeMap<MediaVariant, String>,
    now: DateTime<Utc>,
) -> Result<(), PetError> {
    fence(&pet.generation, job_id)?;
    expect_status(
        &pet.generation,
        GenerationStatus::Generating,
        GenerationStatus::Completed,
    )?;

    let missing: Vec<String> = pet
        .generation
        .requested
        .iter()
        .filter(|v| results.get(v).is_none_or(|url| url.trim().is_empty()))
        .map(|v| v.key())
        .collect();
    if !missing.is_empty() {
        return Err(PetError::PartialResult { missing });
    }

    for variant in &pet.generation.requested {
        if let Some(url) = results.get(variant) {
            pet.media.set(*variant, url.clone());
        }
    }
    pet.generation.status = GenerationStatus::Completed;
    pet.generation.completed_at = Some(now);
    pet.generation.error = None;
    pet.generation.failure = None;
    Ok(())
}

/// Fail an in-flight job. Media is never touched.
///
/// # Errors
///
/// [`PetError::StaleJob`] if `job_id` is not the current job, or
/// [`PetError::InvalidTransition`] if the job already finished.
pub fn fail_job(
    pet: &mut PetRecord,
    job_id: GenerationJobId,
    failure: GenerationFailure,
    error: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<(), PetError> {
    fence(&pet.generation, job_id)?;
    let from = pet.generation.status;
    if !from.is_in_flight() {
        return Err(PetError::InvalidTransition {
            from,
            to: GenerationStatus::Failed,
        });
    }
    pet.generation.status = GenerationStatus::Failed;
    pet.generation.completed_at = Some(now);
    pet.generation.error = Some(error.into());
    pet.generation.failure = Some(failure);
    Ok(())
}

/// Whether an in-flight job has outlived `ceiling`.
pub fn is_expired(state: &GenerationState, now: DateTime<Utc>, ceiling: Duration) -> bool {
    if !state.status.is_in_flight() {
        return false;
    }
    state
        .started_at
        .and_then(|started| started.checked_add_signed(ceiling))
        .is_some_and(|deadline| deadline <= now)
}

/// Time elapsed since the current job started, floored at zero.
pub fn elapsed(state: &GenerationState, now: DateTime<Utc>) -> Option<Duration> {
    state
        .started_at
        .map(|started| now.signed_duration_since(started).max(Duration::zero()))
}

fn fence(state: &GenerationState, job_id: GenerationJobId) -> Result<(), PetError> {
    if state.job_id == Some(job_id) {
        Ok(())
    } else {
        Err(PetError::StaleJob { job_id })
    }
}

fn expect_status(
    state: &GenerationState,
    expected: GenerationStatus,
    to: GenerationStatus,
) -> Result<(), PetError> {
    if state.status == expected {
        Ok(())
    } else {
        Err(PetError::InvalidTransition {
            from: state.status,
            to,
        })
    }
}
