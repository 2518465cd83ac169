//! Integration tests for the generation pipeline.
//!
//! A scripted vendor stands in for the HTTP backends and tokio time is
//! paused, so backoff sleeps and the timeout ceiling resolve instantly
//! while keeping their ordering.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use companion_core::config::GenerationConfig;
use companion_core::vendor::{MediaRequest, MediaVendor, VendorError, VendorJobId, VendorJobState, VendorPoll};
use companion_core::{
    CompanionError, ErrorKind, Orchestrator, PetManager, PromptEngine, StatusPoller,
};
use companion_db::MemoryStore;
use companion_pets::generation::begin_job;
use companion_pets::{EconomyConfig, PetError, ScoringConfig, pet_mut};
use companion_types::{
    EntityId, GenerationFailure, GenerationPreset, GenerationStatus, HatchOptions, MediaKind,
    MediaSet, MediaVariant, Mood, RelationshipStats,
};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Scripted vendor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    /// Running for `rounds` polls, then succeeded.
    Succeed { rounds: u32 },
    /// Running forever.
    Hang,
    /// Every submission is rejected.
    RejectSubmit,
    /// Succeeds, but the named variant comes back without a URL.
    DropOutput(String),
    /// The vendor reports failure on first poll.
    VendorFails,
    /// `errors` transport errors per handle, then succeeded.
    Flaky { errors: u32 },
    /// Every poll is a transport error.
    Unreachable,
    /// Every poll answers with an unparseable body.
    Malformed,
    /// Every poll is rejected with the given HTTP status.
    PollRejected(u16),
    /// Submissions never return.
    Stalled,
}

struct ScriptedVendor {
    tag: String,
    script: Script,
    polls: Mutex<HashMap<String, u32>>,
}

impl ScriptedVendor {
    fn new(tag: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_owned(),
            script,
            polls: Mutex::new(HashMap::new()),
        })
    }

    fn succeeded(&self, handle: &str) -> VendorPoll {
        VendorPoll {
            state: VendorJobState::Succeeded,
            output_url: Some(format!("https://cdn.test/{}/{handle}", self.tag)),
            error: None,
        }
    }

    const fn running() -> VendorPoll {
        VendorPoll {
            state: VendorJobState::Running,
            output_url: None,
            error: None,
        }
    }

    async fn total_polls(&self) -> u32 {
        self.polls.lock().await.values().copied().sum()
    }
}

#[async_trait::async_trait]
impl MediaVendor for ScriptedVendor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError> {
        assert!(!request.prompt.is_empty());
        if matches!(self.script, Script::Stalled) {
            std::future::pending::<()>().await;
        }
        if matches!(self.script, Script::RejectSubmit) {
            return Err(VendorError::Rejected {
                status: 400,
                body: "quota exceeded".to_owned(),
            });
        }
        Ok(VendorJobId(request.variant.key()))
    }

    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError> {
        let seen = {
            let mut polls = self.polls.lock().await;
            let count = polls.entry(job.0.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };

        match &self.script {
            Script::Succeed { rounds } if seen <= *rounds => Ok(Self::running()),
            Script::Succeed { .. } | Script::RejectSubmit | Script::Stalled => {
                Ok(self.succeeded(&job.0))
            }
            Script::Hang => Ok(Self::running()),
            Script::DropOutput(key) if *key == job.0 => Ok(VendorPoll {
                state: VendorJobState::Succeeded,
                output_url: None,
                error: None,
            }),
            Script::DropOutput(_) => Ok(self.succeeded(&job.0)),
            Script::VendorFails => Ok(VendorPoll {
                state: VendorJobState::Failed,
                output_url: None,
                error: Some("content policy".to_owned()),
            }),
            Script::Flaky { errors } if seen <= *errors => {
                Err(VendorError::Transport("connection reset".to_owned()))
            }
            Script::Flaky { .. } => Ok(self.succeeded(&job.0)),
            Script::Unreachable => Err(VendorError::Transport("connection refused".to_owned())),
            Script::Malformed => Err(VendorError::Malformed(
                "unknown job status: teleporting".to_owned(),
            )),
            Script::PollRejected(status) => Err(VendorError::Rejected {
                status: *status,
                body: "no such job".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn manager() -> Arc<PetManager> {
    Arc::new(PetManager::new(
        Arc::new(MemoryStore::new()),
        ScoringConfig::default(),
        EconomyConfig::default(),
        8,
    ))
}

fn orchestrator(manager: &Arc<PetManager>, vendor: Arc<ScriptedVendor>) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(manager),
        vendor,
        Arc::new(PromptEngine::new().unwrap()),
        GenerationConfig::default(),
    )
}

fn poller(manager: &Arc<PetManager>) -> StatusPoller {
    StatusPoller::new(Arc::clone(manager), GenerationConfig::default())
}

async fn hatched(manager: &PetManager) -> EntityId {
    let id = EntityId::new();
    manager.register_entity(id).await.unwrap();
    manager
        .hatch(id, &HatchOptions::default(), &RelationshipStats::new(80, 70, 90, 60))
        .await
        .unwrap();
    id
}

async fn wait(poller: &StatusPoller, id: EntityId) -> companion_types::GenerationStatusView {
    poller
        .wait_for_terminal(id, Duration::from_secs(1), Duration::from_secs(900))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn job_completes_with_every_variant() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Succeed { rounds: 2 }));

    let started = orch.start_generation(id, GenerationPreset::All).await.unwrap();
    assert_eq!(started.status, GenerationStatus::Pending);
    assert_eq!(started.requested.len(), 8);

    let done = wait(&poller(&m), id).await;
    assert_eq!(done.status, GenerationStatus::Completed);
    assert_eq!(done.estimated_time_remaining, None);
    assert!(done.completed_at.is_some());

    let pet = m.get_pet(id).await.unwrap();
    let all = MediaVariant::for_preset(GenerationPreset::All);
    assert!(pet.media.has_all(&all));
    assert_eq!(
        pet.media.get(MediaVariant::new(Mood::Happy, MediaKind::Image)).map(String::as_str),
        Some("https://cdn.test/v1/happy_image")
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_admit_exactly_one() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Hang));

    let (a, b) = tokio::join!(
        orch.start_generation(id, GenerationPreset::Images),
        orch.start_generation(id, GenerationPreset::Videos),
    );

    let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1);
    let err = a.err().or(b.err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(matches!(
        err,
        CompanionError::Pet(PetError::AlreadyInProgress { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn hung_vendor_times_out_without_media() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Hang));

    orch.start_generation(id, GenerationPreset::All).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::Timeout));
    assert!(done.error.unwrap().contains("timed out"));
    assert_eq!(m.get_pet(id).await.unwrap().media, MediaSet::default());
}

#[tokio::test(start_paused = true)]
async fn partial_result_fails_the_job() {
    let m = manager();
    let id = hatched(&m).await;
    let vendor = ScriptedVendor::new("v1", Script::DropOutput("sad_video".to_owned()));
    let orch = orchestrator(&m, vendor);

    orch.start_generation(id, GenerationPreset::All).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::PartialResult));
    assert_eq!(m.get_pet(id).await.unwrap().media, MediaSet::default());
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_fails_immediately() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::RejectSubmit));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::Vendor));
    assert!(done.error.unwrap().contains("quota exceeded"));
}

#[tokio::test(start_paused = true)]
async fn vendor_reported_failure_is_recorded() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::VendorFails));

    orch.start_generation(id, GenerationPreset::Videos).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::Vendor));
    assert!(done.error.unwrap().contains("content policy"));
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Flaky { errors: 3 }));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;
    assert_eq!(done.status, GenerationStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn unreachable_vendor_exhausts_retries() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Unreachable));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::PollExhausted));
}

#[tokio::test(start_paused = true)]
async fn malformed_poll_fails_without_retry() {
    let m = manager();
    let id = hatched(&m).await;
    let vendor = ScriptedVendor::new("v1", Script::Malformed);
    let orch = orchestrator(&m, Arc::clone(&vendor));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::Vendor));
    assert!(done.error.unwrap().contains("teleporting"));
    // One round: each of the four image jobs polled once.
    assert_eq!(vendor.total_polls().await, 4);
    assert_eq!(m.get_pet(id).await.unwrap().media, MediaSet::default());
}

#[tokio::test(start_paused = true)]
async fn client_rejected_poll_fails_without_retry() {
    let m = manager();
    let id = hatched(&m).await;
    let vendor = ScriptedVendor::new("v1", Script::PollRejected(404));
    let orch = orchestrator(&m, Arc::clone(&vendor));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::Vendor));
    assert!(done.error.unwrap().contains("404"));
    assert_eq!(vendor.total_polls().await, 4);
}

#[tokio::test(start_paused = true)]
async fn server_rejected_polls_are_retried_until_exhausted() {
    let m = manager();
    let id = hatched(&m).await;
    let vendor = ScriptedVendor::new("v1", Script::PollRejected(503));
    let orch = orchestrator(&m, Arc::clone(&vendor));

    orch.start_generation(id, GenerationPreset::Images).await.unwrap();
    let done = wait(&poller(&m), id).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.failure, Some(GenerationFailure::PollExhausted));
    // Default max_poll_failures rounds of four polls.
    assert_eq!(vendor.total_polls().await, 20);
}

#[tokio::test(start_paused = true)]
async fn stalled_vendor_does_not_block_other_entities() {
    let m = manager();
    let stuck = hatched(&m).await;
    let stalled = orchestrator(&m, ScriptedVendor::new("slow", Script::Stalled));
    stalled.start_generation(stuck, GenerationPreset::All).await.unwrap();

    let other = EntityId::new();
    m.register_entity(other).await.unwrap();
    m.hatch(other, &HatchOptions::default(), &RelationshipStats::new(40, 40, 40, 40))
        .await
        .unwrap();
    let report = m
        .update_happiness(other, &RelationshipStats::new(60, 60, 60, 60))
        .await
        .unwrap();
    assert_eq!(report.pet.happiness, 60);
    let award = m.award_tokens(other, 15, "check_in").await.unwrap();
    assert_eq!(award.outcome.new_tokens, 15);

    let healthy = orchestrator(&m, ScriptedVendor::new("fast", Script::Succeed { rounds: 1 }));
    healthy.start_generation(other, GenerationPreset::Images).await.unwrap();
    let done = poller(&m)
        .wait_for_terminal(other, Duration::from_secs(1), Duration::from_secs(120))
        .await
        .unwrap();
    assert_eq!(done.status, GenerationStatus::Completed);

    let blocked = poller(&m).get_status(stuck).await.unwrap();
    assert_eq!(blocked.status, GenerationStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn regeneration_keeps_old_media_until_success() {
    let m = manager();
    let id = hatched(&m).await;
    let p = poller(&m);

    let first = orchestrator(&m, ScriptedVendor::new("v1", Script::Succeed { rounds: 0 }));
    first.start_generation(id, GenerationPreset::Images).await.unwrap();
    assert_eq!(wait(&p, id).await.status, GenerationStatus::Completed);
    let old_media = m.get_pet(id).await.unwrap().media;

    let failing = orchestrator(&m, ScriptedVendor::new("v2", Script::VendorFails));
    failing.start_generation(id, GenerationPreset::Images).await.unwrap();
    assert_eq!(m.get_pet(id).await.unwrap().media, old_media);
    assert_eq!(wait(&p, id).await.status, GenerationStatus::Failed);
    assert_eq!(m.get_pet(id).await.unwrap().media, old_media);

    let second = orchestrator(&m, ScriptedVendor::new("v2", Script::Succeed { rounds: 1 }));
    second.start_generation(id, GenerationPreset::Images).await.unwrap();
    assert_eq!(wait(&p, id).await.status, GenerationStatus::Completed);
    let new_media = m.get_pet(id).await.unwrap().media;
    assert_eq!(
        new_media.get(MediaVariant::new(Mood::Sad, MediaKind::Image)).map(String::as_str),
        Some("https://cdn.test/v2/sad_image")
    );
}

#[tokio::test(start_paused = true)]
async fn awards_during_generation_are_not_lost() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Succeed { rounds: 3 }));

    orch.start_generation(id, GenerationPreset::All).await.unwrap();
    m.award_tokens(id, 7, "check_in").await.unwrap();
    m.update_happiness(id, &RelationshipStats::new(90, 90, 90, 90))
        .await
        .unwrap();

    assert_eq!(wait(&poller(&m), id).await.status, GenerationStatus::Completed);
    let pet = m.get_pet(id).await.unwrap();
    assert_eq!(pet.evolution_tokens, 7);
    assert_eq!(pet.happiness, 90);
    assert!(m.audit(id).await.unwrap().is_balanced());
}

#[tokio::test(start_paused = true)]
async fn start_requires_hatched_pet() {
    let m = manager();
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Hang));

    let unknown = orch.start_generation(EntityId::new(), GenerationPreset::All).await;
    assert_eq!(unknown.unwrap_err().kind(), ErrorKind::NotFound);

    let id = EntityId::new();
    m.register_entity(id).await.unwrap();
    let unhatched = orch.start_generation(id, GenerationPreset::All).await;
    assert!(matches!(
        unhatched,
        Err(CompanionError::Pet(PetError::NotHatched))
    ));
}

/// Put a job in flight that started well before the ceiling, as if the
/// process had restarted mid-job.
async fn orphan_job(m: &PetManager, id: EntityId) {
    let long_ago = Utc::now()
        .checked_sub_signed(chrono::Duration::seconds(700))
        .unwrap();
    m.mutate(id, |record| {
        begin_job(
            pet_mut(record)?,
            companion_types::GenerationJobId::new(),
            MediaVariant::for_preset(GenerationPreset::Images),
            long_ago,
        )?;
        Ok(((), Vec::new()))
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn sweeper_fails_orphaned_jobs() {
    let m = manager();
    let id = hatched(&m).await;
    let fresh = hatched(&m).await;
    orphan_job(&m, id).await;

    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Hang));
    orch.start_generation(fresh, GenerationPreset::Images).await.unwrap();

    assert_eq!(orch.reap_expired().await.unwrap(), 1);
    let pet = m.get_pet(id).await.unwrap();
    assert_eq!(pet.generation.status, GenerationStatus::Failed);
    assert_eq!(pet.generation.failure, Some(GenerationFailure::Timeout));

    let other = m.get_pet(fresh).await.unwrap();
    assert!(other.generation.status.is_in_flight());
    assert_eq!(orch.reap_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn status_read_expires_stuck_job() {
    let m = manager();
    let id = hatched(&m).await;
    orphan_job(&m, id).await;

    let view = poller(&m).get_status(id).await.unwrap();
    assert_eq!(view.status, GenerationStatus::Failed);
    assert_eq!(view.failure, Some(GenerationFailure::Timeout));
    assert_eq!(view.estimated_time_remaining, None);
}

#[tokio::test(start_paused = true)]
async fn wait_gives_up_after_max_wait() {
    let m = manager();
    let id = hatched(&m).await;
    let orch = orchestrator(&m, ScriptedVendor::new("v1", Script::Hang));
    orch.start_generation(id, GenerationPreset::Images).await.unwrap();

    let result = poller(&m)
        .wait_for_terminal(id, Duration::from_secs(1), Duration::from_secs(10))
        .await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn status_before_any_job_is_none() {
    let m = manager();
    let id = hatched(&m).await;
    let view = poller(&m).get_status(id).await.unwrap();
    assert_eq!(view.status, GenerationStatus::None);
    assert_eq!(view.job_id, None);
    assert_eq!(view.estimated_time_remaining, None);
}
