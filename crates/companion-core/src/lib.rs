//! Pet record manager, generation orchestrator, and status poller for the
//! companion lifecycle engine.
//!
//! This crate owns every caller-facing operation. Pure transitions come
//! from `companion-pets`; this crate reads the record, applies them, and
//! writes back with a compare-and-swap so concurrent callers never
//! overwrite each other.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `companion-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`CompanionError`] and its [`ErrorKind`] classification.
//! - [`manager`] -- [`PetManager`]: hatch, customize, happiness, tokens.
//! - [`orchestrator`] -- [`Orchestrator`]: generation jobs and the expiry
//!   sweeper.
//! - [`poller`] -- [`StatusPoller`]: status snapshots with ETA buckets.
//! - [`prompt`] -- `minijinja` prompt rendering per media variant.
//! - [`vendor`] -- [`MediaVendor`] trait and HTTP backends.

pub mod config;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod poller;
pub mod prompt;
pub mod vendor;

pub use config::CompanionConfig;
pub use error::{CompanionError, ErrorKind};
pub use manager::{AwardReport, HappinessReport, PetManager};
pub use orchestrator::Orchestrator;
pub use poller::StatusPoller;
pub use prompt::PromptEngine;
pub use vendor::{MediaVendor, VendorBackend, create_vendor};
