//! # Mediaflow
//!
//! Resumable multi-stage media generation with tiered provider fallback.
//!
//! Mediaflow tracks each content-generation job through an ordered step
//! ledger (audio, images, video, merge, lip-sync) and picks providers for
//! every step from a tier policy, with:
//!
//! - **Durable step ledger**: per-step status, timestamps and retry counts so
//!   work survives restarts and partial failures
//! - **Resume cursor**: the next actionable step is always recomputed from the
//!   ledger, in template order
//! - **Atomic step claims**: two workers never run the same step
//! - **Circuit breaking**: providers failing repeatedly inside a sliding window
//!   are skipped until they age out
//! - **Ordered fallback**: candidates are tried in policy order with
//!   exponential backoff and a full attempt trail
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediaflow::prelude::*;
//!
//! let coordinator = Arc::new(PipelineCoordinator::new(store, CoordinatorConfig::default()));
//! let selector = Arc::new(FallbackSelector::new(
//!     Arc::new(TierPolicyTable::builtin()),
//!     Arc::new(CircuitBreaker::default()),
//!     SelectorConfig::default(),
//! ));
//! let generation = Arc::new(GenerationStage::new(selector, registry));
//!
//! let runner = StageRunner::new(coordinator.clone(), StageTemplate::standard())
//!     .with_handler_for([StepName::Audio, StepName::Images, StepName::Video], generation.clone())
//!     .with_handler(StepName::Merge, merge_stage)
//!     .with_handler(StepName::LipSync, generation);
//!
//! // Called by a queue worker per message.
//! match runner.advance(job_id).await? {
//!     AdvanceOutcome::Completed { next: Some(step), .. } => enqueue(job_id, step),
//!     AdvanceOutcome::Failed { can_resume: true, .. } => enqueue_with_backoff(job_id),
//!     _ => {}
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod providers;
pub mod resilience;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        BreakerConfig, CoordinatorConfig, MediaflowConfig, SelectorConfig, StepRetryPolicy,
    };
    pub use crate::core::{Capability, CandidateSlot, JobStatus, ProviderStatus, StepName, StepStatus, Tier};
    pub use crate::errors::{
        ExhaustionError, MediaflowError, PersistenceError, ProviderError, SelectionError,
        StepOrderError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::ledger::{Job, PipelineState, PipelineStepRecord, StageTemplate, StepData};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        AdvanceOutcome, GenerationStage, PipelineCoordinator, PipelineStatusReport, StageHandler,
        StageRunner,
    };
    pub use crate::policy::{GenerationParams, TierPolicyEntry, TierPolicyTable};
    pub use crate::providers::{
        FnProvider, GenerationProvider, ProviderRegistry, ProviderRequest, ProviderResponse,
    };
    pub use crate::resilience::{
        AttemptOutcome, AttemptRecord, CircuitBreaker, FallbackResult, FallbackSelector,
        HealthStore, InMemoryHealthStore,
    };
    pub use crate::store::{InMemoryJobStore, JobStore, RetryingStore};
    pub use std::sync::Arc;
}
