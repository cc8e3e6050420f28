//! The durable step ledger.
//!
//! This module provides:
//! - The versioned stage template jobs are initialized from
//! - Per-step ledger rows and their state machine
//! - The job row with its pipeline state and typed stage outputs

mod job;
mod step;
mod template;

pub use job::{Job, PipelinePhase, PipelineState};
pub use step::{PipelineStepRecord, StepData};
pub use template::StageTemplate;
