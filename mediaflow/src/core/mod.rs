//! Core domain enums shared across the crate.
//!
//! This module contains:
//! - Step names, step status and the aggregate job status
//! - Capabilities, subscription tiers and provider result status
//! - Candidate slots used to label which policy position served a request

mod capability;
mod status;

pub use capability::{Capability, CandidateSlot, ProviderStatus, Tier};
pub use status::{JobStatus, StepName, StepStatus};
