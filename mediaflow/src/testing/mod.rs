//! Test doubles for pipelines and providers.
//!
//! This module provides:
//! - A scripted provider that replays canned responses per provider id
//! - Fixed-output and failing stage handlers
//! - A job store that fails chosen job-row writes
//! - A harness wiring a coordinator, breaker and selector over in-memory stores

mod fixtures;
mod mocks;

pub use fixtures::TestHarness;
pub use mocks::{FailingStage, FlakyJobStore, ScriptedProvider, StaticStage};
