//! Tier policy: which providers serve a capability for a subscription tier.
//!
//! The table is loaded once and never mutated. Gaps are reported at startup
//! and degrade to caller-supplied defaults instead of failing the process.

mod builtin;
mod table;

pub use table::{GenerationParams, PolicyReport, TierPolicyEntry, TierPolicyTable};
