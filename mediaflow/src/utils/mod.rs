//! Time helpers shared by the ledger and the circuit breaker.
//!
//! Everything that needs "now" takes a [`Clock`] so window arithmetic can be
//! driven deterministically in tests.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
