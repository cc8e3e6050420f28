//! Provider resilience: circuit breaking, ordered fallback and retry.
//!
//! ## Circuit breaker
//!
//! Failures are counted per provider inside a sliding window. Once the
//! count reaches the threshold the provider is skipped until old failures
//! age out or a success resets it. The window lives behind [`HealthStore`]
//! so several workers can share it.
//!
//! ## Fallback
//!
//! [`FallbackSelector`] walks an ordered candidate list, skipping open
//! circuits, backing off between failed candidates and recording every
//! attempt.

mod attempt;
mod breaker;
mod health;
mod retry;
mod selector;

pub use attempt::{AttemptOutcome, AttemptRecord, FallbackResult};
pub use breaker::CircuitBreaker;
pub use health::{HealthStore, InMemoryHealthStore};
pub use retry::{with_retry_if, BackoffStrategy, JitterStrategy, RetryConfig};
pub use selector::FallbackSelector;
