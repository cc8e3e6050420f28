//! Log output setup.
//!
//! The library only emits through `tracing`; binaries embedding it call
//! [`init_tracing`] once at startup.

mod logging;

pub use logging::{init_tracing, LogFormat, LoggingConfig};
