//! Pipeline event emission.
//!
//! The coordinator and the fallback selector report every transition to an
//! [`EventSink`]. Sinks are for observability only; nothing reads them back
//! to make decisions.

mod event;
mod sink;

pub use event::{EventKind, PipelineEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
