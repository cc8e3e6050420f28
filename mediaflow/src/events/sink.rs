//! Event sink trait and implementations.

use super::{EventKind, PipelineEvent};
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Receives pipeline events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: PipelineEvent);

    /// Emits without awaiting. Must never fail or block.
    fn try_emit(&self, event: PipelineEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {}

    fn try_emit(&self, _event: PipelineEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level` (DEBUG or INFO).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log_event(&self, event: &PipelineEvent) {
        let job_id = event.job_id.map(|id| id.to_string());
        let step = event.step.map(|s| s.as_str());
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.kind,
                job_id = ?job_id,
                step = ?step,
                provider = ?event.provider,
                event_data = ?event.data,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event_type = %event.kind,
                job_id = ?job_id,
                step = ?step,
                provider = ?event.provider,
                event_data = ?event.data,
                "Event: {}", event.kind
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }
}

/// Keeps every event in memory. Used by tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Collected event kinds in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(PipelineEvent::new(EventKind::StepStarted)).await;
        let sink = LoggingEventSink::new(Level::DEBUG);
        sink.emit(PipelineEvent::for_provider(EventKind::ProviderFailed, "kling"))
            .await;
        sink.try_emit(PipelineEvent::new(EventKind::PipelineCompleted));
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_kind() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(PipelineEvent::new(EventKind::StepStarted)).await;
        sink.try_emit(PipelineEvent::for_provider(EventKind::ProviderSkipped, "gen4_image"));
        sink.emit(PipelineEvent::new(EventKind::StepCompleted)).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.kinds(),
            vec![EventKind::StepStarted, EventKind::ProviderSkipped, EventKind::StepCompleted]
        );
        let skipped = sink.of_kind(EventKind::ProviderSkipped);
        assert_eq!(skipped[0].provider.as_deref(), Some("gen4_image"));

        sink.clear();
        assert!(sink.is_empty());
    }
}
