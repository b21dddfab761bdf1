//! Stage event sinks
//!
//! The orchestrator emits one event per completed stage. Sinks are
//! fire-and-forget; a slow sink must never stall the pipeline.

use parking_lot::Mutex;
use tracing::info;
use veridex_contracts::StageEvent;

/// Fire-and-forget event sink.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: StageEvent);
}

/// Sink that logs stage events through tracing.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: StageEvent) {
        info!(
            "stage {} ({}) finished in {}ms, {} tokens, {} warnings",
            event.stage.number(),
            event.name,
            event.duration_ms,
            event.tokens_used,
            event.warnings_count
        );
    }
}

/// Sink that records events for test assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: StageEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridex_contracts::Stage;

    #[test]
    fn recording_sink_collects_events() {
        let sink = RecordingEventSink::new();
        sink.emit(StageEvent {
            stage: Stage::Extraction,
            name: "extraction".to_string(),
            duration_ms: 12,
            tokens_used: 400,
            warnings_count: 0,
        });
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, Stage::Extraction);
    }
}
