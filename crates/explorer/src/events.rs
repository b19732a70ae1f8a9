//! Pipeline event bus.
//!
//! Pub/sub over a Tokio broadcast channel. The delivery task publishes,
//! UI-side consumers subscribe; publishing with no subscribers is not an
//! error. Payloads ride behind `Arc` so a slow subscriber never forces a
//! deep copy.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use correlation::{
    CompiledText, OutputIndex, PreprocessedSource, SourceLocation, SourceRemoteMatched,
    SourceSettings,
};

use crate::error::ExplorerError;

const CHANNEL_CAPACITY: usize = 256;

/// Everything the pipeline tells the outside world.
#[derive(Debug, Clone)]
pub enum ExplorerEvent {
    /// A source unit was selected or its settings changed.
    SourceSelected(Arc<SourceSettings>),
    /// Matching finished for the active unit.
    RemoteMatched(Arc<SourceRemoteMatched>),
    /// Preprocessing finished (or was skipped) for the active unit.
    Preprocessed(Arc<PreprocessedSource>),
    /// A compile request is in flight; consumers typically show a
    /// "compiling…" placeholder until `Compiled` or `PipelineError` lands.
    CompileStarted { source_name: String },
    /// A compile result arrived and the location indices were rebuilt.
    Compiled {
        text: Arc<CompiledText>,
        index: Arc<OutputIndex>,
    },
    /// Caret movement changed the highlighted output ranges.
    HighlightsChanged {
        locations: Vec<SourceLocation>,
        ranges: Vec<(usize, usize)>,
    },
    /// A run failed. Cancellations never appear here.
    PipelineError(Arc<ExplorerError>),
    /// All cached remote state was dropped.
    Reset,
}

impl ExplorerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SourceSelected(_) => "source_selected",
            Self::RemoteMatched(_) => "remote_matched",
            Self::Preprocessed(_) => "preprocessed",
            Self::CompileStarted { .. } => "compile_started",
            Self::Compiled { .. } => "compiled",
            Self::HighlightsChanged { .. } => "highlights_changed",
            Self::PipelineError(_) => "pipeline_error",
            Self::Reset => "reset",
        }
    }
}

/// Broadcast bus carrying [`ExplorerEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<ExplorerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish to all subscribers. No receivers is fine.
    pub fn publish(&self, event: ExplorerEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(ExplorerEvent::Reset);

        assert_eq!(rx1.recv().await.unwrap().event_type(), "reset");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "reset");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(ExplorerEvent::CompileStarted {
            source_name: "a.cpp".into(),
        });
    }

    #[test]
    fn event_types_are_distinct() {
        let a = ExplorerEvent::Reset;
        let b = ExplorerEvent::CompileStarted {
            source_name: "a.cpp".into(),
        };
        assert_ne!(a.event_type(), b.event_type());
    }
}
