use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::plan::{Action, ExecutionResult, LogEntry, RunState, StepState};

/// Everything a presentation layer needs to follow a run, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log(LogEntry),
    Steps(StepsSnapshot),
    State(RunState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsSnapshot {
    pub steps: Vec<Action>,
    pub current_index: Option<usize>,
    pub step_states: Vec<StepState>,
    pub results: Vec<ExecutionResult>,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Broadcasts events to every subscriber. Events sent with no subscriber
/// are dropped.
pub struct ChannelSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("progress event dropped, no subscribers");
        }
    }
}

pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanoutSink {
    fn emit(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LogLevel;

    fn log(message: &str) -> ProgressEvent {
        ProgressEvent::Log(LogEntry {
            timestamp: chrono::Utc::now(),
            message: message.into(),
            level: LogLevel::Info,
        })
    }

    #[tokio::test]
    async fn channel_subscribers_see_events_in_order() {
        let sink = ChannelSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(log("first"));
        sink.emit(ProgressEvent::State(RunState::Running));

        match rx.recv().await.unwrap() {
            ProgressEvent::Log(entry) => assert_eq!(entry.message, "first"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), ProgressEvent::State(RunState::Running)));
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let a = Arc::new(ChannelSink::new(4));
        let b = Arc::new(ChannelSink::new(4));
        let (mut rx_a, mut rx_b) = (a.subscribe(), b.subscribe());
        let sinks: Vec<Arc<dyn ProgressSink>> = vec![a.clone(), b.clone(), Arc::new(NoopSink)];
        let fanout = FanoutSink::new(sinks);
        fanout.emit(ProgressEvent::State(RunState::Completed));
        assert!(matches!(rx_a.recv().await.unwrap(), ProgressEvent::State(RunState::Completed)));
        assert!(matches!(rx_b.recv().await.unwrap(), ProgressEvent::State(RunState::Completed)));
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let value = serde_json::to_value(ProgressEvent::State(RunState::PartiallyCompleted)).unwrap();
        assert_eq!(value, serde_json::json!({"event": "state", "payload": "partially_completed"}));
    }
}
