//! Event delivery for scale-up decisions.
//!
//! Events are fire-and-forget: recording never fails and never blocks the
//! cycle.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use nodescale_core::PodSpec;

/// Receives one notification per pod per decision.
pub trait EventRecorder: Send + Sync {
    /// `pod` is among those a resize of `group` is meant to host.
    fn triggered_scale_up(&self, pod: &PodSpec, group: &str, current_size: u32, new_size: u32);

    /// No candidate group could host `pod`, so nothing was resized for it.
    fn not_triggered_scale_up(&self, pod: &PodSpec);
}

/// A recorded notification, as kept by [`CollectingRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleUpEvent {
    Triggered {
        pod: String,
        group: String,
        current_size: u32,
        new_size: u32,
    },
    NotTriggered {
        pod: String,
    },
}

impl ScaleUpEvent {
    pub fn pod(&self) -> &str {
        match self {
            ScaleUpEvent::Triggered { pod, .. } | ScaleUpEvent::NotTriggered { pod } => pod,
        }
    }
}

/// Writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRecorder;

impl EventRecorder for LoggingRecorder {
    fn triggered_scale_up(&self, pod: &PodSpec, group: &str, current_size: u32, new_size: u32) {
        info!(
            pod = %pod,
            group,
            current_size,
            new_size,
            "pod triggered scale-up"
        );
    }

    fn not_triggered_scale_up(&self, pod: &PodSpec) {
        info!(pod = %pod, "pod didn't trigger scale-up (it wouldn't fit if a new node is added)");
    }
}

/// Keeps every event in memory, in delivery order.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    events: Mutex<Vec<ScaleUpEvent>>,
}

impl CollectingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScaleUpEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<ScaleUpEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    fn push(&self, event: ScaleUpEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl EventRecorder for CollectingRecorder {
    fn triggered_scale_up(&self, pod: &PodSpec, group: &str, current_size: u32, new_size: u32) {
        self.push(ScaleUpEvent::Triggered {
            pod: pod.key(),
            group: group.to_string(),
            current_size,
            new_size,
        });
    }

    fn not_triggered_scale_up(&self, pod: &PodSpec) {
        self.push(ScaleUpEvent::NotTriggered { pod: pod.key() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_recorder_keeps_order() {
        let recorder = CollectingRecorder::new();
        let a = PodSpec::new("default", "a", 1, 1);
        let b = PodSpec::new("default", "b", 1, 1);
        recorder.not_triggered_scale_up(&a);
        recorder.triggered_scale_up(&b, "us-east-1a/workers", 1, 3);

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ScaleUpEvent::NotTriggered { pod: "default/a".into() });
        assert_eq!(
            events[1],
            ScaleUpEvent::Triggered {
                pod: "default/b".into(),
                group: "us-east-1a/workers".into(),
                current_size: 1,
                new_size: 3,
            }
        );

        assert_eq!(recorder.take().len(), 2);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = ScaleUpEvent::NotTriggered { pod: "ns/p".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "not_triggered");
        assert_eq!(json["pod"], "ns/p");
    }
}
