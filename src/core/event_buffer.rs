// src/core/event_buffer.rs

//! The Event Buffer contract (spec §6), consumed by the Event Sender
//! Worker. Event-batch *construction* and compaction are out of scope per
//! spec §1; `DefaultEventBuffer` implements just enough — enqueue plus
//! drain-to-text — to exercise the worker's trigger and back-pressure
//! contract end to end.

use crate::core::user::User;
use crate::core::value::{EvaluationReason, FlagValue};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

#[async_trait]
pub trait EventBuffer: Send + Sync {
    /// Returns a serialized batch and clears it, or `None` if empty.
    async fn drain_batch(&self) -> Option<String>;

    async fn enqueue_evaluation(
        &self,
        key: &str,
        value: &FlagValue,
        variation_index: Option<i64>,
        reason: Option<&EvaluationReason>,
        default: &FlagValue,
    );

    async fn enqueue_track(&self, name: &str, data: Option<JsonValue>, metric: Option<f64>, has_metric: bool);

    async fn enqueue_identify(&self, user: &User);
}

#[derive(Default)]
pub struct DefaultEventBuffer {
    events: Mutex<Vec<JsonValue>>,
}

impl DefaultEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBuffer for DefaultEventBuffer {
    async fn drain_batch(&self) -> Option<String> {
        let mut guard = self.events.lock().await;
        if guard.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut *guard);
        serde_json::to_string(&batch).ok()
    }

    async fn enqueue_evaluation(
        &self,
        key: &str,
        value: &FlagValue,
        variation_index: Option<i64>,
        reason: Option<&EvaluationReason>,
        default: &FlagValue,
    ) {
        let event = serde_json::json!({
            "kind": "feature",
            "key": key,
            "value": value,
            "variation": variation_index,
            "reason": reason,
            "default": default,
        });
        self.events.lock().await.push(event);
    }

    async fn enqueue_track(&self, name: &str, data: Option<JsonValue>, metric: Option<f64>, has_metric: bool) {
        let event = serde_json::json!({
            "kind": "custom",
            "key": name,
            "data": data,
            "metricValue": if has_metric { metric } else { None },
        });
        self.events.lock().await.push(event);
    }

    async fn enqueue_identify(&self, user: &User) {
        let event = serde_json::json!({
            "kind": "identify",
            "key": user.key,
        });
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_batch_is_none_when_empty() {
        let buffer = DefaultEventBuffer::new();
        assert!(buffer.drain_batch().await.is_none());
    }

    #[tokio::test]
    async fn drain_batch_returns_and_clears_queued_events() {
        let buffer = DefaultEventBuffer::new();
        buffer
            .enqueue_evaluation("alpha", &FlagValue::Bool(true), Some(0), None, &FlagValue::Bool(false))
            .await;
        let batch = buffer.drain_batch().await;
        assert!(batch.is_some());
        assert!(buffer.drain_batch().await.is_none());
    }
}
