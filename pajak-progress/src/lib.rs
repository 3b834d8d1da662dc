#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

pub type BatchId = String;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventStatus {
    Processing,
    OcrProcessing,
    Completed,
    Error,
}

/// Push events fanned out to WebSocket subscribers. The wire shapes follow
/// the public API, hence the camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    BatchProgress {
        status: String,
        total_files: usize,
        processed_files: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percentage: Option<f64>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    FileProgress {
        filename: String,
        file_index: usize,
        total_files: usize,
        status: FileEventStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processing_time: Option<f64>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    BatchComplete {
        status: String,
        success_rate: f64,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    BatchError { error: String, message: String },
}

impl ProgressEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::BatchComplete { .. } | ProgressEvent::BatchError { .. }
        )
    }
}

/// Fan-out channel keyed by batch id. Subscribers may come and go at any
/// time; a slow subscriber lags and loses the oldest events instead of
/// blocking the producer.
#[derive(Default)]
pub struct ProgressBus {
    channels: RwLock<HashMap<BatchId, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn subscribe(&self, batch_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut guard = self.channels.write().await;
        guard
            .entry(batch_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishing without subscribers is a no-op, not an error.
    pub async fn publish(&self, batch_id: &str, event: ProgressEvent) {
        let sender = {
            let guard = self.channels.read().await;
            guard.get(batch_id).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    /// Drops the channel for a finished batch. Existing receivers drain
    /// whatever was already sent and then observe a closed stream.
    pub async fn close(&self, batch_id: &str) {
        self.channels.write().await.remove(batch_id);
    }

    pub async fn active_channels(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete_event() -> ProgressEvent {
        ProgressEvent::BatchComplete {
            status: "completed".into(),
            success_rate: 100.0,
            message: "done".into(),
        }
    }

    #[tokio::test]
    async fn events_reach_subscribers_in_order() {
        let bus = ProgressBus::default();
        let mut receiver = bus.subscribe("batch-1").await;

        bus.publish(
            "batch-1",
            ProgressEvent::BatchProgress {
                status: "processing".into(),
                total_files: 2,
                processed_files: 1,
                progress_percentage: Some(50.0),
                message: "halfway".into(),
            },
        )
        .await;
        bus.publish("batch-1", complete_event()).await;

        let first = receiver.recv().await.expect("first event");
        assert!(matches!(first, ProgressEvent::BatchProgress { .. }));
        let second = receiver.recv().await.expect("second event");
        assert!(second.is_terminal());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_silent() {
        let bus = ProgressBus::default();
        bus.publish("batch-unknown", complete_event()).await;
        assert_eq!(bus.active_channels().await, 0);
    }

    #[tokio::test]
    async fn cross_batch_events_do_not_leak() {
        let bus = ProgressBus::default();
        let mut one = bus.subscribe("batch-1").await;
        let _two = bus.subscribe("batch-2").await;

        bus.publish("batch-2", complete_event()).await;
        bus.publish("batch-1", complete_event()).await;

        let event = one.recv().await.expect("event");
        assert!(event.is_terminal());
        assert!(one.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let bus = ProgressBus::default();
        let mut receiver = bus.subscribe("batch-1").await;
        bus.publish("batch-1", complete_event()).await;
        bus.close("batch-1").await;

        assert!(receiver.recv().await.is_ok());
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn events_serialize_with_wire_field_names() {
        let event = ProgressEvent::FileProgress {
            filename: "faktur.pdf".into(),
            file_index: 0,
            total_files: 3,
            status: FileEventStatus::OcrProcessing,
            confidence: None,
            processing_time: None,
            message: "running OCR".into(),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "file_progress");
        assert_eq!(value["fileIndex"], 0);
        assert_eq!(value["totalFiles"], 3);
        assert_eq!(value["status"], "ocr_processing");
    }
}
