#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

mod http;

pub use crate::http::HttpSmartMapper;

pub type MapperResult<T> = Result<T, MapperError>;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("mapper unavailable: {0}")]
    Unavailable(String),
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("malformed mapper response: {0}")]
    Malformed(String),
}

/// Context passed alongside the text. The mapper treats it as hints; the
/// bank pipeline uses it to carry the chunk's starting balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saldo_start_minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_npwp: Option<String>,
}

/// Adapter over an external LLM. Prompts and model choice live entirely on
/// the provider side; the core only sees document-type-shaped JSON back.
/// Callers must treat every error as recoverable and fall back to raw text.
#[async_trait]
pub trait SmartMapper: Send + Sync {
    fn model_name(&self) -> &str;

    async fn extract_from_text(
        &self,
        text: &str,
        document_type: &str,
        metadata: Option<MapperMetadata>,
    ) -> MapperResult<serde_json::Value>;
}

enum ScriptedReply {
    Payload(serde_json::Value),
    Failure(String),
}

/// Scripted test double. Replies are queued per document type and consumed
/// in order; an empty queue behaves like an unreachable provider.
#[derive(Default)]
pub struct MockSmartMapper {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<String>>,
}

impl MockSmartMapper {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn script_payload(&self, document_type: &str, payload: serde_json::Value) {
        self.replies
            .lock()
            .await
            .entry(document_type.to_string())
            .or_default()
            .push_back(ScriptedReply::Payload(payload));
    }

    pub async fn script_failure(&self, document_type: &str, message: &str) {
        self.replies
            .lock()
            .await
            .entry(document_type.to_string())
            .or_default()
            .push_back(ScriptedReply::Failure(message.to_string()));
    }

    /// Texts the mapper was called with, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SmartMapper for MockSmartMapper {
    fn model_name(&self) -> &str {
        "mock-mapper"
    }

    async fn extract_from_text(
        &self,
        text: &str,
        document_type: &str,
        _metadata: Option<MapperMetadata>,
    ) -> MapperResult<serde_json::Value> {
        self.calls.lock().await.push(text.to_string());
        let mut replies = self.replies.lock().await;
        match replies.get_mut(document_type).and_then(VecDeque::pop_front) {
            Some(ScriptedReply::Payload(payload)) => Ok(payload),
            Some(ScriptedReply::Failure(message)) => Err(MapperError::Unavailable(message)),
            None => Err(MapperError::Unavailable(format!(
                "no scripted reply for {document_type}"
            ))),
        }
    }
}

/// Reads the transaction list out of a rekening-koran mapper payload.
/// The payload is opaque; this helper only feature-tests the one shape the
/// bank pipeline consumes.
#[must_use]
pub fn transactions_field(payload: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    payload.get("transactions").and_then(serde_json::Value::as_array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn scripted_replies_are_consumed_in_order() {
        let mapper = MockSmartMapper::default();
        mapper
            .script_payload("faktur_pajak", serde_json::json!({"invoice": {"number": "A-1"}}))
            .await;
        mapper.script_failure("faktur_pajak", "quota exceeded").await;

        let first = mapper
            .extract_from_text("text", "faktur_pajak", None)
            .await
            .expect("first reply");
        assert_eq!(first["invoice"]["number"], "A-1");

        let err = mapper
            .extract_from_text("text", "faktur_pajak", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unscripted_type_errors() {
        let mapper = MockSmartMapper::default();
        let err = mapper
            .extract_from_text("text", "rekening_koran", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Unavailable(_)));
    }

    #[tokio::test]
    async fn records_call_texts() {
        let mapper = MockSmartMapper::default();
        mapper
            .script_payload("rekening_koran", serde_json::json!({"transactions": []}))
            .await;
        let _ = mapper
            .extract_from_text("chunk text", "rekening_koran", None)
            .await;
        assert_eq!(mapper.calls().await, vec!["chunk text".to_string()]);
    }

    #[test]
    fn transactions_field_feature_tests_shape() {
        let payload = serde_json::json!({"transactions": [{"tanggal": "01/01/2024"}]});
        assert_eq!(transactions_field(&payload).map(Vec::len), Some(1));
        assert!(transactions_field(&serde_json::json!({"other": 1})).is_none());
    }
}
