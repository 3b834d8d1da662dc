#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

mod providers;

pub use crate::providers::CommandOcrProvider;
pub use crate::providers::HttpOcrProvider;

pub type OcrResult<T> = Result<T, OcrError>;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no OCR provider configured")]
    NoProvider,
    #[error("provider unavailable: {0}")]
    Provider(String),
    #[error("empty extraction: {0}")]
    EmptyText(String),
    #[error("all OCR providers failed: {0}")]
    AllProvidersFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

impl TableRow {
    #[must_use]
    pub fn from_texts(texts: &[&str]) -> Self {
        Self {
            cells: texts
                .iter()
                .map(|text| TableCell {
                    text: (*text).to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutcome {
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    /// Provider confidence on a 0..=100 scale.
    pub confidence: f64,
    pub engine_used: String,
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    pub document_id: String,
    pub stored_path: String,
    pub mime_type: String,
    pub payload: Vec<u8>,
}

impl OcrRequest {
    pub fn validate(&self) -> OcrResult<()> {
        if self.payload.is_empty() {
            return Err(OcrError::Provider(
                "payload is empty; cannot perform OCR".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn engine_name(&self) -> &str;

    async fn extract(&self, request: &OcrRequest) -> OcrResult<OcrOutcome>;
}

/// Routes extraction to a cloud primary with a local fallback. Any primary
/// failure, including an empty text result, falls through to the fallback;
/// the file fails only when every configured provider fails.
#[derive(Clone)]
pub struct OcrGateway {
    primary: Arc<dyn OcrProvider>,
    fallback: Option<Arc<dyn OcrProvider>>,
}

impl std::fmt::Debug for OcrGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrGateway").finish_non_exhaustive()
    }
}

impl OcrGateway {
    pub fn new(
        primary: Option<Arc<dyn OcrProvider>>,
        fallback: Option<Arc<dyn OcrProvider>>,
    ) -> OcrResult<Self> {
        match (primary, fallback) {
            (Some(primary), fallback) => Ok(Self { primary, fallback }),
            (None, Some(only)) => Ok(Self {
                primary: only,
                fallback: None,
            }),
            (None, None) => Err(OcrError::NoProvider),
        }
    }

    #[must_use]
    pub fn engines(&self) -> Vec<String> {
        let mut engines = vec![self.primary.engine_name().to_string()];
        if let Some(fallback) = &self.fallback {
            engines.push(fallback.engine_name().to_string());
        }
        engines
    }

    pub async fn extract_text(&self, request: &OcrRequest) -> OcrResult<OcrOutcome> {
        request.validate()?;

        let primary_err = match self.run_provider(self.primary.as_ref(), request).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        if let Some(fallback) = &self.fallback {
            warn!(
                engine = self.primary.engine_name(),
                error = %primary_err,
                "primary OCR failed; trying fallback"
            );
            match self.run_provider(fallback.as_ref(), request).await {
                Ok(outcome) => return Ok(outcome),
                Err(fallback_err) => {
                    return Err(OcrError::AllProvidersFailed(format!(
                        "{}: {primary_err}; {}: {fallback_err}",
                        self.primary.engine_name(),
                        fallback.engine_name()
                    )));
                }
            }
        }

        Err(OcrError::AllProvidersFailed(format!(
            "{}: {primary_err}",
            self.primary.engine_name()
        )))
    }

    async fn run_provider(
        &self,
        provider: &dyn OcrProvider,
        request: &OcrRequest,
    ) -> OcrResult<OcrOutcome> {
        let outcome = provider.extract(request).await?;
        if outcome.raw_text.trim().is_empty() {
            return Err(OcrError::EmptyText(format!(
                "{} returned no text for {}",
                provider.engine_name(),
                request.document_id
            )));
        }
        Ok(outcome)
    }
}

/// Test double with canned outcomes keyed by document id. Unknown ids fail
/// like an unreachable provider.
#[derive(Default)]
pub struct MockOcrProvider {
    name: String,
    outcomes: RwLock<HashMap<String, OcrOutcome>>,
}

impl MockOcrProvider {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn inject(&self, document_id: impl Into<String>, outcome: OcrOutcome) {
        self.outcomes.write().await.insert(document_id.into(), outcome);
    }

    pub async fn with_outcome(self, document_id: impl Into<String>, outcome: OcrOutcome) -> Self {
        self.inject(document_id, outcome).await;
        self
    }
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    fn engine_name(&self) -> &str {
        if self.name.is_empty() { "mock" } else { &self.name }
    }

    async fn extract(&self, request: &OcrRequest) -> OcrResult<OcrOutcome> {
        self.outcomes
            .read()
            .await
            .get(&request.document_id)
            .cloned()
            .with_context(|| format!("missing mock OCR for {}", request.document_id))
            .map_err(|err| OcrError::Provider(err.to_string()))
    }
}

pub fn outcome_with_text(engine: &str, text: &str) -> OcrOutcome {
    OcrOutcome {
        raw_text: text.to_string(),
        tables: Vec::new(),
        confidence: 92.0,
        engine_used: engine.to_string(),
        processing_time_seconds: 0.1,
        raw: serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(document_id: &str) -> OcrRequest {
        OcrRequest {
            document_id: document_id.into(),
            stored_path: format!("/vault/batch/{document_id}"),
            mime_type: "application/pdf".into(),
            payload: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn gateway_requires_a_provider() {
        let err = OcrGateway::new(None, None).unwrap_err();
        assert!(matches!(err, OcrError::NoProvider));
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = MockOcrProvider::named("cloud")
            .with_outcome("doc-1", outcome_with_text("cloud", "FAKTUR PAJAK"))
            .await;
        let fallback = MockOcrProvider::named("local");
        let gateway =
            OcrGateway::new(Some(Arc::new(primary)), Some(Arc::new(fallback))).expect("gateway");

        let outcome = gateway.extract_text(&request("doc-1")).await.expect("ocr");
        assert_eq!(outcome.engine_used, "cloud");
    }

    #[tokio::test]
    async fn empty_primary_text_falls_back() {
        let primary = MockOcrProvider::named("cloud")
            .with_outcome("doc-1", outcome_with_text("cloud", "   "))
            .await;
        let fallback = MockOcrProvider::named("local")
            .with_outcome("doc-1", outcome_with_text("local", "REKENING KORAN"))
            .await;
        let gateway =
            OcrGateway::new(Some(Arc::new(primary)), Some(Arc::new(fallback))).expect("gateway");

        let outcome = gateway.extract_text(&request("doc-1")).await.expect("ocr");
        assert_eq!(outcome.engine_used, "local");
        assert_eq!(outcome.raw_text, "REKENING KORAN");
    }

    #[tokio::test]
    async fn both_failing_reports_every_engine() {
        let gateway = OcrGateway::new(
            Some(Arc::new(MockOcrProvider::named("cloud"))),
            Some(Arc::new(MockOcrProvider::named("local"))),
        )
        .expect("gateway");

        let err = gateway.extract_text(&request("doc-404")).await.unwrap_err();
        match err {
            OcrError::AllProvidersFailed(message) => {
                assert!(message.contains("cloud"));
                assert!(message.contains("local"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_only_deployment_is_allowed() {
        let fallback = MockOcrProvider::named("local")
            .with_outcome("doc-1", outcome_with_text("local", "text"))
            .await;
        let gateway = OcrGateway::new(None, Some(Arc::new(fallback))).expect("gateway");
        assert_eq!(gateway.engines(), vec!["local".to_string()]);

        let outcome = gateway.extract_text(&request("doc-1")).await.expect("ocr");
        assert_eq!(outcome.engine_used, "local");
    }

    #[tokio::test]
    async fn empty_payload_is_rejected_before_providers_run() {
        let gateway = OcrGateway::new(Some(Arc::new(MockOcrProvider::named("cloud"))), None)
            .expect("gateway");
        let mut request = request("doc-1");
        request.payload.clear();

        let err = gateway.extract_text(&request).await.unwrap_err();
        assert!(matches!(err, OcrError::Provider(_)));
    }
}
