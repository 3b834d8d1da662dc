use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::OcrError;
use crate::OcrOutcome;
use crate::OcrProvider;
use crate::OcrRequest;
use crate::OcrResult;
use crate::Table;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct HttpOcrResponse {
    text: String,
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Cloud primary. Ships the raw bytes to a document-OCR endpoint and maps
/// its JSON body onto the gateway contract. Credentials gate construction;
/// without them the deployment simply has no cloud primary.
pub struct HttpOcrProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    name: String,
}

impl HttpOcrProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> OcrResult<Self> {
        let endpoint = endpoint.into();
        let api_key = api_key.into();
        if endpoint.trim().is_empty() || api_key.trim().is_empty() {
            return Err(OcrError::Provider(
                "cloud OCR requires both endpoint and api key".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| OcrError::Internal(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            name: "cloud-document-ocr".into(),
        })
    }
}

#[async_trait]
impl OcrProvider for HttpOcrProvider {
    fn engine_name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, request: &OcrRequest) -> OcrResult<OcrOutcome> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", request.mime_type.clone())
            .body(request.payload.clone())
            .send()
            .await
            .map_err(|err| OcrError::Provider(err.to_string()))?;

        if !response.status().is_success() {
            return Err(OcrError::Provider(format!(
                "cloud OCR returned {}",
                response.status()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|err| OcrError::Provider(err.to_string()))?;
        let parsed: HttpOcrResponse = serde_json::from_value(raw.clone())
            .map_err(|err| OcrError::Provider(format!("unexpected OCR body: {err}")))?;

        debug!(
            document = %request.document_id,
            tables = parsed.tables.len(),
            "cloud OCR responded"
        );
        Ok(OcrOutcome {
            raw_text: parsed.text,
            tables: parsed.tables,
            confidence: parsed.confidence.unwrap_or(0.0).clamp(0.0, 100.0),
            engine_used: self.name.clone(),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            raw,
        })
    }
}

/// Local fallback. Runs a text-extraction command (tesseract and friends)
/// against the stored artifact and reads stdout. No tables, conservative
/// confidence.
pub struct CommandOcrProvider {
    program: String,
    args: Vec<String>,
}

impl CommandOcrProvider {
    /// `command` is split on whitespace; the literal `{path}` argument is
    /// replaced with the artifact path at run time.
    pub fn new(command: &str) -> OcrResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OcrError::Provider("empty OCR command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl OcrProvider for CommandOcrProvider {
    fn engine_name(&self) -> &str {
        "local-command"
    }

    async fn extract(&self, request: &OcrRequest) -> OcrResult<OcrOutcome> {
        let started = Instant::now();
        let mut command = tokio::process::Command::new(&self.program);
        let mut substituted = false;
        for arg in &self.args {
            if arg == "{path}" {
                command.arg(&request.stored_path);
                substituted = true;
            } else {
                command.arg(arg);
            }
        }
        if !substituted {
            command.arg(&request.stored_path);
        }

        let output = command
            .output()
            .await
            .map_err(|err| OcrError::Provider(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            return Err(OcrError::Provider(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(OcrOutcome {
            raw_text: text,
            tables: Vec::new(),
            confidence: 60.0,
            engine_used: "local-command".into(),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            raw: serde_json::Value::Null,
        })
    }
}
