use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::MapperError;
use crate::MapperMetadata;
use crate::MapperResult;
use crate::SmartMapper;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Remote structured-extraction service. Prompting and model selection
/// live behind the endpoint; this client only moves text in and JSON out.
pub struct HttpSmartMapper {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpSmartMapper {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> MapperResult<Self> {
        let endpoint = endpoint.into();
        let api_key = api_key.into();
        if endpoint.trim().is_empty() || api_key.trim().is_empty() {
            return Err(MapperError::Unavailable(
                "smart mapper requires both endpoint and api key".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| MapperError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl SmartMapper for HttpSmartMapper {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract_from_text(
        &self,
        text: &str,
        document_type: &str,
        metadata: Option<MapperMetadata>,
    ) -> MapperResult<serde_json::Value> {
        let body = serde_json::json!({
            "model": self.model,
            "document_type": document_type,
            "text": text,
            "metadata": metadata,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| MapperError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(MapperError::Quota(format!("mapper returned {status}")));
        }
        if !status.is_success() {
            return Err(MapperError::Unavailable(format!(
                "mapper returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| MapperError::Malformed(err.to_string()))?;
        if !payload.is_object() {
            return Err(MapperError::Malformed(
                "mapper body is not a JSON object".into(),
            ));
        }
        debug!(document_type, "smart mapper responded");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_requires_credentials() {
        assert!(HttpSmartMapper::new("", "key", "model-x").is_err());
        assert!(HttpSmartMapper::new("https://mapper.example", "", "model-x").is_err());
        assert!(HttpSmartMapper::new("https://mapper.example", "key", "model-x").is_ok());
    }
}
