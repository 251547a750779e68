use reqwest::header::ACCEPT;
use reqwest::Client;
use scribe_models::{
    CreateTranscriptionRequest, CreateTranscriptionResponse, ExportRequest, ExportStatus,
    ScribeError, TranskriptorConfig,
};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct TranskriptorClient {
    http: Client,
    base: String,
    api_key: String,
    language: String,
    service: String,
    timeout: Duration,
}

impl TranskriptorClient {
    pub fn new(http: Client, config: &TranskriptorConfig) -> Self {
        Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            service: config.service.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base, path))
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
    }

    /// Creates a transcription order for `url` and returns its order id.
    #[instrument(skip(self))]
    pub async fn create_transcription(&self, url: &str) -> Result<String, ScribeError> {
        let payload = CreateTranscriptionRequest {
            url: url.to_string(),
            service: self.service.clone(),
            language: self.language.clone(),
        };
        let response = self
            .post("/developer/transcription/url")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScribeError::Transkriptor {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }

        let created: CreateTranscriptionResponse =
            response
                .json()
                .await
                .map_err(|e| ScribeError::InvalidResponse {
                    reason: e.to_string(),
                })?;
        created.order_id.ok_or_else(|| ScribeError::InvalidResponse {
            reason: "response has no order_id".to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn export_transcription(&self, order_id: &str) -> Result<ExportStatus, ScribeError> {
        let response = self
            .post(&format!("/developer/files/{order_id}/content/export"))
            .json(&ExportRequest::default())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!("Export of {} answered {} ({} bytes)", order_id, status, body.len());
        Ok(ExportStatus::from_response(status, &body))
    }
}
