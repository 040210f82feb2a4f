use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;

use super::Generator;
use super::types::{GenerateRequest, GenerateResponse, GeneratedImage};
use crate::engine::Job;
use crate::error::GenerateError;
use crate::photo::{GenerationParams, PhotoInput};

/// Calls a hosted image-generation endpoint, one POST per job. Never retries.
pub struct HttpGenerator {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, GenerateError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            endpoint,
        })
    }

    pub async fn send(&self, req: &GenerateRequest, source: &str) -> Result<GeneratedImage, GenerateError> {
        let mut builder = self.client.post(&self.endpoint).json(req);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(GenerateError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| GenerateError::MalformedOutput(e.to_string()))?;

        if let Some(reason) = body.blocked_reason {
            return Err(GenerateError::ContentBlocked(reason));
        }
        let Some(data) = body.image_base64.filter(|d| !d.is_empty()) else {
            return Err(GenerateError::MalformedOutput("response carried no image".into()));
        };
        BASE64
            .decode(&data)
            .map_err(|e| GenerateError::MalformedOutput(format!("invalid base64 image: {e}")))?;

        Ok(GeneratedImage {
            source: source.to_string(),
            mime_type: body.mime_type.unwrap_or_else(|| "image/png".to_string()),
            data_base64: data,
        })
    }
}

impl Generator<PhotoInput, GenerationParams> for HttpGenerator {
    type Output = GeneratedImage;

    async fn generate(&self, job: Job<PhotoInput, GenerationParams>) -> Result<GeneratedImage, GenerateError> {
        let req = GenerateRequest::for_job(&job);
        self.send(&req, &job.input.name).await
    }
}
