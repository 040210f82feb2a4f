//! Wire types for the hosted image-generation endpoint.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::engine::Job;
use crate::photo::{GenerationParams, PhotoInput, extension_for_mime};
use crate::variation::{Variation, variation_for};

/// Request body posted once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub image_base64: String,
    pub mime_type: String,
    pub precompress: bool,
    #[serde(default, skip_serializing_if = "Variation::is_empty")]
    pub variation: Variation,
}

impl GenerateRequest {
    pub fn for_job(job: &Job<PhotoInput, GenerationParams>) -> Self {
        let params = &job.params;
        Self {
            model: params.model.clone(),
            prompt: params.prompt_for(job.index),
            image_base64: BASE64.encode(&job.input.bytes),
            mime_type: job.input.mime_type.clone(),
            precompress: params.precompress,
            variation: variation_for(job.index, &params.dimensions),
        }
    }
}

/// Response body. Exactly one of `image_base64` or `blocked_reason` is expected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

/// A generated image, kept base64-encoded as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub source: String,
    pub mime_type: String,
    pub data_base64: String,
}

impl GeneratedImage {
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data_base64)
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}
