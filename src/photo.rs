//! Concrete input and parameter types for photo generation batches.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::InputItem;
use crate::variation::{self, Dimensions};

/// One source photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInput {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoInput {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a photo from disk, inferring its MIME type from the extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("photo")
            .to_string();
        let mime_type = mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime_type, bytes))
    }
}

impl InputItem for PhotoInput {
    fn is_absent(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parameters shared by every job in a batch.
///
/// Everything that influences a call lives here so a run is reproducible
/// from its inputs alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub model: String,
    /// Ask for the input to be downscaled before generation.
    #[serde(default)]
    pub precompress: bool,
    /// Per-index diversity modifiers. Empty for distinct-input batches.
    #[serde(default)]
    pub dimensions: Dimensions,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            precompress: false,
            dimensions: Dimensions::new(),
        }
    }

    pub fn with_precompress(mut self, precompress: bool) -> Self {
        self.precompress = precompress;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// The prompt for job `index`, with its variation appended.
    pub fn prompt_for(&self, index: usize) -> String {
        let variation = variation::variation_for(index, &self.dimensions);
        if variation.is_empty() {
            return self.prompt.clone();
        }
        format!("{}\nVariation: {}", self.prompt, variation::describe(&variation))
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        "jpg"
    } else if lowered.contains("webp") {
        "webp"
    } else if lowered.contains("gif") {
        "gif"
    } else {
        "png"
    }
}
