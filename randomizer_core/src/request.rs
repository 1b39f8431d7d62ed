use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub const INCLUDE_TAGS_KEY: &str = "GPR Include Tags";
pub const POST_URL_KEY: &str = "GPR Post URL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    TextToImage,
    ImageToImage,
}

impl ProcessingMode {
    pub fn needs_init_image(&self) -> bool {
        matches!(self, ProcessingMode::ImageToImage)
    }
}

/// The host's generation request, as far as the randomizer reads and writes it.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Identifies the request for the per-request cache.
    pub id: u64,
    pub prompt: String,
    pub mode: ProcessingMode,
    pub width: u32,
    pub height: u32,
    pub init_images: Vec<RgbImage>,
    /// Metadata saved alongside the generated image.
    pub extra_generation_params: BTreeMap<String, String>,
    /// Cycles the host still plans to run, this one included.
    pub remaining_batches: u32,
}

impl GenerationRequest {
    pub fn new(id: u64, prompt: impl Into<String>, mode: ProcessingMode, remaining_batches: u32) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            mode,
            width: 1024,
            height: 1024,
            init_images: Vec::new(),
            extra_generation_params: BTreeMap::new(),
            remaining_batches,
        }
    }

    /// Ask the host not to start further cycles after this one.
    pub fn stop_after_current(&mut self) {
        self.remaining_batches = self.remaining_batches.min(1);
    }

    /// Write a metadata entry unless the request already has one. Returns whether it was written.
    pub fn set_param_once(&mut self, key: &str, value: &str) -> bool {
        if self.extra_generation_params.contains_key(key) {
            return false;
        }
        self.extra_generation_params.insert(key.to_string(), value.to_string());
        true
    }
}

/// `prompt, tags`, or only the side that is not blank.
pub fn append_prompt(prompt: &str, tags: &str) -> String {
    match (prompt.trim().is_empty(), tags.trim().is_empty()) {
        (true, _) => tags.to_string(),
        (false, true) => prompt.to_string(),
        (false, false) => format!("{}, {}", prompt, tags),
    }
}
