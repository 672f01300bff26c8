use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    context::DEFAULT_CONTEXT_WINDOW,
    narrator::NarratorOptions,
    ollama::DEFAULT_HOST,
    summarize::{DEFAULT_CHUNK_SIZE, SummaryOptions},
};

/// Everything a run needs to know about models and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// OLLAMA_HOST
    pub host: String,
    /// GLIMPSE_TEXT_MODEL: used for key moments, map and reduce.
    pub text_model: String,
    /// GLIMPSE_VISION_MODEL
    pub vision_model: String,
    /// GLIMPSE_WHISPER_MODEL: model size passed to the whisper CLI.
    pub whisper_model: String,
    /// GLIMPSE_MAX_FRAMES
    pub max_frames: usize,
    /// GLIMPSE_CHUNK_SIZE, in characters.
    pub chunk_size: usize,
    pub context_window: f64,
    /// GLIMPSE_MAP_CONCURRENCY
    pub map_concurrency: usize,
    /// GLIMPSE_REQUEST_TIMEOUT_SECS
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            text_model: "llama3.2".to_string(),
            vision_model: "llava".to_string(),
            whisper_model: "base".to_string(),
            max_frames: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            context_window: DEFAULT_CONTEXT_WINDOW,
            map_concurrency: 2,
            request_timeout_secs: 600,
        }
    }
}

impl PipelineConfig {
    /// Load from the process environment. Unset or unparseable values keep
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let number = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            host: string("OLLAMA_HOST", defaults.host),
            text_model: string("GLIMPSE_TEXT_MODEL", defaults.text_model),
            vision_model: string("GLIMPSE_VISION_MODEL", defaults.vision_model),
            whisper_model: string("GLIMPSE_WHISPER_MODEL", defaults.whisper_model),
            max_frames: number("GLIMPSE_MAX_FRAMES", defaults.max_frames),
            chunk_size: number("GLIMPSE_CHUNK_SIZE", defaults.chunk_size).max(1),
            context_window: defaults.context_window,
            map_concurrency: number("GLIMPSE_MAP_CONCURRENCY", defaults.map_concurrency).max(1),
            request_timeout_secs: lookup("GLIMPSE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn narrator_options(&self) -> NarratorOptions {
        NarratorOptions {
            model: self.vision_model.clone(),
            context_window: self.context_window,
        }
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            model: self.text_model.clone(),
            chunk_size: self.chunk_size,
            map_concurrency: self.map_concurrency,
        }
    }
}
