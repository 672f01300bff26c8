use std::path::PathBuf;
use thiserror::Error;

use crate::generator::GenerationError;

#[derive(Error, Debug)]
pub enum GlimpseError {
    #[error("Audio extraction failed for {video_path}: {reason}")]
    AudioExtractionFailed { video_path: PathBuf, reason: String },

    #[error("Frame extraction failed for {video_path} at {timestamp:.2}s: {reason}")]
    FrameExtractionFailed {
        video_path: PathBuf,
        timestamp: f64,
        reason: String,
    },

    #[error("Could not probe duration of {video_path}: {reason}")]
    ProbeFailed { video_path: PathBuf, reason: String },

    #[error("Transcription failed for {audio_path}: {reason}")]
    TranscriptFailed { audio_path: PathBuf, reason: String },

    #[error("Unsupported transcript format: {path}")]
    UnsupportedTranscriptFormat { path: PathBuf },

    #[error("Transcript is empty and there are no frame narrations to summarize")]
    EmptyTranscript,

    #[error("Summary generation failed: {reason}")]
    SummaryFailed { reason: String },

    #[error("Generation failed: {0}")]
    Generation(GenerationError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// A cancelled call ends the whole run, so it is lifted out of `Generation`.
impl From<GenerationError> for GlimpseError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Cancelled => GlimpseError::Cancelled,
            other => GlimpseError::Generation(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, GlimpseError>;
