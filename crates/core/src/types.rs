use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum length, in characters, of a key-moment reason.
pub const MAX_REASON_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Transcript {
    /// Builds a transcript whose full text is the segment texts joined with single spaces.
    ///
    /// Segments ending before they start are dropped and the rest are stably
    /// sorted by start, so every input path yields ordered, well-formed segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let segments = normalize_segments(segments);
        let text = segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            segments,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last segment, in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// A still frame pulled out of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub path: PathBuf,
    pub timestamp: f64,
    /// 1-based, in extraction order.
    pub frame_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    pub timestamp: f64,
    pub reason: String,
}

impl KeyMoment {
    pub fn new(timestamp: f64, reason: impl AsRef<str>) -> Self {
        Self {
            timestamp,
            reason: truncate_chars(reason.as_ref().trim(), MAX_REASON_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Map-phase output for one chunk. A failed map call keeps its slot so
/// the reduce input stays in chunk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkExtraction {
    Extracted { index: usize, text: String },
    Failed { index: usize, reason: String },
}

impl ChunkExtraction {
    pub fn index(&self) -> usize {
        match self {
            ChunkExtraction::Extracted { index, .. } | ChunkExtraction::Failed { index, .. } => {
                *index
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChunkExtraction::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameNarration {
    pub frame_number: usize,
    pub timestamp: f64,
    pub description: String,
    pub transcript_context: String,
    pub status: NarrationStatus,
}

impl FrameNarration {
    pub fn is_described(&self) -> bool {
        matches!(self.status, NarrationStatus::Described)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NarrationStatus {
    Described,
    Failed { failure: FrameFailure },
}

/// Why a single frame could not be described.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FrameFailure {
    #[error("image could not be read: {0}")]
    ImageUnreadable(String),

    #[error("model rejected image input: {0}")]
    UnsupportedMedia(String),

    #[error("vision call failed: {0}")]
    Generation(String),

    #[error("model returned an empty description")]
    EmptyDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summary: String,
    pub chunk_count: usize,
    /// Indices of chunks whose map call failed.
    pub failed_chunks: Vec<usize>,
    pub frames_described: usize,
    pub frames_failed: usize,
}

fn normalize_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    let before = segments.len();
    segments.retain(|seg| seg.end >= seg.start);
    if segments.len() < before {
        debug!(dropped = before - segments.len(), "dropped segments ending before they start");
    }

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// First `max` characters of `text`, with an ellipsis when something was cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", truncate_chars(text, max).trim_end())
    }
}
