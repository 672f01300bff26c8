pub mod chunking;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod generator;
pub mod key_moments;
pub mod media;
pub mod narrator;
pub mod ollama;
pub mod session;
pub mod subtitle;
pub mod summarize;
pub mod types;

#[cfg(test)]
mod test_support;

pub use chunking::{chunk_text, split_sentences};
pub use config::PipelineConfig;
pub use context::transcript_context;
pub use error::{GlimpseError, Result};
pub use format::{
    DocumentInfo, format_frame_narrations, format_summary_document, format_timestamp,
    format_transcript_with_timestamps,
};
pub use generator::{GenerationError, Generator, PullProgress, ensure_model};
pub use key_moments::{
    FallbackReason, KeyMomentSelection, SelectionSource, filter_within_duration,
    select_key_moments,
};
pub use media::{
    extract_audio, extract_frames, load_transcript, probe_duration, save_summary,
    save_transcript, transcribe_audio,
};
pub use narrator::{NarratorOptions, narrate_frames};
pub use ollama::OllamaClient;
pub use session::Session;
pub use subtitle::parse_subtitles;
pub use summarize::{SummaryOptions, summarize};
pub use types::{
    Chunk, ChunkExtraction, FrameFailure, FrameInfo, FrameNarration, KeyMoment, NarrationStatus,
    Segment, SummaryReport, Transcript,
};
