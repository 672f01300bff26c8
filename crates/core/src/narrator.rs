//! Sequential, continuity-aware frame narration.
//!
//! Frames are described strictly one after another. The description of the
//! last successfully narrated frame is folded forward as a
//! [`NarrationContext`] so the next prompt can relate the two; a failed frame
//! resets it.

use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    context::{DEFAULT_CONTEXT_WINDOW, transcript_context},
    error::{GlimpseError, Result},
    format::format_timestamp,
    generator::{self, GenerationError, Generator},
    types::{FrameFailure, FrameInfo, FrameNarration, NarrationStatus, Segment},
};

static ECHOED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[[^\]]*\]\s*frame\s*\d+\s*:\s*").expect("prefix pattern is valid")
});

#[derive(Debug, Clone)]
pub struct NarratorOptions {
    pub model: String,
    /// Seconds of transcript either side of a frame paired with its narration.
    pub context_window: f64,
}

impl NarratorOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

/// Description carried from one frame to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrationContext {
    previous: Option<String>,
}

impl NarrationContext {
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }
}

/// Narrate every frame in ascending `frame_number` order.
///
/// Per-frame failures are recorded in the returned narrations; only
/// cancellation aborts the loop.
pub async fn narrate_frames(
    generator: &dyn Generator,
    frames: &[FrameInfo],
    segments: &[Segment],
    opts: &NarratorOptions,
    cancel: &CancellationToken,
) -> Result<Vec<FrameNarration>> {
    let mut ordered: Vec<&FrameInfo> = frames.iter().collect();
    ordered.sort_by_key(|f| f.frame_number);

    let total = ordered.len();
    let mut narrations = Vec::with_capacity(total);
    let mut context = NarrationContext::default();

    for frame in ordered {
        if cancel.is_cancelled() {
            return Err(GlimpseError::Cancelled);
        }

        let (narration, next) =
            narrate_frame(generator, frame, total, context, segments, opts, cancel).await?;
        narrations.push(narration);
        context = next;
    }

    let failed = narrations.iter().filter(|n| !n.is_described()).count();
    info!(total, failed, "frame narration finished");

    Ok(narrations)
}

/// Describe one frame given the carried context, returning its narration and
/// the context for the next frame.
pub async fn narrate_frame(
    generator: &dyn Generator,
    frame: &FrameInfo,
    total_frames: usize,
    context: NarrationContext,
    segments: &[Segment],
    opts: &NarratorOptions,
    cancel: &CancellationToken,
) -> Result<(FrameNarration, NarrationContext)> {
    let prompt = build_frame_prompt(frame, total_frames, context.previous());
    let excerpt = transcript_context(frame.timestamp, segments, opts.context_window);

    match describe(generator, frame, &prompt, &opts.model, cancel).await {
        Ok(description) => {
            debug!(frame = frame.frame_number, "frame described");
            let narration = FrameNarration {
                frame_number: frame.frame_number,
                timestamp: frame.timestamp,
                description: description.clone(),
                transcript_context: excerpt,
                status: NarrationStatus::Described,
            };
            let next = NarrationContext {
                previous: Some(description),
            };
            Ok((narration, next))
        }
        Err(Outcome::Cancelled) => Err(GlimpseError::Cancelled),
        Err(Outcome::Failed(failure)) => {
            warn!(
                frame = frame.frame_number,
                error = %failure,
                "frame description failed, continuity reset"
            );
            let narration = FrameNarration {
                frame_number: frame.frame_number,
                timestamp: frame.timestamp,
                description: placeholder(frame.frame_number),
                transcript_context: excerpt,
                status: NarrationStatus::Failed { failure },
            };
            Ok((narration, NarrationContext::default()))
        }
    }
}

enum Outcome {
    Cancelled,
    Failed(FrameFailure),
}

async fn describe(
    generator: &dyn Generator,
    frame: &FrameInfo,
    prompt: &str,
    model: &str,
    cancel: &CancellationToken,
) -> std::result::Result<String, Outcome> {
    let image = fs::read(&frame.path)
        .await
        .map_err(|e| Outcome::Failed(FrameFailure::ImageUnreadable(e.to_string())))?;

    let response = generator::generate_vision(generator, model, prompt, &[image], cancel)
        .await
        .map_err(|e| match e {
            GenerationError::Cancelled => Outcome::Cancelled,
            GenerationError::UnsupportedMedia { message, .. } => {
                Outcome::Failed(FrameFailure::UnsupportedMedia(message))
            }
            other => Outcome::Failed(FrameFailure::Generation(other.to_string())),
        })?;

    let description = strip_echoed_prefix(&response);
    if description.is_empty() {
        return Err(Outcome::Failed(FrameFailure::EmptyDescription));
    }
    Ok(description)
}

pub fn build_frame_prompt(
    frame: &FrameInfo,
    total_frames: usize,
    previous: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are narrating a video one frame at a time. This is frame {} of {}, captured at {}.\n\n",
        frame.frame_number,
        total_frames,
        format_timestamp(frame.timestamp)
    );

    match previous {
        Some(previous) => prompt.push_str(&format!(
            "The previous frame was described as:\n\"{}\"\n\n\
             Describe what is visible in this frame and how it relates to the previous one: \
             what changed, what continues, and what new information appears.\n",
            previous
        )),
        None => prompt.push_str(
            "Describe what is visible in this frame: people, setting, on-screen text, slides, \
             code or diagrams, and any action taking place.\n",
        ),
    }

    prompt.push_str("Answer with the description only, in 2-4 sentences.");
    prompt
}

/// Models sometimes echo the `[timestamp] Frame N:` label back.
pub fn strip_echoed_prefix(response: &str) -> String {
    ECHOED_PREFIX.replace(response.trim(), "").trim().to_string()
}

/// True when every frame failed because the model refused images, meaning the
/// run should continue from the transcript alone.
pub fn all_images_rejected(narrations: &[FrameNarration]) -> bool {
    !narrations.is_empty()
        && narrations.iter().all(|n| {
            matches!(
                n.status,
                NarrationStatus::Failed {
                    failure: FrameFailure::UnsupportedMedia(_)
                }
            )
        })
}

fn placeholder(frame_number: usize) -> String {
    format!("[Frame {frame_number} could not be described]")
}
