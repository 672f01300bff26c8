//! Key-moment selection.
//!
//! The model is asked to pick narratively significant segment starts. Its
//! answer goes through a small lenient grammar, every candidate is snapped to
//! a real segment start, and when too few survive a deterministic keyword
//! heuristic takes over.
//!
//! Response grammar:
//!
//! ```text
//! response   := json-array | pipe-list
//! pipe-list  := entry (("|" | "\n") entry)*
//! entry      := timestamp ":" reason       ; entries without ':' are ignored
//! timestamp  := float ["s"]                ; finite and >= 0, else malformed
//! json-array := "[" {"timestamp": number | string, "reason": string}, ... "]"
//! ```
//!
//! Malformed entries are dropped. A response with no well-formed entry is a
//! [`SelectionParseError`].

use std::collections::HashSet;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{GlimpseError, Result},
    generator::{self, GenerationError, Generator},
    types::{KeyMoment, Segment, preview},
};

/// Candidates further than this from every segment start are discarded.
pub const SNAP_TOLERANCE_SECS: f64 = 1.0;

/// Upper bound on how many picks the model is asked for.
const MAX_MODEL_PICKS: usize = 10;

/// Segment previews listed in the prompt are cut to this length.
const PROMPT_PREVIEW_CHARS: usize = 80;

const OPENING_PREVIEW_CHARS: usize = 50;
const MOMENT_PREVIEW_CHARS: usize = 80;

const SALIENCE_KEYWORDS: [&str; 13] = [
    "today",
    "let's",
    "example",
    "important",
    "first",
    "next",
    "finally",
    "summary",
    "in conclusion",
    "question",
    "demo",
    "remember",
    "key point",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionParseError {
    #[error("response is not a valid JSON array: {0}")]
    InvalidJson(String),

    #[error("response contains no well-formed timestamp:reason entries")]
    NoEntries,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    NoSegments,
    NoFramesRequested,
    Generation(GenerationError),
    Unparseable(SelectionParseError),
    TooFewValid { accepted: usize, required: usize },
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoSegments => write!(f, "transcript has no segments"),
            FallbackReason::NoFramesRequested => write!(f, "frame budget is zero"),
            FallbackReason::Generation(e) => write!(f, "selection call failed: {e}"),
            FallbackReason::Unparseable(e) => write!(f, "selection response unusable: {e}"),
            FallbackReason::TooFewValid { accepted, required } => write!(
                f,
                "only {accepted} valid moment(s) returned, {required} required"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionSource {
    Model,
    Heuristic { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyMomentSelection {
    /// Sorted ascending, at most `max_frames` long.
    pub moments: Vec<KeyMoment>,
    pub source: SelectionSource,
}

impl KeyMomentSelection {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SelectionSource::Heuristic { .. })
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.moments.iter().map(|m| m.timestamp).collect()
    }
}

/// Pick up to `max_frames` key moments.
///
/// Only cancellation is returned as an error; every other failure of the
/// model path ends in the heuristic.
pub async fn select_key_moments(
    generator: &dyn Generator,
    model: &str,
    segments: &[Segment],
    max_frames: usize,
    cancel: &CancellationToken,
) -> Result<KeyMomentSelection> {
    let nothing_to_do = if segments.is_empty() {
        Some(FallbackReason::NoSegments)
    } else if max_frames == 0 {
        Some(FallbackReason::NoFramesRequested)
    } else {
        None
    };
    if let Some(reason) = nothing_to_do {
        return Ok(KeyMomentSelection {
            moments: Vec::new(),
            source: SelectionSource::Heuristic { reason },
        });
    }

    let prompt = build_selection_prompt(segments, max_frames);
    let required = segments.len().min(3);

    let reason = match generator::generate_text(generator, model, &prompt, cancel).await {
        Err(GenerationError::Cancelled) => return Err(GlimpseError::Cancelled),
        Err(e) => FallbackReason::Generation(e),
        Ok(response) => match parse_selection_response(&response) {
            Err(e) => FallbackReason::Unparseable(e),
            Ok(candidates) => {
                let accepted = snap_to_segments(&candidates, segments);
                if accepted.len() >= required {
                    info!(count = accepted.len(), "model selected key moments");
                    return Ok(KeyMomentSelection {
                        moments: finalize(accepted, max_frames),
                        source: SelectionSource::Model,
                    });
                }
                FallbackReason::TooFewValid {
                    accepted: accepted.len(),
                    required,
                }
            }
        },
    };

    warn!(%reason, "falling back to heuristic key-moment selection");
    Ok(KeyMomentSelection {
        moments: fallback_moments(segments, max_frames),
        source: SelectionSource::Heuristic { reason },
    })
}

pub fn build_selection_prompt(segments: &[Segment], max_frames: usize) -> String {
    let target = max_frames.min(MAX_MODEL_PICKS);
    let listing = segments
        .iter()
        .map(|seg| format!("{:.2}: {}", seg.start, preview(&seg.text, PROMPT_PREVIEW_CHARS)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are choosing which moments of a video to capture as still frames.

Below is the transcript, one segment per line, prefixed with the segment start time in seconds.

{listing}

Select about {target} timestamps that mark narratively significant points: topic introductions, demonstrations, key explanations, conclusions, questions and answers.

Rules:
- Use ONLY start times that appear in the list above, copied exactly.
- Give each a short reason (under 15 words).
- Answer on a single line as pipe-separated timestamp:reason pairs and nothing else.

Example: 0.00:Introduction|42.50:First demo begins|118.00:Summary of results"#
    )
}

/// Parse the model's answer into raw candidates.
pub fn parse_selection_response(
    response: &str,
) -> std::result::Result<Vec<KeyMoment>, SelectionParseError> {
    let trimmed = response.trim();

    let candidates = if trimmed.starts_with('[') {
        parse_json_candidates(trimmed)?
    } else {
        parse_pipe_candidates(trimmed)
    };

    if candidates.is_empty() {
        return Err(SelectionParseError::NoEntries);
    }

    Ok(candidates)
}

fn parse_pipe_candidates(text: &str) -> Vec<KeyMoment> {
    text.split(['|', '\n'])
        .filter_map(|entry| {
            let (left, reason) = entry.split_once(':')?;
            let timestamp = parse_timestamp(left)?;
            Some(KeyMoment::new(timestamp, reason))
        })
        .collect()
}

fn parse_json_candidates(text: &str) -> std::result::Result<Vec<KeyMoment>, SelectionParseError> {
    let entries: Vec<Value> =
        serde_json::from_str(text).map_err(|e| SelectionParseError::InvalidJson(e.to_string()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let timestamp = match entry.get("timestamp")? {
                Value::Number(n) => n.as_f64().filter(|t| t.is_finite() && *t >= 0.0)?,
                Value::String(s) => parse_timestamp(s)?,
                _ => return None,
            };
            let reason = entry.get("reason").and_then(Value::as_str).unwrap_or("");
            Some(KeyMoment::new(timestamp, reason))
        })
        .collect())
}

fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let raw = raw.strip_suffix('s').unwrap_or(raw).trim_end();
    raw.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t >= 0.0)
}

/// Keep candidates that land within [`SNAP_TOLERANCE_SECS`] of a segment
/// start, moved onto that start. The first candidate to claim a start wins.
pub fn snap_to_segments(candidates: &[KeyMoment], segments: &[Segment]) -> Vec<KeyMoment> {
    let mut claimed = HashSet::new();
    let mut accepted = Vec::new();

    for candidate in candidates {
        let closest = segments
            .iter()
            .map(|seg| seg.start)
            .filter(|start| (start - candidate.timestamp).abs() <= SNAP_TOLERANCE_SECS)
            .min_by(|a, b| {
                (a - candidate.timestamp)
                    .abs()
                    .total_cmp(&(b - candidate.timestamp).abs())
            });

        match closest {
            Some(start) if claimed.insert(start.to_bits()) => accepted.push(KeyMoment {
                timestamp: start,
                reason: candidate.reason.clone(),
            }),
            _ => debug!(timestamp = candidate.timestamp, "discarding key-moment candidate"),
        }
    }

    accepted
}

/// Deterministic selection used when the model path does not deliver.
///
/// With `max_frames == 1` only the opening anchor fits; the conclusion anchor
/// is dropped rather than exceeding the cap.
pub fn fallback_moments(segments: &[Segment], max_frames: usize) -> Vec<KeyMoment> {
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return Vec::new();
    };
    if max_frames == 0 {
        return Vec::new();
    }

    let mut picker = Picker::default();
    picker.add(
        first.start,
        format!("Opening: {}", preview(&first.text, OPENING_PREVIEW_CHARS)),
    );

    if max_frames >= 2 {
        let keyword_cap = max_frames - 1;
        let matches: Vec<&Segment> = segments.iter().filter(|s| is_salient(&s.text)).collect();

        if max_frames > 2 && !matches.is_empty() {
            let step = (matches.len() / (max_frames - 2)).max(1);
            for seg in matches.iter().step_by(step) {
                if picker.len() >= keyword_cap {
                    break;
                }
                picker.add(seg.start, preview(&seg.text, MOMENT_PREVIEW_CHARS));
            }
        }

        // One slot stays free for the conclusion unless it is already taken.
        let target = max_frames.min(MAX_MODEL_PICKS);
        let reserve = usize::from(!picker.contains(last.start));
        let fill_to = target.saturating_sub(reserve);
        if picker.len() < fill_to {
            let remaining = target - picker.len();
            let step = (segments.len() / remaining).max(1);
            for seg in segments.iter().step_by(step) {
                if picker.len() >= fill_to {
                    break;
                }
                picker.add(seg.start, preview(&seg.text, MOMENT_PREVIEW_CHARS));
            }
        }

        picker.add(
            last.start,
            format!("Conclusion: {}", preview(&last.text, OPENING_PREVIEW_CHARS)),
        );
    }

    finalize(picker.moments, max_frames)
}

fn is_salient(text: &str) -> bool {
    let lower = text.to_lowercase();
    SALIENCE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn finalize(mut moments: Vec<KeyMoment>, max_frames: usize) -> Vec<KeyMoment> {
    moments.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    moments.truncate(max_frames);
    moments
}

/// Drop moments at or past the end of the video.
pub fn filter_within_duration(moments: Vec<KeyMoment>, duration: f64) -> Vec<KeyMoment> {
    let before = moments.len();
    let kept: Vec<KeyMoment> = moments
        .into_iter()
        .filter(|m| m.timestamp >= 0.0 && m.timestamp < duration)
        .collect();

    if kept.len() < before {
        warn!(
            dropped = before - kept.len(),
            duration, "key moments beyond the video duration were dropped"
        );
    }
    kept
}

#[derive(Default)]
struct Picker {
    moments: Vec<KeyMoment>,
    claimed: HashSet<u64>,
}

impl Picker {
    fn add(&mut self, timestamp: f64, reason: String) {
        if self.claimed.insert(timestamp.to_bits()) {
            self.moments.push(KeyMoment::new(timestamp, reason));
        }
    }

    fn contains(&self, timestamp: f64) -> bool {
        self.claimed.contains(&timestamp.to_bits())
    }

    fn len(&self) -> usize {
        self.moments.len()
    }
}
