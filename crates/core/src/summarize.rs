//! Map-reduce summarization.
//!
//! The transcript is chunked, each chunk is mapped to a fixed structured
//! extraction, and one reduce call merges every extraction (in chunk order)
//! with the frame narrations into the final summary.

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chunking::chunk_text,
    error::{GlimpseError, Result},
    format::format_frame_narrations,
    generator::{self, GenerationError, Generator},
    types::{Chunk, ChunkExtraction, FrameNarration, SummaryReport},
};

pub const DEFAULT_CHUNK_SIZE: usize = 4000;

static MAP_TEMPLATE: &str = r#"You are analyzing one part of a longer video transcript. Extract the information below from THIS part only. Write "None" for sections with nothing relevant.

1. TOPICS: main subjects discussed
2. SPEAKERS: who speaks and their role, if identifiable
3. DECISIONS: decisions made or conclusions reached
4. ACTION ITEMS: tasks, assignments or follow-ups mentioned
5. TOOLS & SYSTEMS: software, products, services or systems named
6. TECHNICAL DETAILS: configurations, numbers, versions, specifications
7. PROBLEMS & SOLUTIONS: issues raised and how they were addressed
8. METRICS: quantities, dates, measurements, results
9. QUOTES: notable statements, verbatim where possible
10. CONTEXT: background needed to understand this part"#;

static REDUCE_TEMPLATE: &str = r#"You are writing a comprehensive summary of a video. You are given structured notes extracted from consecutive parts of its transcript, in order, and possibly descriptions of frames captured from the video.

Write the summary in markdown with exactly these ten sections:

## 1. Executive Overview
## 2. Topic Breakdown
## 3. Key Decisions
## 4. Action Items
## 5. Tools & Systems
## 6. Technical Specifications
## 7. Problems & Solutions
## 8. Insights & Notable Quotes
## 9. Visual Content
## 10. Next Steps

Merge duplicate points across parts, keep the chronological flow, and do not invent facts that are not in the notes. Under "Visual Content" use the frame descriptions; write "No frames were analyzed." if there are none."#;

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub model: String,
    pub chunk_size: usize,
    /// Map calls allowed in flight at once. Results keep chunk order
    /// regardless.
    pub map_concurrency: usize,
}

impl SummaryOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            map_concurrency: 1,
        }
    }
}

pub async fn summarize(
    generator: &dyn Generator,
    transcript_text: &str,
    narrations: &[FrameNarration],
    opts: &SummaryOptions,
    cancel: &CancellationToken,
) -> Result<SummaryReport> {
    let chunks = chunk_text(transcript_text, opts.chunk_size.max(1));
    if chunks.is_empty() && narrations.is_empty() {
        return Err(GlimpseError::EmptyTranscript);
    }

    info!(chunks = chunks.len(), frames = narrations.len(), "summarizing transcript");

    let extractions = map_chunks(generator, &chunks, opts, cancel).await?;

    let failed_chunks: Vec<usize> = extractions
        .iter()
        .filter(|e| e.is_failed())
        .map(ChunkExtraction::index)
        .collect();
    if !extractions.is_empty() && failed_chunks.len() == extractions.len() {
        return Err(GlimpseError::SummaryFailed {
            reason: format!("all {} chunk extractions failed", extractions.len()),
        });
    }

    let prompt = build_reduce_prompt(&extractions, narrations);
    let summary = generator::generate_text(generator, &opts.model, &prompt, cancel).await?;

    let frames_described = narrations.iter().filter(|n| n.is_described()).count();
    Ok(SummaryReport {
        summary: summary.trim().to_string(),
        chunk_count: chunks.len(),
        failed_chunks,
        frames_described,
        frames_failed: narrations.len() - frames_described,
    })
}

async fn map_chunks(
    generator: &dyn Generator,
    chunks: &[Chunk],
    opts: &SummaryOptions,
    cancel: &CancellationToken,
) -> Result<Vec<ChunkExtraction>> {
    let total = chunks.len();

    // `buffered` yields in input order, so the reduce sees chunk order even
    // when several map calls overlap.
    let results: Vec<Result<ChunkExtraction>> = stream::iter(chunks)
        .map(|chunk| map_chunk(generator, chunk, total, &opts.model, cancel))
        .buffered(opts.map_concurrency.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

async fn map_chunk(
    generator: &dyn Generator,
    chunk: &Chunk,
    total: usize,
    model: &str,
    cancel: &CancellationToken,
) -> Result<ChunkExtraction> {
    if cancel.is_cancelled() {
        return Err(GlimpseError::Cancelled);
    }

    let prompt = build_map_prompt(chunk, total);
    match generator::generate_text(generator, model, &prompt, cancel).await {
        Ok(text) => Ok(ChunkExtraction::Extracted {
            index: chunk.index,
            text: text.trim().to_string(),
        }),
        Err(GenerationError::Cancelled) => Err(GlimpseError::Cancelled),
        Err(e) => {
            warn!(chunk = chunk.index + 1, total, error = %e, "chunk extraction failed");
            Ok(ChunkExtraction::Failed {
                index: chunk.index,
                reason: e.to_string(),
            })
        }
    }
}

pub fn build_map_prompt(chunk: &Chunk, total: usize) -> String {
    format!(
        "{MAP_TEMPLATE}\n\nTRANSCRIPT PART {} OF {}:\n{}",
        chunk.index + 1,
        total,
        chunk.text
    )
}

pub fn build_reduce_prompt(
    extractions: &[ChunkExtraction],
    narrations: &[FrameNarration],
) -> String {
    let total = extractions.len();
    let notes = if extractions.is_empty() {
        "No transcript was available for this video.".to_string()
    } else {
        extractions
            .iter()
            .map(|e| match e {
                ChunkExtraction::Extracted { index, text } => {
                    format!("=== PART {} OF {} ===\n{}", index + 1, total, text)
                }
                ChunkExtraction::Failed { index, .. } => format!(
                    "=== PART {} OF {} ===\n[Extraction unavailable for this part.]",
                    index + 1,
                    total
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut prompt = format!("{REDUCE_TEMPLATE}\n\nTRANSCRIPT NOTES:\n{notes}");
    if !narrations.is_empty() {
        prompt.push_str("\n\nFRAME DESCRIPTIONS:\n");
        prompt.push_str(&format_frame_narrations(narrations));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_support::{CallKind, ScriptedGenerator},
        types::{FrameFailure, NarrationStatus},
    };

    fn echo_generator() -> ScriptedGenerator {
        ScriptedGenerator::new(|call| {
            if call.prompt.starts_with("You are analyzing one part") {
                let part = call
                    .prompt
                    .lines()
                    .find(|l| l.starts_with("TRANSCRIPT PART"))
                    .unwrap_or_default()
                    .to_string();
                Ok(format!("notes for {part}"))
            } else {
                Ok("## 1. Executive Overview\nfinal".into())
            }
        })
    }

    fn opts(chunk_size: usize, map_concurrency: usize) -> SummaryOptions {
        SummaryOptions {
            model: "llama3.2".into(),
            chunk_size,
            map_concurrency,
        }
    }

    #[tokio::test]
    async fn single_chunk_makes_one_map_and_one_reduce() {
        let generator = echo_generator();
        let cancel = CancellationToken::new();

        let report = summarize(&generator, "Short talk. Very short.", &[], &opts(1000, 1), &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 1);
        assert_eq!(generator.count(CallKind::Text), 2);
        let prompts = generator.prompts(CallKind::Text);
        assert!(prompts[0].contains("TRANSCRIPT PART 1 OF 1:\nShort talk. Very short."));
        assert!(prompts[1].contains("=== PART 1 OF 1 ===\nnotes for TRANSCRIPT PART 1 OF 1:"));
        assert_eq!(report.summary, "## 1. Executive Overview\nfinal");
    }

    #[tokio::test]
    async fn many_chunks_map_in_order_then_reduce_once() {
        let generator = echo_generator();
        let cancel = CancellationToken::new();
        let text = "First sentence here. Second sentence here. Third sentence here. Fourth one.";

        let report = summarize(&generator, text, &[], &opts(25, 3), &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 4);
        let prompts = generator.prompts(CallKind::Text);
        assert_eq!(prompts.len(), 5);

        let reduce = prompts.last().unwrap();
        assert!(reduce.starts_with("You are writing a comprehensive summary"));
        let positions: Vec<usize> = (1..=4)
            .map(|i| reduce.find(&format!("=== PART {i} OF 4 ===")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(report.failed_chunks.is_empty());
    }

    /// Holds early parts back longer than later ones so map calls finish in
    /// reverse order.
    struct SlowEarlyParts {
        total: u64,
        events: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Generator for SlowEarlyParts {
        async fn generate_text(
            &self,
            _model: &str,
            prompt: &str,
        ) -> std::result::Result<String, GenerationError> {
            let Some(part) = prompt
                .lines()
                .find_map(|l| l.strip_prefix("TRANSCRIPT PART "))
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<u64>().ok())
            else {
                self.events.lock().unwrap().push("reduce".into());
                return Ok("final".into());
            };

            let delay = (self.total - part + 1) * 40;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            self.events.lock().unwrap().push(format!("map {part}"));
            Ok(format!("notes {part}"))
        }

        async fn generate_vision(
            &self,
            _model: &str,
            _prompt: &str,
            _images: &[Vec<u8>],
        ) -> std::result::Result<String, GenerationError> {
            unreachable!("summaries never send images")
        }

        async fn model_available(
            &self,
            _model: &str,
        ) -> std::result::Result<bool, GenerationError> {
            Ok(true)
        }

        async fn pull_model(
            &self,
            _model: &str,
            _on_progress: &(dyn Fn(crate::generator::PullProgress) + Send + Sync),
        ) -> std::result::Result<(), GenerationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_maps_finishing_out_of_order_keep_chunk_order() {
        let generator = SlowEarlyParts {
            total: 4,
            events: std::sync::Mutex::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let text = "First sentence here. Second sentence here. Third sentence here. Fourth one.";

        let report = summarize(&generator, text, &[], &opts(25, 4), &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 4);
        let events = generator.events.lock().unwrap().clone();
        assert_eq!(events, vec!["map 4", "map 3", "map 2", "map 1", "reduce"]);
        assert_eq!(report.summary, "final");
    }

    #[tokio::test]
    async fn reduce_lists_parts_in_chunk_order_after_out_of_order_maps() {
        let generator = std::sync::Arc::new(SlowEarlyParts {
            total: 3,
            events: std::sync::Mutex::new(Vec::new()),
        });
        let chunks: Vec<Chunk> = (0..3)
            .map(|index| Chunk {
                index,
                text: format!("chunk {index}"),
            })
            .collect();
        let cancel = CancellationToken::new();

        let extractions = map_chunks(generator.as_ref(), &chunks, &opts(100, 3), &cancel)
            .await
            .unwrap();

        let indices: Vec<usize> = extractions.iter().map(ChunkExtraction::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let reduce = build_reduce_prompt(&extractions, &[]);
        let positions: Vec<usize> = (1..=3)
            .map(|i| reduce.find(&format!("=== PART {i} OF 3 ===\nnotes {i}")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            generator.events.lock().unwrap().clone(),
            vec!["map 3", "map 2", "map 1"]
        );
    }

    #[tokio::test]
    async fn failed_map_call_is_isolated() {
        let generator = ScriptedGenerator::new(|call| {
            if call.prompt.contains("TRANSCRIPT PART 2 OF 3") {
                Err(GenerationError::Api {
                    status: 500,
                    message: "context overflow".into(),
                })
            } else {
                Ok("ok".into())
            }
        });
        let cancel = CancellationToken::new();
        let text = "Alpha alpha alpha. Beta beta beta. Gamma gamma gamma.";

        let report = summarize(&generator, text, &[], &opts(20, 1), &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.failed_chunks, vec![1]);
        assert_eq!(generator.count(CallKind::Text), 4);
        let reduce = generator.prompts(CallKind::Text).pop().unwrap();
        assert!(reduce.contains("=== PART 2 OF 3 ===\n[Extraction unavailable for this part.]"));
    }

    #[tokio::test]
    async fn all_maps_failing_fails_the_summary() {
        let generator = ScriptedGenerator::new(|_| {
            Err(GenerationError::Api {
                status: 503,
                message: "down".into(),
            })
        });
        let cancel = CancellationToken::new();

        let err = summarize(&generator, "One. Two.", &[], &opts(100, 1), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, GlimpseError::SummaryFailed { .. }));
        assert_eq!(generator.count(CallKind::Text), 1);
    }

    #[tokio::test]
    async fn narrations_reach_the_reduce_prompt() {
        let generator = echo_generator();
        let cancel = CancellationToken::new();
        let narrations = vec![
            FrameNarration {
                frame_number: 1,
                timestamp: 0.0,
                description: "A title slide".into(),
                transcript_context: "welcome".into(),
                status: NarrationStatus::Described,
            },
            FrameNarration {
                frame_number: 2,
                timestamp: 30.0,
                description: "[Frame 2 could not be described]".into(),
                transcript_context: "moving on".into(),
                status: NarrationStatus::Failed {
                    failure: FrameFailure::EmptyDescription,
                },
            },
        ];

        let report = summarize(&generator, "Welcome all.", &narrations, &opts(1000, 1), &cancel)
            .await
            .unwrap();

        let reduce = generator.prompts(CallKind::Text).pop().unwrap();
        assert!(reduce.contains("FRAME DESCRIPTIONS:\n[00:00] Frame 1: A title slide"));
        assert_eq!(report.frames_described, 1);
        assert_eq!(report.frames_failed, 1);
    }

    #[tokio::test]
    async fn empty_transcript_without_frames_is_an_error() {
        let generator = echo_generator();
        let cancel = CancellationToken::new();

        let err = summarize(&generator, "  ", &[], &opts(1000, 1), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, GlimpseError::EmptyTranscript));
        assert!(generator.calls().is_empty());
    }
}
