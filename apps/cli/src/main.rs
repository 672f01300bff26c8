use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Result, bail};
use clap::{ArgAction, Parser};
use console::style;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use glimpse_core::{
    DocumentInfo, GlimpseError, OllamaClient, PipelineConfig, SelectionSource, Session,
    Transcript, ensure_model, extract_audio, extract_frames, filter_within_duration,
    format_summary_document, format_transcript_with_timestamps, load_transcript,
    narrate_frames, narrator::all_images_rejected, probe_duration, save_summary,
    save_transcript, select_key_moments, summarize, transcribe_audio,
};

use crate::ui::{Step, format_duration};

mod logging;
mod ui;

#[derive(Parser)]
#[command(name = "glimpse")]
#[command(
    about = "Pick key frames from a video, narrate them with a vision model and write a structured summary"
)]
struct Cli {
    /// Video file to summarize
    video: PathBuf,

    /// Use an existing transcript (.vtt, .srt or whisper .json) instead of running whisper
    #[arg(short, long)]
    subtitles: Option<PathBuf>,

    /// Maximum number of key frames to narrate
    #[arg(short, long)]
    max_frames: Option<usize>,

    /// Ollama server URL
    #[arg(long)]
    host: Option<String>,

    /// Model for key moments and the summary
    #[arg(long)]
    text_model: Option<String>,

    /// Model for frame descriptions
    #[arg(long)]
    vision_model: Option<String>,

    /// Whisper model size (tiny, base, small, medium, large)
    #[arg(long)]
    whisper_model: Option<String>,

    /// Transcript chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Summarize from the transcript only
    #[arg(long)]
    no_frames: bool,

    /// Where to write the summary (default: <video>_summary.md next to the video)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the scratch directory with audio, frames and transcript
    #[arg(long)]
    keep_session: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(model) = &self.text_model {
            config.text_model = model.clone();
        }
        if let Some(model) = &self.vision_model {
            config.vision_model = model.clone();
        }
        if let Some(size) = &self.whisper_model {
            config.whisper_model = size.clone();
        }
        if let Some(max_frames) = self.max_frames {
            config.max_frames = max_frames;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size.max(1);
        }
        if self.no_frames {
            config.max_frames = 0;
        }
        config
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .video
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".to_string());
            self.video.with_file_name(format!("{stem}_summary.md"))
        })
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let Err(e) = run(cli, cancel).await {
        eprintln!("\n{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

/// Race a step that has no cancellation of its own against the token.
async fn or_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = glimpse_core::Result<T>>,
) -> glimpse_core::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GlimpseError::Cancelled),
        result = fut => result,
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    if !cli.video.is_file() {
        bail!("video not found: {}", cli.video.display());
    }

    let config = cli.config();
    let client = OllamaClient::with_timeout(&config.host, config.request_timeout());
    let source = cli
        .video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.video.display().to_string());

    println!(
        "\n{}  {}\n",
        style("glimpse").cyan().bold(),
        style("Video Summarizer").dim()
    );

    let mut session = Session::create()?;
    if cli.keep_session {
        session.keep();
    }

    let total_start = Instant::now();

    // Step 1: Transcript
    let transcript = obtain_transcript(&cli, &config, &session, &cancel).await?;
    if cli.keep_session {
        fs::write(
            session.root().join("transcript.txt"),
            format_transcript_with_timestamps(&transcript),
        )
        .await?;
    }

    // Step 2: Duration
    let duration = match probe_duration(&cli.video, &cancel).await {
        Ok(duration) => Some(duration),
        Err(GlimpseError::Cancelled) => return Err(GlimpseError::Cancelled.into()),
        Err(e) => {
            warn!(error = %e, "could not probe video duration");
            println!(
                "{} Duration unknown, key moments will not be bounded",
                style("!").yellow().bold()
            );
            None
        }
    };

    // Step 3: Models
    let want_frames = config.max_frames > 0 && !transcript.is_empty();
    let mut models = vec![config.text_model.clone()];
    if want_frames && config.vision_model != config.text_model {
        models.push(config.vision_model.clone());
    }
    for model in &models {
        let step = Step::start(&format!("Checking model {model}..."));
        let reporter = step.pull_reporter(model);
        step.watch(ensure_model(&client, model, &reporter, &cancel))
            .await
            .map_err(GlimpseError::from)?;
        step.done(format!("Model ready: {}", style(model).yellow()));
    }

    // Step 4: Key moments and frames
    let mut moments = Vec::new();
    let mut narrations = Vec::new();
    if want_frames {
        let step = Step::start("Selecting key moments...");
        let selection = step
            .watch(select_key_moments(
                &client,
                &config.text_model,
                &transcript.segments,
                config.max_frames,
                &cancel,
            ))
            .await?;
        moments = match duration {
            Some(duration) => filter_within_duration(selection.moments, duration),
            None => selection.moments,
        };
        match &selection.source {
            SelectionSource::Model => {
                step.done(format!("Key moments: {} selected by the model", moments.len()))
            }
            SelectionSource::Heuristic { reason } => step.degraded(format!(
                "Key moments: {} from the heuristic {}",
                moments.len(),
                style(format!("({reason})")).dim()
            )),
        }

        let timestamps: Vec<f64> = moments.iter().map(|m| m.timestamp).collect();
        if !timestamps.is_empty() {
            let step = Step::start(&format!("Extracting {} frames...", timestamps.len()));
            let frames = step
                .watch(extract_frames(
                    &cli.video,
                    &timestamps,
                    &session.frames_dir(),
                    &cancel,
                ))
                .await?;
            step.done(format!("Extracted {} frames", frames.len()));

            let step = Step::start(&format!("Narrating frames with {}...", config.vision_model));
            narrations = step
                .watch(narrate_frames(
                    &client,
                    &frames,
                    &transcript.segments,
                    &config.narrator_options(),
                    &cancel,
                ))
                .await?;

            let failed = narrations.iter().filter(|n| !n.is_described()).count();
            if all_images_rejected(&narrations) {
                warn!(
                    model = %config.vision_model,
                    "model rejected every image, continuing text-only"
                );
                step.degraded(format!(
                    "{} does not accept images, summarizing from the transcript only",
                    config.vision_model
                ));
                narrations.clear();
            } else if failed > 0 {
                step.degraded(format!(
                    "Narrated {} frames, {} failed",
                    narrations.len() - failed,
                    failed
                ));
            } else {
                step.done(format!("Narrated {} frames", narrations.len()));
            }
        }
    }

    // Step 5: Summary
    let step = Step::start(&format!("Summarizing with {}...", config.text_model));
    let report = step
        .watch(summarize(
            &client,
            &transcript.text,
            &narrations,
            &config.summary_options(),
            &cancel,
        ))
        .await?;
    if report.failed_chunks.is_empty() {
        step.done(format!("Summarized {} chunks", report.chunk_count));
    } else {
        step.degraded(format!(
            "Summarized {} chunks, {} failed",
            report.chunk_count,
            report.failed_chunks.len()
        ));
    }

    let info = DocumentInfo {
        source: &source,
        duration_seconds: duration
            .or_else(|| (!transcript.is_empty()).then(|| transcript.duration())),
        moments: &moments,
    };
    let document = format_summary_document(&info, &report);
    let output_path = save_summary(&document, &cli.output_path()).await?;

    println!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    println!(
        "{} {}",
        style("Saved:").dim(),
        style(output_path.display()).cyan()
    );
    if cli.keep_session {
        println!(
            "{} {}",
            style("Session:").dim(),
            style(session.root().display()).cyan()
        );
    }
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", document);

    Ok(())
}

async fn obtain_transcript(
    cli: &Cli,
    config: &PipelineConfig,
    session: &Session,
    cancel: &CancellationToken,
) -> Result<Transcript> {
    if let Some(path) = &cli.subtitles {
        let step = Step::start("Loading subtitles...");
        let transcript = step.watch(load_transcript(path)).await?;
        step.done(format!(
            "Loaded {} cues from {}",
            transcript.segments.len(),
            style(display_name(path)).dim()
        ));
        return Ok(transcript);
    }

    let step = Step::start("Extracting audio...");
    step.watch(or_cancel(cancel, extract_audio(&cli.video, &session.audio_path())))
        .await?;
    step.done("Audio extracted");

    let step = Step::start(&format!("Transcribing with whisper ({})...", config.whisper_model));
    let transcript = step
        .watch(or_cancel(
            cancel,
            transcribe_audio(&session.audio_path(), &config.whisper_model, session.root()),
        ))
        .await?;
    save_transcript(&transcript, &session.transcript_path()).await?;

    let language = transcript.language.as_deref().unwrap_or("unknown language");
    step.done(format!(
        "Transcribed: {:.1} min, {}",
        transcript.duration() / 60.0,
        style(language).yellow()
    ));
    Ok(transcript)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
