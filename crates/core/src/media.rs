//! ffmpeg, ffprobe and whisper subprocesses, plus transcript and summary files.

use std::{
    path::{Path, PathBuf},
    process::Output,
};

use serde::Deserialize;
use tokio::{fs, process::Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{GlimpseError, Result},
    subtitle::parse_subtitles,
    types::{FrameInfo, Segment, Transcript},
};

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    language: Option<String>,
}

/// Extract audio from video using ffmpeg
pub async fn extract_audio(video_path: &Path, audio_path: &Path) -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .arg("-vn")
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ar")
        .arg("16000")
        .arg("-ac")
        .arg("1")
        .arg(audio_path)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(GlimpseError::AudioExtractionFailed {
            video_path: video_path.to_path_buf(),
            reason: stderr(&output),
        });
    }

    Ok(())
}

/// Container duration in seconds, as reported by ffprobe.
pub async fn probe_duration(video_path: &Path, cancel: &CancellationToken) -> Result<f64> {
    if cancel.is_cancelled() {
        return Err(GlimpseError::Cancelled);
    }

    let mut ffprobe = Command::new("ffprobe");
    ffprobe
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(video_path)
        .kill_on_drop(true);

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GlimpseError::Cancelled),
        output = ffprobe.output() => output?,
    };

    let probe_failed = |reason: String| GlimpseError::ProbeFailed {
        video_path: video_path.to_path_buf(),
        reason,
    };

    if !output.status.success() {
        return Err(probe_failed(stderr(&output)));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout)).map_err(probe_failed)
}

fn parse_duration(stdout: &str) -> std::result::Result<f64, String> {
    let raw = stdout.trim();
    match raw.parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Ok(d),
        _ => Err(format!("unexpected ffprobe output '{raw}'")),
    }
}

/// Grab one still per timestamp, numbered from 1 in the given order.
///
/// Any failed grab aborts the whole extraction.
pub async fn extract_frames(
    video_path: &Path,
    timestamps: &[f64],
    frames_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<FrameInfo>> {
    fs::create_dir_all(frames_dir).await?;

    let mut frames = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(GlimpseError::Cancelled);
        }

        let frame_number = i + 1;
        let path = frames_dir.join(format!("frame_{frame_number:03}.jpg"));
        let frame_failed = |reason: String| GlimpseError::FrameExtractionFailed {
            video_path: video_path.to_path_buf(),
            timestamp,
            reason,
        };

        let mut grab = Command::new("ffmpeg");
        grab.arg("-y")
            .arg("-ss")
            .arg(format!("{timestamp:.3}"))
            .arg("-i")
            .arg(video_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("2")
            .arg(&path)
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GlimpseError::Cancelled),
            output = grab.output() => output?,
        };

        if !output.status.success() {
            return Err(frame_failed(stderr(&output)));
        }
        // ffmpeg exits cleanly without writing anything when seeking past the end.
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(frame_failed("no frame was written".into()));
        }

        debug!(frame = frame_number, timestamp, "frame extracted");
        frames.push(FrameInfo {
            path,
            timestamp,
            frame_number,
        });
    }

    info!(count = frames.len(), "frames extracted");
    Ok(frames)
}

/// Transcribe audio using the whisper CLI
pub async fn transcribe_audio(
    audio_path: &Path,
    model_size: &str,
    output_dir: &Path,
) -> Result<Transcript> {
    let output = Command::new("whisper")
        .arg(audio_path)
        .arg("--model")
        .arg(model_size)
        .arg("--output_format")
        .arg("json")
        .arg("--output_dir")
        .arg(output_dir)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(GlimpseError::TranscriptFailed {
            audio_path: audio_path.to_path_buf(),
            reason: stderr(&output),
        });
    }

    // Whisper names its output after the input file.
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    let whisper_output = output_dir.join(format!("{stem}.json"));

    let json_content = fs::read_to_string(&whisper_output).await?;
    parse_whisper_json(&json_content)
}

fn parse_whisper_json(content: &str) -> Result<Transcript> {
    let parsed: WhisperOutput = serde_json::from_str(content)?;
    let segments = parsed
        .segments
        .into_iter()
        .map(|seg| Segment {
            text: seg.text.trim().to_string(),
            ..seg
        })
        .filter(|seg| !seg.text.is_empty())
        .collect();

    let transcript = Transcript::from_segments(segments);
    Ok(match parsed.language {
        Some(language) => transcript.with_language(language),
        None => transcript,
    })
}

/// Load a transcript from `.vtt`, `.srt` or `.json`.
pub async fn load_transcript(path: &Path) -> Result<Transcript> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "vtt" | "srt" => {
            let content = fs::read_to_string(path).await?;
            Ok(parse_subtitles(&content))
        }
        "json" => {
            let content = fs::read_to_string(path).await?;
            parse_whisper_json(&content)
        }
        _ => Err(GlimpseError::UnsupportedTranscriptFormat {
            path: path.to_path_buf(),
        }),
    }
}

pub async fn save_transcript(transcript: &Transcript, path: &Path) -> Result<()> {
    let json_content = serde_json::to_string_pretty(transcript)?;
    fs::write(path, json_content).await?;
    Ok(())
}

pub async fn save_summary(summary: &str, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, summary).await?;
    Ok(path.to_path_buf())
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
