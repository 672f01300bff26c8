use crate::types::{FrameNarration, KeyMoment, SummaryReport, Transcript};

/// Format seconds as MM:SS, or H:MM:SS past the first hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format transcript segments with timestamps
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|seg| format!("[{}] {}", format_timestamp(seg.start), seg.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One narration block as it is fed to the reduce step and printed.
pub fn format_frame_narration(narration: &FrameNarration) -> String {
    format!(
        "[{}] Frame {}: {}\nSpoken around this frame: {}",
        format_timestamp(narration.timestamp),
        narration.frame_number,
        narration.description,
        narration.transcript_context
    )
}

pub fn format_frame_narrations(narrations: &[FrameNarration]) -> String {
    narrations
        .iter()
        .map(format_frame_narration)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Metadata printed above the generated summary.
pub struct DocumentInfo<'a> {
    pub source: &'a str,
    pub duration_seconds: Option<f64>,
    pub moments: &'a [KeyMoment],
}

/// Format the final summary as a markdown document
pub fn format_summary_document(info: &DocumentInfo<'_>, report: &SummaryReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Video summary: {}\n\n", info.source));

    let duration = info
        .duration_seconds
        .map(format_timestamp)
        .unwrap_or_else(|| "unknown".to_string());
    output.push_str(&format!(
        "**Duration:** {} | **Chunks:** {} | **Frames described:** {}/{}\n\n",
        duration,
        report.chunk_count,
        report.frames_described,
        report.frames_described + report.frames_failed
    ));

    if !report.failed_chunks.is_empty() {
        let failed = report
            .failed_chunks
            .iter()
            .map(|i| (i + 1).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        output.push_str(&format!(
            "> Note: extraction failed for chunk(s) {}; the summary may be incomplete.\n\n",
            failed
        ));
    }

    if !info.moments.is_empty() {
        output.push_str("## Key moments\n\n");
        for moment in info.moments {
            output.push_str(&format!(
                "• [{}] {}\n",
                format_timestamp(moment.timestamp),
                moment.reason
            ));
        }
        output.push('\n');
    }

    output.push_str(report.summary.trim());
    output.push('\n');

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NarrationStatus;

    #[test]
    fn timestamps_switch_to_hours() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }

    #[test]
    fn narration_block_carries_transcript_excerpt() {
        let narration = FrameNarration {
            frame_number: 2,
            timestamp: 65.0,
            description: "A terminal window".into(),
            transcript_context: "now run the build".into(),
            status: NarrationStatus::Described,
        };

        assert_eq!(
            format_frame_narration(&narration),
            "[01:05] Frame 2: A terminal window\nSpoken around this frame: now run the build"
        );
    }

    #[test]
    fn document_lists_moments_and_failed_chunks() {
        let moments = vec![KeyMoment::new(0.0, "Opening: hi")];
        let report = SummaryReport {
            summary: "## 1. Executive Overview\nStuff".into(),
            chunk_count: 3,
            failed_chunks: vec![1],
            frames_described: 1,
            frames_failed: 1,
        };
        let info = DocumentInfo {
            source: "talk.mp4",
            duration_seconds: Some(90.0),
            moments: &moments,
        };

        let doc = format_summary_document(&info, &report);

        assert!(doc.starts_with("# Video summary: talk.mp4\n"));
        assert!(doc.contains("**Duration:** 01:30 | **Chunks:** 3 | **Frames described:** 1/2"));
        assert!(doc.contains("chunk(s) 2;"));
        assert!(doc.contains("• [00:00] Opening: hi"));
        assert!(doc.ends_with("Stuff\n"));
    }
}
