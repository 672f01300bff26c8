//! WebVTT / SRT cue parsing into a [`Transcript`].
//!
//! Malformed cues are dropped, never fatal.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::types::{Segment, Transcript};

static CUE_TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{2,}):(\d{2}):(\d{2})[.,](\d{3})\s*-->\s*(\d{2,}):(\d{2}):(\d{2})[.,](\d{3})",
    )
    .expect("cue timing pattern is valid")
});

static INLINE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("inline tag pattern is valid"));

const HEADER_PREFIXES: [&str; 4] = ["WEBVTT", "NOTE", "STYLE", "REGION"];

/// Parse subtitle text into a transcript.
pub fn parse_subtitles(content: &str) -> Transcript {
    let mut segments = Vec::new();
    let mut skipped = 0usize;

    for block in split_blocks(content) {
        if is_header_block(&block) {
            continue;
        }

        match parse_cue(&block) {
            Some(segment) => segments.push(segment),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, kept = segments.len(), "dropped malformed subtitle cues");
    }

    Transcript::from_segments(segments)
}

fn split_blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

fn is_header_block(block: &[&str]) -> bool {
    let first = block
        .first()
        .map(|l| l.trim_start_matches('\u{feff}').trim())
        .unwrap_or_default();

    HEADER_PREFIXES.iter().any(|prefix| first.starts_with(prefix))
}

fn parse_cue(block: &[&str]) -> Option<Segment> {
    let (timing_idx, caps) = block
        .iter()
        .enumerate()
        .find_map(|(i, line)| CUE_TIMING.captures(line).map(|c| (i, c)))?;

    let start = timestamp_seconds(&caps, 1)?;
    let end = timestamp_seconds(&caps, 5)?;
    if end < start {
        return None;
    }

    let text = block[timing_idx + 1..]
        .iter()
        .map(|line| INLINE_TAG.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        return None;
    }

    Some(Segment { start, end, text })
}

fn timestamp_seconds(caps: &Captures<'_>, first_group: usize) -> Option<f64> {
    let part = |offset: usize| -> Option<f64> {
        caps.get(first_group + offset)?.as_str().parse().ok()
    };

    let hours = part(0)?;
    let minutes = part(1)?;
    let seconds = part(2)?;
    let millis = part(3)?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_cue() {
        let transcript = parse_subtitles("00:00:00.000 --> 00:00:02.000\nHello world");

        assert_eq!(
            transcript.segments,
            vec![Segment {
                start: 0.0,
                end: 2.0,
                text: "Hello world".to_string(),
            }]
        );
        assert_eq!(transcript.text, "Hello world");
    }

    #[test]
    fn skips_header_notes_and_blocks_without_timing() {
        let vtt = "WEBVTT\nKind: captions\n\nNOTE this is a comment\n\n\
                   just some stray text\n\n\
                   00:00:01.500 --> 00:00:03.250\nFirst line\nsecond line\n\n\
                   00:01:00.000 --> 00:01:02.000\n\n\
                   01:02:03.004 --> 01:02:05.000\nLast";

        let transcript = parse_subtitles(vtt);

        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].text, "First line second line");
        assert_eq!(transcript.segments[0].start, 1.5);
        assert_eq!(transcript.segments[0].end, 3.25);
        assert!((transcript.segments[1].start - 3723.004).abs() < 1e-9);
        assert_eq!(transcript.text, "First line second line Last");
    }

    #[test]
    fn accepts_srt_comma_millis_and_index_lines() {
        let srt = "1\r\n00:00:04,200 --> 00:00:06,000\r\nComma separated\r\n\r\n\
                   2\r\n00:00:06,000 --> 00:00:08,500\r\nSecond cue\r\n";

        let transcript = parse_subtitles(srt);

        assert_eq!(transcript.segments.len(), 2);
        assert!((transcript.segments[0].start - 4.2).abs() < 1e-9);
        assert_eq!(transcript.segments[1].text, "Second cue");
    }

    #[test]
    fn strips_inline_markup() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000 align:start\n\
                   <c>so</c><00:00:00.500><c> today</c> <b>we</b>";

        let transcript = parse_subtitles(vtt);

        assert_eq!(transcript.segments[0].text, "so today we");
    }

    #[test]
    fn drops_reversed_cues_and_orders_by_start() {
        let vtt = "00:00:10.000 --> 00:00:12.000\nlater\n\n\
                   00:00:05.000 --> 00:00:04.000\nbroken\n\n\
                   00:00:01.000 --> 00:00:02.000\nearlier";

        let transcript = parse_subtitles(vtt);

        let texts: Vec<_> = transcript.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["earlier", "later"]);
        assert_eq!(transcript.text, "earlier later");
    }

    #[test]
    fn empty_input_yields_empty_transcript() {
        let transcript = parse_subtitles("WEBVTT\n\n");
        assert!(transcript.is_empty());
        assert_eq!(transcript.text, "");
    }
}
