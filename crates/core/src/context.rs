use crate::types::Segment;

/// Returned when no segment overlaps the window, so "nothing was said"
/// stays distinguishable from "not computed".
pub const NO_TRANSCRIPT_MARKER: &str = "[no transcript available]";

pub const DEFAULT_CONTEXT_WINDOW: f64 = 5.0;

/// Transcript text spoken within `window` seconds either side of `timestamp`.
pub fn transcript_context(timestamp: f64, segments: &[Segment], window: f64) -> String {
    let (from, to) = (timestamp - window, timestamp + window);

    let text = segments
        .iter()
        .filter(|seg| seg.start <= to && seg.end >= from)
        .map(|seg| seg.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        NO_TRANSCRIPT_MARKER.to_string()
    } else {
        text
    }
}
