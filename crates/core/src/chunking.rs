//! Sentence-aligned, size-bounded chunking of transcript text.

use crate::types::Chunk;

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into sentences. A sentence ends at `.`, `!` or `?` (runs like
/// `?!` stay together) followed by whitespace or the end of the text.
/// Trailing text without a terminator is the final sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            end = next_idx + next.len_utf8();
            chars.next();
        }

        let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Group sentences into chunks of at most `max_chars` characters.
///
/// A chunk is flushed only when the next sentence would push it over the
/// limit, so a single sentence longer than `max_chars` becomes its own chunk
/// rather than being split.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        let joined_chars = if buffer.is_empty() {
            sentence_chars
        } else {
            buffer_chars + 1 + sentence_chars
        };

        if joined_chars > max_chars && !buffer.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: std::mem::take(&mut buffer),
            });
            buffer.push_str(sentence);
            buffer_chars = sentence_chars;
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(sentence);
            buffer_chars = joined_chars;
        }
    }

    if !buffer.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            text: buffer,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn splits_on_terminators_followed_by_whitespace() {
        let sentences = split_sentences("Version 2.5 is out. Really?! Yes!  And more");
        assert_eq!(
            sentences,
            vec!["Version 2.5 is out.", "Really?!", "Yes!", "And more"]
        );
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("One. Two. Three.", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "One. Two. Three.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn chunks_respect_limit_and_sentence_boundaries() {
        let text = "Alpha beta gamma. Delta epsilon. Zeta eta theta iota. Kappa. Lambda mu nu xi.";
        let chunks = chunk_text(text, 35);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.text.chars().count() <= 35, "chunk too large: {chunk:?}");
            assert!(chunk.text.ends_with('.'));
        }

        let rejoined = chunks
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize(&rejoined), normalize(text));
    }

    #[test]
    fn oversized_sentence_stands_alone() {
        let long = format!("{}.", "word ".repeat(30).trim_end());
        let text = format!("Short one. {long} Tail.");
        let chunks = chunk_text(&text, 20);

        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Short one.", long.as_str(), "Tail."]);
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        assert!(chunk_text("   \n ", 50).is_empty());
        assert!(chunk_text("", 50).is_empty());
    }
}
