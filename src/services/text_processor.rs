// Text Processing Service
// Sentence/paragraph segmentation and small text helpers shared by the scorers and the humanizer

use regex::Regex;
use std::sync::OnceLock;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+|[\u{4e00}-\u{9fff}]").expect("token regex"))
}

fn sentence_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence break regex"))
}

fn word_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+").expect("word span regex"))
}

fn ordered_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[.)]\s").expect("ordered item regex"))
}

/// Character count (not UTF-8 byte length).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate token count (English words + CJK chars)
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 1;
    }
    token_re().find_iter(text).count().max(1)
}

/// Case-insensitive containment check.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whitespace-delimited word spans, used for in-place edits that must keep line breaks.
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    word_span_re()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
}

/// Split into sentence spans. A boundary is `.`, `!` or `?` followed by whitespace;
/// the punctuation stays with the sentence and the whitespace run is the separator.
pub fn split_sentence_spans(text: &str) -> Vec<SentenceSpan> {
    let mut spans = Vec::new();
    let content_end = text.trim_end().len();
    let mut cursor = text.len() - text.trim_start().len();

    if cursor >= content_end {
        return spans;
    }

    for m in sentence_break_re().find_iter(text) {
        // Punctuation is ASCII, so the sentence ends one byte into the match.
        let end = m.start() + 1;
        if end > content_end {
            break;
        }
        if end > cursor {
            spans.push(SentenceSpan { start: cursor, end });
        }
        cursor = m.end();
    }

    if cursor < content_end {
        spans.push(SentenceSpan {
            start: cursor,
            end: content_end,
        });
    }

    spans
}

/// Split on blank lines. Lines inside a paragraph are kept verbatim (minus trailing whitespace).
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }

    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Separate a leading markdown heading from the body.
/// Only the first non-empty line is considered; text before a later heading is never dropped.
pub fn extract_title(text: &str) -> (Option<String>, String) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            offset += line.len();
            continue;
        }
        if trimmed.starts_with('#') {
            let body = text[offset + line.len()..].to_string();
            return (Some(line.trim_end().to_string()), body);
        }
        break;
    }
    (None, text.to_string())
}

/// Markdown elements that must not be rewritten: short lines, list/numbered items,
/// headings, quotes, code fences and table rows.
pub fn is_structural(paragraph: &str, min_chars: usize) -> bool {
    let trimmed = paragraph.trim();
    if char_len(trimmed) < min_chars {
        return true;
    }
    if trimmed.starts_with(&['-', '*', '+', '#', '>', '|'][..]) || trimmed.starts_with("```") {
        return true;
    }
    ordered_item_re().is_match(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("Hello World"), 2);
        assert_eq!(estimate_tokens("你好世界"), 4);
        assert_eq!(estimate_tokens(""), 1);
    }

    fn sentences(text: &str) -> Vec<&str> {
        split_sentence_spans(text)
            .into_iter()
            .map(|s| &text[s.start..s.end])
            .collect()
    }

    #[test]
    fn test_sentence_spans() {
        assert_eq!(
            sentences("First one. Second one! Third one? Tail"),
            vec!["First one.", "Second one!", "Third one?", "Tail"]
        );
    }

    #[test]
    fn test_sentence_spans_keep_decimals_together() {
        let found = sentences("Pi is 3.14 roughly. Done.");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], "Pi is 3.14 roughly.");
    }

    #[test]
    fn test_sentence_spans_skip_outer_whitespace() {
        let text = "  Alpha beta.  Gamma.\n";
        let spans = split_sentence_spans(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].start..spans[0].end], "Alpha beta.");
        assert_eq!(&text[spans[1].start..spans[1].end], "Gamma.");
        assert!(split_sentence_spans("   ").is_empty());
    }

    #[test]
    fn test_split_paragraphs() {
        let text = "First paragraph.\nStill first.\n\n\n  \nSecond paragraph.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0], "First paragraph.\nStill first.");
    }

    #[test]
    fn test_extract_title() {
        let (title, body) = extract_title("\n# Heading\n\nBody text.");
        assert_eq!(title.as_deref(), Some("# Heading"));
        assert_eq!(body.trim(), "Body text.");

        let (title, body) = extract_title("Intro line.\n# Later heading\nMore.");
        assert!(title.is_none());
        assert!(body.starts_with("Intro line."));
    }

    #[test]
    fn test_is_structural() {
        assert!(is_structural("Short line", 50));
        assert!(is_structural("- a list item that is definitely longer than fifty characters", 50));
        assert!(is_structural("12. a numbered item that is definitely longer than fifty chars", 50));
        assert!(!is_structural(
            "A regular paragraph sentence that easily runs past the fifty character mark.",
            50
        ));
    }

    #[test]
    fn test_contains_ci() {
        assert!(contains_ci("Visiting KARACHI soon", "karachi"));
        assert!(!contains_ci("Visiting Lahore", "karachi"));
    }
}
