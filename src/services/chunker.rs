// Chunker
// Groups sentences into budget-bounded chunks without ever splitting a sentence

use crate::models::{Chunk, Document};
use serde::{Deserialize, Serialize};

use super::text_processor::{
    char_len, estimate_tokens, extract_title, split_paragraphs, split_sentence_spans, SentenceSpan,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    Chars,
    Tokens,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkBudget {
    pub unit: ChunkUnit,
    pub limit: usize,
}

impl ChunkBudget {
    pub fn chars(limit: usize) -> Self {
        Self {
            unit: ChunkUnit::Chars,
            limit,
        }
    }

    pub fn tokens(limit: usize) -> Self {
        Self {
            unit: ChunkUnit::Tokens,
            limit,
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        match self.unit {
            ChunkUnit::Chars => char_len(text),
            ChunkUnit::Tokens => estimate_tokens(text),
        }
    }
}

/// Accumulate sentences while the running size stays within budget; on overflow flush and start
/// a new chunk with the overflowing sentence. A sentence larger than the budget becomes its own
/// oversized chunk.
pub fn chunk_text(text: &str, budget: ChunkBudget) -> Vec<Chunk> {
    let sentences = split_sentence_spans(text);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<SentenceSpan> = Vec::new();
    let mut current_size = 0usize;

    for span in sentences {
        let size = budget.measure(&text[span.start..span.end]);

        if !current.is_empty() && current_size + size > budget.limit {
            flush(text, &mut current, &mut chunks);
            current_size = 0;
        }

        current.push(span);
        current_size += size;
    }

    flush(text, &mut current, &mut chunks);
    chunks
}

fn flush(text: &str, current: &mut Vec<SentenceSpan>, chunks: &mut Vec<Chunk>) {
    let (Some(first), Some(last)) = (current.first(), current.last()) else {
        return;
    };
    let (start, end) = (first.start, last.end);
    chunks.push(Chunk {
        index: chunks.len(),
        start,
        end,
        text: text[start..end].to_string(),
        sentence_count: current.len(),
    });
    current.clear();
}

/// Concatenate chunks with the original separators between (and around) them.
pub fn reassemble_chunks(source: &str, chunks: &[Chunk]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for chunk in chunks {
        out.push_str(&source[cursor..chunk.start]);
        out.push_str(&chunk.text);
        cursor = chunk.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Parse raw text into title, paragraphs and chunks.
pub fn parse_document(text: &str, budget: ChunkBudget) -> Document {
    let (title, body) = extract_title(text);
    let paragraphs = split_paragraphs(&body);
    let mut chunks: Vec<Chunk> = Vec::new();
    for paragraph in &paragraphs {
        for mut chunk in chunk_text(paragraph, budget) {
            chunk.index = chunks.len();
            chunks.push(chunk);
        }
    }
    Document {
        raw: text.to_string(),
        title,
        paragraphs,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "The harbour opened at dawn. Fishermen unloaded crates of silver fish! \
Traders argued over prices until noon? Then the market slowly emptied as the heat rose.";

    #[test]
    fn test_chunks_reconstruct_input() {
        let chunks = chunk_text(TEXT, ChunkBudget::chars(60));
        assert!(chunks.len() > 1);
        assert_eq!(reassemble_chunks(TEXT, &chunks), TEXT);
    }

    #[test]
    fn test_boundaries_fall_between_sentences() {
        let chunks = chunk_text(TEXT, ChunkBudget::chars(60));
        for chunk in &chunks {
            let last = chunk.text.chars().last().unwrap();
            assert!(matches!(last, '.' | '!' | '?'), "chunk ends mid-sentence: {}", chunk.text);
        }
        let total: usize = chunks.iter().map(|c| c.sentence_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_oversized_sentence_is_its_own_chunk() {
        let long = format!("{}.", "word ".repeat(40).trim_end());
        let text = format!("Short one. {} Short two.", long);
        let chunks = chunk_text(&text, ChunkBudget::chars(50));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, long);
        assert_eq!(chunks[1].sentence_count, 1);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let a = chunk_text(TEXT, ChunkBudget::tokens(12));
        let b = chunk_text(TEXT, ChunkBudget::tokens(12));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", ChunkBudget::chars(10)).is_empty());
        assert!(chunk_text("   \n ", ChunkBudget::chars(10)).is_empty());
    }

    #[test]
    fn test_multiline_separators_survive() {
        let text = "First line ends here.\nSecond line follows.\n\tThird after a tab.";
        let chunks = chunk_text(text, ChunkBudget::chars(25));
        assert_eq!(chunks.len(), 3);
        assert_eq!(reassemble_chunks(text, &chunks), text);
    }

    #[test]
    fn test_parse_document() {
        let text = "# Market Day\n\nThe harbour opened at dawn. Boats came in.\n\n- bullet";
        let doc = parse_document(text, ChunkBudget::chars(300));
        assert_eq!(doc.title.as_deref(), Some("# Market Day"));
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.chunks.len(), 2);
        assert_eq!(doc.chunks[1].index, 1);
    }
}
