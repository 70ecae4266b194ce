use quillpass_lib::models::Document;
use quillpass_lib::services::retrieval::{build_query, synthetic_entries};
use quillpass_lib::services::scoring::{detection_breakdown, DetectionBreakdown};
use quillpass_lib::services::{parse_document, ChunkBudget, ScoringConfig, SimilarityScorer};
use serde::Serialize;

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage:\n  cargo run --bin inspect_text -- <path.txt|path.md> [--chars <n> | --tokens <n>] [--chunks <n>] [--verbose] [--out <json_path>]\n\nNotes:\n  - Chunk budget defaults to 300 characters.\n  - Originality is computed against the synthetic topic corpus only (no network)."
        );
        return Ok(());
    }

    let path = args[1].clone();
    let budget = match (
        parse_arg_value(&args, "--tokens").and_then(|s| s.parse().ok()),
        parse_arg_value(&args, "--chars").and_then(|s| s.parse().ok()),
    ) {
        (Some(tokens), _) => ChunkBudget::tokens(tokens),
        (None, Some(chars)) => ChunkBudget::chars(chars),
        (None, None) => ChunkBudget::chars(300),
    };
    let chunks_n: usize = parse_arg_value(&args, "--chunks")
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let verbose = has_flag(&args, "--verbose");
    let out_path = parse_arg_value(&args, "--out");

    let text = std::fs::read_to_string(&path).map_err(|e| format!("read file failed: {}", e))?;
    let doc = parse_document(&text, budget);

    println!("File: {}", path);
    println!("Text: {} chars ({} bytes)", text.chars().count(), text.len());
    println!("Title: {}", doc.title.as_deref().unwrap_or("(none)"));
    println!("Budget: {:?} {}", budget.unit, budget.limit);
    println!();

    println!("Paragraphs: {}", doc.paragraphs.len());
    for (i, p) in doc.paragraphs.iter().enumerate() {
        println!("[P{:03}] chars={}  {}", i, p.chars().count(), preview(p, 100));
    }
    println!();

    println!("Chunks: {}", doc.chunks.len());
    for c in doc.chunks.iter().take(chunks_n) {
        println!(
            "[C{:04}] bytes=[{},{}] size={} sentences={}  {}",
            c.index,
            c.start,
            c.end,
            budget.measure(&c.text),
            c.sentence_count,
            preview(&c.text, if verbose { 400 } else { 120 })
        );
    }
    if doc.chunks.len() > chunks_n {
        println!("... ({} more chunks)", doc.chunks.len() - chunks_n);
    }
    println!();

    let detection = detection_breakdown(&text);
    println!(
        "Detection: score={} (consistency={:.1}, vocabulary={:.1}, structure={:.1})",
        detection.score, detection.consistency, detection.vocabulary, detection.structure
    );

    let config = ScoringConfig::default();
    let corpus = synthetic_entries(&build_query(&text, 100));
    let similarity = SimilarityScorer::new(config)
        .try_score(&text, &corpus)
        .map_err(|e| e.to_string())?;
    println!(
        "Originality (synthetic corpus): score={} raw={} maxSim={:.2} sentenceMatches={}",
        similarity.score, similarity.raw_score, similarity.max_similarity, similarity.sentence_matches
    );

    if let Some(out_path) = out_path {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output<'a> {
            file: String,
            chars: usize,
            document: &'a Document,
            detection: DetectionBreakdown,
            originality_score: i32,
            sentence_matches: usize,
        }

        let out = Output {
            file: path.clone(),
            chars: text.chars().count(),
            document: &doc,
            detection,
            originality_score: similarity.score,
            sentence_matches: similarity.sentence_matches,
        };

        let json = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
        std::fs::write(&out_path, json).map_err(|e| format!("write out failed: {}", e))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
