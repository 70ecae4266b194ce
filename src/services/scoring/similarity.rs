// Similarity Scorer
// Word overlap plus sentence edit-similarity against a reference corpus, folded into 0-100

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::ScoringError;
use crate::models::SourceEntry;
use crate::services::config_store::ScoringConfig;

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]").expect("citation regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn short_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w{1,3}\b").expect("short word regex"))
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("word regex"))
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]").expect("sentence end regex"))
}

const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Lowercase, drop citation markers like `[12]`, collapse whitespace and remove words of
/// three characters or fewer.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_citations = citation_re().replace_all(&lowered, "");
    let collapsed = whitespace_re().replace_all(&no_citations, " ");
    let no_short = short_word_re().replace_all(&collapsed, "");
    whitespace_re().replace_all(&no_short, " ").trim().to_string()
}

/// Words longer than three characters that are not English stop-words.
pub fn significant_words(normalized: &str) -> HashSet<String> {
    let stops = stop_words();
    word_re()
        .find_iter(normalized)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 3 && !stops.contains(w.as_str()))
        .collect()
}

fn comparable_sentences(normalized: &str, min_chars: usize, cap: usize) -> Vec<&str> {
    sentence_end_re()
        .split(normalized)
        .map(str::trim)
        .filter(|s| s.chars().count() > min_chars)
        .take(cap)
        .collect()
}

/// Edit-similarity of two sentences, or 0 when their lengths alone rule out a match.
fn sentence_ratio(a: &str, b: &str, match_ratio: f64) -> f64 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    let (shorter, longer) = if la < lb { (la, lb) } else { (lb, la) };
    if longer == 0 || (shorter as f64 / longer as f64) <= match_ratio {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityBreakdown {
    pub score: i32,
    pub raw_score: i32,
    pub max_similarity: f64,
    pub top_average: f64,
    pub max_word_similarity: f64,
    pub sentence_matches: usize,
    pub matched_sources: usize,
    pub confidence: f64,
}

impl SimilarityBreakdown {
    fn fixed(score: i32, confidence: f64) -> Self {
        Self {
            score,
            raw_score: score,
            max_similarity: 0.0,
            top_average: 0.0,
            max_word_similarity: 0.0,
            sentence_matches: 0,
            matched_sources: 0,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    config: ScoringConfig,
}

impl SimilarityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Corpus-size confidence in [0, 1].
    pub fn confidence(&self, corpus_len: usize) -> f64 {
        if self.config.confidence_corpus_size <= 0.0 {
            return 1.0;
        }
        (corpus_len as f64 / self.config.confidence_corpus_size).min(1.0)
    }

    /// Originality score in [0, 100]. Never fails: internal errors degrade to the configured
    /// error score.
    pub fn score(&self, candidate: &str, corpus: &[SourceEntry]) -> i32 {
        match self.try_score(candidate, corpus) {
            Ok(breakdown) => breakdown.score,
            Err(e) => {
                warn!("[SCORING] Similarity scoring failed, using default score: {}", e);
                self.config.error_score
            }
        }
    }

    pub fn try_score(
        &self,
        candidate: &str,
        corpus: &[SourceEntry],
    ) -> Result<SimilarityBreakdown, ScoringError> {
        let cfg = &self.config;
        if cfg.top_k == 0 {
            return Err(ScoringError::InvalidConfig("topK must be at least 1".to_string()));
        }
        let confidence = self.confidence(corpus.len());

        let candidate_norm = normalize_text(candidate);
        let candidate_words = significant_words(&candidate_norm);
        if candidate_words.is_empty() {
            return Ok(SimilarityBreakdown::fixed(cfg.empty_candidate_score, confidence));
        }
        let candidate_sentences = comparable_sentences(
            &candidate_norm,
            cfg.min_sentence_chars,
            cfg.candidate_sentence_cap,
        );

        let mut similarities: Vec<f64> = Vec::new();
        let mut sentence_matches = 0usize;
        let mut max_word_sim = 0.0f64;

        for source in corpus {
            if !source.is_usable(cfg.min_source_chars) {
                continue;
            }

            let source_norm = normalize_text(&source.content);
            let source_words = significant_words(&source_norm);
            if source_words.is_empty() {
                continue;
            }

            let common = candidate_words.intersection(&source_words).count();
            let word_sim = common as f64 / candidate_words.len() as f64;
            max_word_sim = max_word_sim.max(word_sim);

            let source_sentences =
                comparable_sentences(&source_norm, cfg.min_sentence_chars, cfg.source_sentence_cap);

            let mut sent_sim = 0.0f64;
            for c in &candidate_sentences {
                for s in &source_sentences {
                    let ratio = sentence_ratio(c, s, cfg.sentence_match_ratio);
                    if ratio > cfg.sentence_match_ratio {
                        sentence_matches += 1;
                        sent_sim = sent_sim.max(ratio);
                    }
                }
            }

            let combined = word_sim * cfg.word_weight + sent_sim * cfg.sentence_weight;
            if !combined.is_finite() {
                return Err(ScoringError::NonFinite(source.origin.clone()));
            }
            if combined > 0.0 {
                debug!(
                    domain = %source.domain,
                    word = word_sim,
                    sentence = sent_sim,
                    "[SCORING] Source overlap"
                );
                similarities.push(combined);
            }
        }

        if similarities.is_empty() {
            return Ok(SimilarityBreakdown::fixed(cfg.no_match_score, confidence));
        }

        similarities.sort_by(|a, b| b.total_cmp(a));
        let max_sim = similarities[0];
        let k = cfg.top_k.min(similarities.len());
        let top_avg = similarities.iter().take(k).sum::<f64>() / k as f64;
        let sent_factor = if cfg.sentence_match_saturation > 0.0 {
            (sentence_matches as f64 / cfg.sentence_match_saturation).min(1.0)
        } else {
            1.0
        };

        let real_match = max_sim > cfg.real_match_threshold || max_word_sim > cfg.real_match_threshold;

        let mut raw = (max_sim * cfg.max_sim_weight
            + top_avg * cfg.top_avg_weight
            + sent_factor * cfg.sentence_factor_weight
            + max_word_sim * cfg.max_word_sim_weight)
            .round();
        if !raw.is_finite() {
            return Err(ScoringError::NonFinite("aggregate".to_string()));
        }
        if real_match {
            raw = raw.max(cfg.match_floor_score as f64);
        }

        let mut score = (raw * confidence).round().clamp(0.0, 100.0) as i32;
        if real_match {
            score = score.max(cfg.match_floor_score);
        }

        debug!(
            score,
            raw,
            max_sim,
            sentence_matches,
            "[SCORING] Similarity calculation"
        );

        Ok(SimilarityBreakdown {
            score,
            raw_score: raw as i32,
            max_similarity: max_sim,
            top_average: top_avg,
            max_word_similarity: max_word_sim,
            sentence_matches,
            matched_sources: similarities.len(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "Karachi is the largest city in Pakistan and its main seaport. \
The harbour handles most of the national cargo traffic every single year. \
Rapid migration has transformed the metropolitan population over several decades. \
Textile factories and financial institutions anchor the regional economy today. \
Municipal planners continue struggling with water distribution and public transport.";

    fn entry(content: &str) -> SourceEntry {
        SourceEntry::new("https://example.org/a", "example.org", content)
    }

    #[test]
    fn test_normalize_text() {
        let norm = normalize_text("The  Quick [12] brown FOX jumped\nover it");
        assert_eq!(norm, "quick brown jumped over");
    }

    #[test]
    fn test_significant_words_skip_stop_words() {
        let words = significant_words("about their harbour through cargo");
        assert!(words.contains("harbour"));
        assert!(words.contains("cargo"));
        assert!(!words.contains("about"));
        assert!(!words.contains("their"));
    }

    #[test]
    fn test_empty_corpus_scores_five() {
        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.score(ARTICLE, &[]), 5);
    }

    #[test]
    fn test_empty_candidate_scores_ten() {
        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.score("a an it is of", &[entry(ARTICLE)]), 10);
    }

    #[test]
    fn test_identical_source_with_full_corpus_scores_high() {
        let scorer = SimilarityScorer::default();
        let filler = "Mountain glaciers retreat steadily whenever summer temperatures climb beyond \
seasonal averages recorded historically across alpine observatories.";
        let corpus = vec![entry(ARTICLE), entry(filler), entry(filler), entry(filler)];
        let breakdown = scorer.try_score(ARTICLE, &corpus).unwrap();
        assert!(breakdown.score >= 80, "score was {}", breakdown.score);
        assert!((breakdown.max_word_similarity - 1.0).abs() < 1e-9);
        assert!(breakdown.sentence_matches >= 5);
    }

    #[test]
    fn test_floor_applies_on_word_overlap() {
        let scorer = SimilarityScorer::default();
        let source = "Karachi harbour cargo statistics were published alongside unrelated \
commentary regarding cricket tournaments and weather forecasts nationwide.";
        let score = scorer.score(ARTICLE, &[entry(source)]);
        assert!(score >= 10);
        assert!(score <= 100);
    }

    #[test]
    fn test_short_sources_are_skipped() {
        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.score(ARTICLE, &[entry("Karachi harbour cargo.")]), 5);
    }

    #[test]
    fn test_invalid_config_degrades_to_error_score() {
        let config = ScoringConfig {
            top_k: 0,
            ..ScoringConfig::default()
        };
        let scorer = SimilarityScorer::new(config);
        assert_eq!(scorer.score(ARTICLE, &[entry(ARTICLE)]), 20);
    }
}
