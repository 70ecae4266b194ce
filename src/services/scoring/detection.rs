// Detection Heuristic
// Structural statistics that tend to separate generated prose from human writing

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::services::text_processor::split_paragraphs;

const CONSISTENCY_WEIGHT: f64 = 0.4;
const VOCABULARY_WEIGHT: f64 = 0.3;
const STRUCTURE_WEIGHT: f64 = 0.3;
const NEUTRAL_COMPONENT: f64 = 50.0;
const COMPLEX_WORD_CHARS: usize = 8;
const VOCABULARY_SCALE: f64 = 300.0;
const MIN_SCORE: i32 = 10;
const MAX_SCORE: i32 = 100;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("word regex"))
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]").expect("sentence end regex"))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBreakdown {
    /// High when paragraphs are uniformly sized.
    pub consistency: f64,
    /// Share of long words, scaled.
    pub vocabulary: f64,
    /// High when sentence lengths barely vary.
    pub structure: f64,
    pub score: i32,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation over mean. Callers guarantee at least two values and a positive mean.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt() / m
}

pub fn detection_breakdown(text: &str) -> DetectionBreakdown {
    let paragraph_lengths: Vec<f64> = split_paragraphs(text)
        .iter()
        .map(|p| p.chars().count() as f64)
        .collect();
    let consistency = if paragraph_lengths.len() > 3 {
        (100.0 - coefficient_of_variation(&paragraph_lengths) * 100.0).clamp(0.0, 100.0)
    } else {
        NEUTRAL_COMPONENT
    };

    let complex_words = word_re()
        .find_iter(text)
        .filter(|m| m.as_str().chars().count() > COMPLEX_WORD_CHARS)
        .count();
    let total_words = text.split_whitespace().count().max(1);
    let vocabulary = (complex_words as f64 / total_words as f64 * VOCABULARY_SCALE).min(100.0);

    let sentence_lengths: Vec<f64> = sentence_end_re()
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    let structure = if sentence_lengths.len() > 3 {
        (NEUTRAL_COMPONENT - coefficient_of_variation(&sentence_lengths) * 100.0).clamp(0.0, 100.0)
    } else {
        NEUTRAL_COMPONENT
    };

    let weighted = consistency * CONSISTENCY_WEIGHT
        + vocabulary * VOCABULARY_WEIGHT
        + structure * STRUCTURE_WEIGHT;
    let score = if weighted.is_finite() {
        (weighted.round() as i32).clamp(MIN_SCORE, MAX_SCORE)
    } else {
        MIN_SCORE
    };

    DetectionBreakdown {
        consistency,
        vocabulary,
        structure,
        score,
    }
}

/// Machine-likeness estimate in [10, 100]. Never fails.
pub fn detection_score(text: &str) -> i32 {
    detection_breakdown(text).score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_uses_neutral_components() {
        let b = detection_breakdown("Hello world.");
        assert_eq!(b.consistency, 50.0);
        assert_eq!(b.vocabulary, 0.0);
        assert_eq!(b.structure, 50.0);
        assert_eq!(b.score, 35);
    }

    #[test]
    fn test_score_is_bounded() {
        assert_eq!(detection_score(""), 35);
        let dense = "Internationalization considerations notwithstanding, \
institutionalized bureaucracies systematically overcomplicate administration.";
        let score = detection_score(dense);
        assert!((10..=100).contains(&score));
    }

    #[test]
    fn test_uniform_paragraphs_score_higher_than_varied() {
        let uniform = (0..5)
            .map(|_| "The committee reviewed the annual budget. It approved every line item. \
Members then adjourned for lunch. Nobody raised objections.")
            .collect::<Vec<_>>()
            .join("\n\n");
        let varied = "Short.\n\nThe committee reviewed the annual budget in painstaking detail, \
arguing over every single line item until late in the evening when everyone was exhausted.\n\n\
Lunch?\n\nNobody objected, though several members grumbled quietly about the catering.\n\n\
Done. Finally. We left.";
        assert!(detection_score(&uniform) > detection_score(&varied));
    }
}
