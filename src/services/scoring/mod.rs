// Scoring Module
// Originality against a corpus plus the statistical detection heuristic

pub mod detection;
pub mod similarity;

pub use detection::{detection_breakdown, detection_score, DetectionBreakdown};
pub use similarity::{SimilarityBreakdown, SimilarityScorer};

use crate::models::{ScoreReport, SourceEntry};
use crate::services::config_store::ScoringConfig;

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Non-finite similarity for source {0}")]
    NonFinite(String),

    #[error("Invalid scoring config: {0}")]
    InvalidConfig(String),
}

/// Both scores for one text.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    similarity: SimilarityScorer,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            similarity: SimilarityScorer::new(config),
        }
    }

    pub fn originality(&self, text: &str, corpus: &[SourceEntry]) -> i32 {
        self.similarity.score(text, corpus)
    }

    pub fn detection(&self, text: &str) -> i32 {
        detection_score(text)
    }

    pub fn score_report(&self, text: &str, corpus: &[SourceEntry]) -> ScoreReport {
        ScoreReport {
            originality_score: self.originality(text, corpus),
            detection_score: self.detection(text),
            confidence: self.similarity.confidence(corpus.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_report_ranges() {
        let scorer = Scorer::default();
        let report = scorer.score_report("A modest paragraph about harbour logistics and cargo.", &[]);
        assert_eq!(report.originality_score, 5);
        assert!((10..=100).contains(&report.detection_score));
        assert_eq!(report.confidence, 0.0);
    }
}
