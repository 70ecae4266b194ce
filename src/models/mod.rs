// QuillPass Data Models
// Request/response shapes and the shared domain types passed between services

use serde::{Deserialize, Serialize};

// ============ Analyze Request ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Detection threshold as a fraction in [0, 1]; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Seed for quirk/typo/fallback randomness; falls back to the configured seed, then entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

// ============ Analyze Response ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeSuccess {
    pub humanized_content: String,
    pub ai_detection_original: i32,
    pub ai_detection_humanized: i32,
    pub original_score: i32,
    pub humanized_score: i32,
    pub sources_checked: i32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Success(AnalyzeSuccess),
    ValidationError { error: String, status: String },
    InternalError { status: String, message: String },
}

impl AnalyzeResponse {
    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError {
            error: error.into(),
            status: "error".to_string(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// ============ Corpus ============

/// A reference document the candidate text is compared against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    /// URL or other identifier of where the content came from.
    pub origin: String,
    pub domain: String,
    pub content: String,
}

impl SourceEntry {
    pub fn new(origin: impl Into<String>, domain: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            domain: domain.into(),
            content: content.into(),
        }
    }

    pub fn is_usable(&self, min_chars: usize) -> bool {
        self.content.chars().count() >= min_chars
    }
}

// ============ Scores ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    /// Overlap with the corpus, 0..=100.
    pub originality_score: i32,
    /// Machine-likeness estimate, 10..=100.
    pub detection_score: i32,
    /// Corpus-size confidence, 0..=1.
    pub confidence: f64,
}

// ============ Document & Chunks ============

/// A sentence-bounded slice of a source text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: usize,
    /// UTF-8 byte offset into the chunked text.
    pub start: usize,
    /// UTF-8 byte offset (end-exclusive).
    pub end: usize,
    pub text: String,
    pub sentence_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub raw: String,
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    pub chunks: Vec<Chunk>,
}

// ============ Paraphrase Style ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleParams {
    pub temperature: f64,
    pub repetition_penalty: f64,
    pub do_sample: bool,
    pub top_p: f64,
    pub top_k: u32,
    pub max_length: u32,
}

impl StyleParams {
    /// Alternate the temperature around the profile value so neighbouring chunks differ.
    pub fn perturbed(&self, chunk_index: usize, jitter: f64) -> Self {
        let delta = if chunk_index % 2 == 0 { -jitter } else { jitter };
        Self {
            temperature: (self.temperature + delta).max(0.01),
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundProfile {
    Conservative,
    Aggressive,
}

impl RoundProfile {
    pub fn for_round(round: u32) -> Self {
        if round <= 1 {
            Self::Conservative
        } else {
            Self::Aggressive
        }
    }

    pub fn style_params(&self) -> StyleParams {
        match self {
            Self::Conservative => StyleParams {
                temperature: 0.85,
                repetition_penalty: 1.4,
                do_sample: true,
                top_p: 0.92,
                top_k: 50,
                max_length: 512,
            },
            Self::Aggressive => StyleParams {
                temperature: 0.92,
                repetition_penalty: 1.5,
                do_sample: true,
                top_p: 0.95,
                top_k: 60,
                max_length: 512,
            },
        }
    }

    pub fn is_aggressive(&self) -> bool {
        matches!(self, Self::Aggressive)
    }
}

// ============ Humanization ============

/// Per-request engine state. Lives only for the duration of one `run`.
#[derive(Debug, Clone)]
pub struct HumanizationState {
    pub iteration: u32,
    pub current_text: String,
    pub keywords: Vec<String>,
    pub round_profile: RoundProfile,
}

impl HumanizationState {
    pub fn new(text: &str, keywords: &[String]) -> Self {
        Self {
            iteration: 0,
            current_text: text.to_string(),
            keywords: keywords.to_vec(),
            round_profile: RoundProfile::Conservative,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Detection score reached the caller's threshold.
    ThresholdMet,
    /// Round cap reached.
    IterationCap,
    /// A round shrank the text below the quality gate; the prior text was kept.
    QualityGateFailed,
    /// The request deadline passed before another round could start.
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
    pub round: u32,
    pub profile: RoundProfile,
    pub input_chars: usize,
    pub output_chars: usize,
    pub detection_score: Option<i32>,
    pub accepted: bool,
    pub transformed_chunks: usize,
    pub fallback_chunks: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeOutcome {
    pub text: String,
    pub baseline_detection: i32,
    pub final_detection: i32,
    pub rounds: Vec<RoundReport>,
    pub termination: Termination,
}

impl HumanizeOutcome {
    pub fn accepted_rounds(&self) -> usize {
        self.rounds.iter().filter(|r| r.accepted).count()
    }
}
