// Analysis Pipeline
// Validate, retrieve corpus, score baseline, humanize, rescore, assemble the response

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::config_store::{AppConfig, ConfigStore};
use super::humanizer::{HumanizationEngine, RunOptions};
use super::providers::Paraphraser;
use super::retrieval::{build_query, ensure_minimum_corpus, CorpusRetriever, StaticRetriever, WebCorpusRetriever};
use super::scoring::Scorer;
use crate::error::PipelineError;
use crate::models::{AnalyzeRequest, AnalyzeResponse, AnalyzeSuccess, HumanizeOutcome, ScoreReport, SourceEntry};
use crate::services::text_processor::char_len;

const RETRIEVAL_GRACE: Duration = Duration::from_secs(2);

pub const MIN_CONTENT_CHARS: usize = 50;

/// Request after validation: trimmed content, cleaned keywords, resolved threshold.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub content: String,
    pub keywords: Vec<String>,
    pub threshold: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub request_id: String,
    pub original: ScoreReport,
    pub humanized: ScoreReport,
    pub sources_checked: usize,
    pub outcome: HumanizeOutcome,
    pub elapsed_ms: u128,
}

impl AnalysisReport {
    pub fn to_success(&self) -> AnalyzeSuccess {
        AnalyzeSuccess {
            humanized_content: self.outcome.text.clone(),
            ai_detection_original: self.original.detection_score,
            ai_detection_humanized: self.humanized.detection_score,
            original_score: self.original.originality_score,
            humanized_score: self.humanized.originality_score,
            sources_checked: self.sources_checked as i32,
            status: "success".to_string(),
        }
    }
}

pub struct Pipeline {
    config: AppConfig,
    retriever: Arc<dyn CorpusRetriever>,
    engine: HumanizationEngine,
    scorer: Scorer,
}

impl Pipeline {
    pub fn new(config: AppConfig, retriever: Arc<dyn CorpusRetriever>, paraphraser: Paraphraser) -> Self {
        let engine = HumanizationEngine::new(config.humanizer.clone(), paraphraser);
        let scorer = Scorer::new(config.scoring.clone());
        Self {
            config,
            retriever,
            engine,
            scorer,
        }
    }

    /// Network-backed retriever and paraphraser as configured.
    pub fn from_config(config: AppConfig, store: Option<&ConfigStore>) -> Result<Self, PipelineError> {
        let retriever: Arc<dyn CorpusRetriever> = if config.retrieval.enabled {
            let web = WebCorpusRetriever::new(config.retrieval.clone())
                .map_err(|e| PipelineError::Internal(format!("Failed to build retriever: {}", e)))?;
            Arc::new(web)
        } else {
            Arc::new(StaticRetriever::empty())
        };
        let paraphraser = Paraphraser::from_config(&config.paraphrase, store);
        Ok(Self::new(config, retriever, paraphraser))
    }

    /// No network: empty corpus (synthetic entries only) and the local humanizer.
    pub fn offline(config: AppConfig) -> Self {
        Self::new(config, Arc::new(StaticRetriever::empty()), Paraphraser::Unavailable)
    }

    pub fn validate(&self, request: &AnalyzeRequest) -> Result<ValidatedRequest, PipelineError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(PipelineError::InputValidation("Missing content".to_string()));
        }
        if char_len(content) < MIN_CONTENT_CHARS {
            return Err(PipelineError::InputValidation(format!(
                "Content must be at least {} characters",
                MIN_CONTENT_CHARS
            )));
        }

        let threshold = request.threshold.unwrap_or(self.config.humanizer.default_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InputValidation(
                "Threshold must be between 0 and 1".to_string(),
            ));
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in request.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            if !keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                keywords.push(keyword.to_string());
            }
        }

        Ok(ValidatedRequest {
            content: content.to_string(),
            keywords,
            threshold,
            seed: request.seed,
        })
    }

    /// Fetch the reference corpus, topping it up with synthetic entries when it is thin.
    /// Never fails; retrieval problems leave only the synthetic entries.
    ///
    /// The web retriever stops itself at `retrieval_timeout_secs` and keeps what it gathered;
    /// the outer timeout only catches retrievers that ignore the budget.
    pub async fn build_corpus(&self, content: &str) -> Vec<SourceEntry> {
        let cfg = &self.config.retrieval;
        let query = build_query(content, cfg.query_chars);
        let budget = Duration::from_secs(cfg.retrieval_timeout_secs) + RETRIEVAL_GRACE;

        let retrieved = match tokio::time::timeout(budget, self.retriever.retrieve(&query)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!("[PIPELINE] Retrieval via {} failed: {}", self.retriever.name(), e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "[PIPELINE] Retrieval via {} timed out after {}s",
                    self.retriever.name(),
                    cfg.retrieval_timeout_secs
                );
                Vec::new()
            }
        };

        ensure_minimum_corpus(
            retrieved,
            &query,
            cfg.min_usable_sources,
            self.config.scoring.min_source_chars,
        )
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisReport, PipelineError> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.request_timeout_secs);
        let request_id = uuid::Uuid::new_v4().to_string();

        let validated = self.validate(&request)?;
        info!(
            "[PIPELINE] Request {} accepted: chars={}, keywords={}, threshold={:.2}",
            request_id,
            char_len(&validated.content),
            validated.keywords.len(),
            validated.threshold
        );

        let corpus = self.build_corpus(&validated.content).await;
        let original = self.scorer.score_report(&validated.content, &corpus);
        info!(
            "[PIPELINE] Request {} baseline: originality={}, detection={}, sources={}",
            request_id,
            original.originality_score,
            original.detection_score,
            corpus.len()
        );

        let options = RunOptions {
            threshold: validated.threshold,
            seed: validated.seed,
            deadline: Some(deadline),
        };
        let outcome = self
            .engine
            .run(&validated.content, &validated.keywords, &options)
            .await;

        let humanized = self.scorer.score_report(&outcome.text, &corpus);
        let elapsed_ms = started.elapsed().as_millis();
        info!(
            "[PIPELINE] Request {} done: originality {} -> {}, detection {} -> {}, accepted_rounds={}, termination={:?}, elapsed_ms={}",
            request_id,
            original.originality_score,
            humanized.originality_score,
            original.detection_score,
            humanized.detection_score,
            outcome.accepted_rounds(),
            outcome.termination,
            elapsed_ms
        );

        Ok(AnalysisReport {
            request_id,
            original,
            humanized,
            sources_checked: corpus.len(),
            outcome,
            elapsed_ms,
        })
    }

    /// Outermost boundary: runs the request on its own task so a panic becomes an internal-error
    /// response instead of taking the process down.
    pub async fn handle(self: Arc<Self>, request: AnalyzeRequest) -> AnalyzeResponse {
        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.analyze(request).await });

        match task.await {
            Ok(Ok(report)) => AnalyzeResponse::Success(report.to_success()),
            Ok(Err(PipelineError::InputValidation(msg))) => {
                info!("[PIPELINE] Rejected request: {}", msg);
                AnalyzeResponse::validation_error(msg)
            }
            Ok(Err(e)) => {
                error!("[PIPELINE] Request failed: {}", e);
                AnalyzeResponse::internal_error(format!("Server error: {}", e))
            }
            Err(e) => {
                error!("[PIPELINE] Request task aborted: {}", e);
                AnalyzeResponse::internal_error(format!("Server error: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::offline(AppConfig::default())
    }

    fn request(content: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            content: content.to_string(),
            ..AnalyzeRequest::default()
        }
    }

    #[test]
    fn test_validate_length_boundary() {
        let p = pipeline();
        let fifty = "a".repeat(50);
        assert!(p.validate(&request(&fifty)).is_ok());

        let err = p.validate(&request(&"a".repeat(49))).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("50"));

        let padded = format!("   {}   ", "a".repeat(49));
        assert!(p.validate(&request(&padded)).unwrap_err().is_validation());
        assert_eq!(p.validate(&request("   ")).unwrap_err().to_string(), "Missing content");
    }

    #[test]
    fn test_validate_threshold_and_keywords() {
        let p = pipeline();
        let mut req = request(&"word ".repeat(20));
        req.threshold = Some(1.5);
        assert!(p.validate(&req).unwrap_err().is_validation());

        req.threshold = None;
        req.keywords = vec![" Karachi ".to_string(), "karachi".to_string(), "".to_string(), "Port".to_string()];
        let v = p.validate(&req).unwrap();
        assert_eq!(v.keywords, vec!["Karachi", "Port"]);
        assert!((v.threshold - 0.40).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_offline_corpus_is_synthetic() {
        let corpus = pipeline().build_corpus("Karachi harbour cargo\nstatistics").await;
        assert_eq!(corpus.len(), 3);
        assert!(corpus.iter().all(|e| e.origin.starts_with("synthetic://")));
    }

    #[tokio::test]
    async fn test_handle_maps_validation_error() {
        let p = Arc::new(pipeline());
        let response = p.handle(request("too short")).await;
        assert!(matches!(response, AnalyzeResponse::ValidationError { .. }));
    }
}
