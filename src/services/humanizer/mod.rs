// Humanization Engine
// Bounded rewrite rounds: transform chunks, reassemble, quality-gate, rescore, stop or repeat

pub mod fallback;
pub mod quirks;

pub use fallback::{apply_contractions, fallback_humanize};
pub use quirks::{add_quirks, introduce_typos, reinsert_keywords, vary_rhythm};

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::chunker::{chunk_text, reassemble_chunks, ChunkBudget};
use super::config_store::HumanizerConfig;
use super::providers::{Paraphraser, TransformError};
use super::scoring::detection_score;
use super::text_processor::{char_len, extract_title, is_structural, split_paragraphs};
use crate::models::{
    Chunk, HumanizationState, HumanizeOutcome, RoundProfile, RoundReport, StyleParams, Termination,
};
use quirks::chance;

/// Per-request knobs for one engine run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop once `detection_score / 100` is at or below this value.
    pub threshold: f64,
    pub seed: Option<u64>,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    BaselineScore,
    Transform,
    Reassemble,
    QualityGate,
    Rescore,
    Done(Termination),
    Abort,
}

enum ParagraphPlan {
    Verbatim(String),
    Rewrite {
        original: String,
        source: String,
        chunks: Vec<Chunk>,
    },
}

struct TransformJob {
    text: String,
    style: StyleParams,
}

/// Output of the transform stage, before reassembly.
struct RoundDraft {
    title: Option<String>,
    paragraphs: Vec<String>,
    structural: Vec<bool>,
    transformed_chunks: usize,
    fallback_chunks: usize,
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

/// Join title and paragraphs, returning the byte ranges that must stay untouched.
fn assemble(draft: &RoundDraft) -> (String, Vec<(usize, usize)>) {
    let mut out = String::new();
    let mut protected = Vec::new();

    if let Some(title) = &draft.title {
        out.push_str(title);
        protected.push((0, out.len()));
    }
    for (paragraph, &structural) in draft.paragraphs.iter().zip(&draft.structural) {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        let start = out.len();
        out.push_str(paragraph);
        if structural {
            protected.push((start, out.len()));
        }
    }
    (out, protected)
}

pub struct HumanizationEngine {
    config: HumanizerConfig,
    paraphraser: Paraphraser,
}

impl HumanizationEngine {
    pub fn new(config: HumanizerConfig, paraphraser: Paraphraser) -> Self {
        Self { config, paraphraser }
    }

    fn meets_threshold(score: i32, threshold: f64) -> bool {
        (score as f64 / 100.0) <= threshold
    }

    fn next_round(&self, state: &HumanizationState, deadline: Option<Instant>) -> Stage {
        if state.iteration >= self.config.max_rounds {
            Stage::Done(Termination::IterationCap)
        } else if deadline_passed(deadline) {
            Stage::Done(Termination::DeadlineExceeded)
        } else {
            Stage::Transform
        }
    }

    /// Run rewrite rounds until the threshold is met, the round cap is hit, the quality gate
    /// rejects a round, or the deadline passes. Always returns the last accepted text.
    pub async fn run(&self, text: &str, keywords: &[String], options: &RunOptions) -> HumanizeOutcome {
        let mut rng = match options.seed.or(self.config.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut state = HumanizationState::new(text, keywords);
        let mut current_score = 0;
        let mut baseline = 0;
        let mut rounds: Vec<RoundReport> = Vec::new();

        let mut draft: Option<RoundDraft> = None;
        let mut candidate = String::new();
        let mut round_started = Instant::now();
        let mut stage = Stage::Init;

        let termination = loop {
            stage = match stage {
                Stage::Init => Stage::BaselineScore,

                Stage::BaselineScore => {
                    baseline = detection_score(&state.current_text);
                    current_score = baseline;
                    info!(
                        "[HUMANIZER] Baseline detection={} threshold={:.2} paraphraser={}",
                        baseline,
                        options.threshold,
                        self.paraphraser.name()
                    );
                    if Self::meets_threshold(current_score, options.threshold) {
                        Stage::Done(Termination::ThresholdMet)
                    } else {
                        self.next_round(&state, options.deadline)
                    }
                }

                Stage::Transform => {
                    state.iteration += 1;
                    state.round_profile = RoundProfile::for_round(state.iteration);
                    round_started = Instant::now();
                    draft = Some(
                        self.transform_round(&state, options.deadline, &mut rng)
                            .await,
                    );
                    Stage::Reassemble
                }

                Stage::Reassemble => {
                    let Some(d) = draft.as_ref() else {
                        break Termination::QualityGateFailed;
                    };
                    let (assembled, protected) = assemble(d);
                    candidate = assembled;

                    if state.round_profile.is_aggressive()
                        && chance(&mut rng, self.config.typo_probability)
                    {
                        candidate = introduce_typos(
                            &candidate,
                            &state.keywords,
                            self.config.typo_edge_words,
                            &protected,
                            &mut rng,
                        );
                    }
                    candidate = reinsert_keywords(text, &candidate, &state.keywords);
                    Stage::QualityGate
                }

                Stage::QualityGate => {
                    let input_chars = char_len(&state.current_text);
                    let output_chars = char_len(&candidate);
                    if output_chars as f64 >= input_chars as f64 * self.config.quality_gate_ratio {
                        Stage::Rescore
                    } else {
                        warn!(
                            "[HUMANIZER] Round {} rejected by quality gate: {} -> {} chars",
                            state.iteration, input_chars, output_chars
                        );
                        rounds.push(self.round_report(&state, draft.as_ref(), input_chars, output_chars, None, round_started));
                        Stage::Abort
                    }
                }

                Stage::Rescore => {
                    let score = detection_score(&candidate);
                    let input_chars = char_len(&state.current_text);
                    let output_chars = char_len(&candidate);
                    rounds.push(self.round_report(&state, draft.as_ref(), input_chars, output_chars, Some(score), round_started));
                    info!(
                        "[HUMANIZER] Round {} accepted: detection {} -> {}, chars {} -> {}",
                        state.iteration, current_score, score, input_chars, output_chars
                    );

                    state.current_text = std::mem::take(&mut candidate);
                    current_score = score;

                    if Self::meets_threshold(current_score, options.threshold) {
                        Stage::Done(Termination::ThresholdMet)
                    } else {
                        self.next_round(&state, options.deadline)
                    }
                }

                Stage::Done(reason) => break reason,

                Stage::Abort => break Termination::QualityGateFailed,
            };
        };

        info!(
            "[HUMANIZER] Finished: termination={:?}, rounds={}, detection {} -> {}",
            termination,
            rounds.len(),
            baseline,
            current_score
        );

        HumanizeOutcome {
            text: state.current_text,
            baseline_detection: baseline,
            final_detection: current_score,
            rounds,
            termination,
        }
    }

    fn round_report(
        &self,
        state: &HumanizationState,
        draft: Option<&RoundDraft>,
        input_chars: usize,
        output_chars: usize,
        detection_score: Option<i32>,
        started: Instant,
    ) -> RoundReport {
        RoundReport {
            round: state.iteration,
            profile: state.round_profile,
            input_chars,
            output_chars,
            detection_score,
            accepted: detection_score.is_some(),
            transformed_chunks: draft.map_or(0, |d| d.transformed_chunks),
            fallback_chunks: draft.map_or(0, |d| d.fallback_chunks),
            elapsed_ms: started.elapsed().as_millis(),
        }
    }

    fn plan_paragraph(&self, index: usize, paragraph: &str, profile: RoundProfile) -> ParagraphPlan {
        if is_structural(paragraph, self.config.structural_min_chars) {
            return ParagraphPlan::Verbatim(paragraph.to_string());
        }

        let source = if index % 3 == 0 && char_len(paragraph) > self.config.rhythm_min_chars {
            vary_rhythm(paragraph, profile)
        } else {
            paragraph.to_string()
        };

        let chunks = if char_len(&source) > self.config.paragraph_chunk_chars {
            chunk_text(&source, ChunkBudget::chars(self.config.paragraph_chunk_chars))
        } else {
            vec![Chunk {
                index: 0,
                start: 0,
                end: source.len(),
                text: source.clone(),
                sentence_count: 1,
            }]
        };

        ParagraphPlan::Rewrite {
            original: paragraph.to_string(),
            source,
            chunks,
        }
    }

    async fn transform_round(
        &self,
        state: &HumanizationState,
        deadline: Option<Instant>,
        rng: &mut StdRng,
    ) -> RoundDraft {
        let profile = state.round_profile;
        let base_style = profile.style_params();
        let (title, body) = extract_title(&state.current_text);

        let plans: Vec<ParagraphPlan> = split_paragraphs(&body)
            .iter()
            .enumerate()
            .map(|(i, p)| self.plan_paragraph(i, p, profile))
            .collect();

        let mut jobs: Vec<TransformJob> = Vec::new();
        for plan in &plans {
            if let ParagraphPlan::Rewrite { chunks, .. } = plan {
                for chunk in chunks {
                    jobs.push(TransformJob {
                        text: chunk.text.clone(),
                        style: base_style.perturbed(chunk.index, self.config.temperature_jitter),
                    });
                }
            }
        }

        debug!(
            "[HUMANIZER] Round {} ({:?}): paragraphs={}, chunks={}",
            state.iteration,
            profile,
            plans.len(),
            jobs.len()
        );

        let mut results = self.transform_chunks(jobs, deadline).await.into_iter();

        let mut paragraphs = Vec::with_capacity(plans.len());
        let mut structural = Vec::with_capacity(plans.len());
        let mut transformed_chunks = 0usize;
        let mut fallback_chunks = 0usize;

        for (i, plan) in plans.into_iter().enumerate() {
            let (original, source, chunks) = match plan {
                ParagraphPlan::Verbatim(text) => {
                    paragraphs.push(text);
                    structural.push(true);
                    continue;
                }
                ParagraphPlan::Rewrite {
                    original,
                    source,
                    chunks,
                } => (original, source, chunks),
            };

            let mut rewritten_chunks = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let result = results
                    .next()
                    .unwrap_or(Err(TransformError::MissingContent));
                let text = match result {
                    Ok(text) => {
                        transformed_chunks += 1;
                        if profile.is_aggressive() {
                            apply_contractions(&text)
                        } else {
                            text
                        }
                    }
                    Err(e) => {
                        if !matches!(e, TransformError::Unavailable) {
                            warn!("[HUMANIZER] Transform failed, using local humanizer: {}", e);
                        }
                        fallback_chunks += 1;
                        fallback_humanize(
                            &chunk.text,
                            profile,
                            self.config.fallback_substitution_probability,
                            rng,
                        )
                    }
                };
                rewritten_chunks.push(Chunk { text, ..chunk });
            }

            let mut paragraph = reassemble_chunks(&source, &rewritten_chunks);
            paragraph = reinsert_keywords(&original, &paragraph, &state.keywords);

            let quirk_stride = if profile.is_aggressive() { 3 } else { 4 };
            if i % quirk_stride == 0 {
                paragraph = add_quirks(&paragraph, &self.config, rng);
            }

            paragraphs.push(paragraph);
            structural.push(false);
        }

        RoundDraft {
            title,
            paragraphs,
            structural,
            transformed_chunks,
            fallback_chunks,
        }
    }

    /// Run every chunk transform of a round on a bounded pool. Results come back in job order;
    /// failed, timed-out or panicked jobs yield an error for the caller to fall back on.
    async fn transform_chunks(
        &self,
        jobs: Vec<TransformJob>,
        deadline: Option<Instant>,
    ) -> Vec<Result<String, TransformError>> {
        let transformer = match &self.paraphraser {
            Paraphraser::Available(t) => t.clone(),
            Paraphraser::Unavailable => {
                return jobs.iter().map(|_| Err(TransformError::Unavailable)).collect();
            }
        };

        let mut results: Vec<Result<String, TransformError>> = jobs
            .iter()
            .map(|_| Err(TransformError::Panicked("task did not complete".to_string())))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.transform_concurrency.max(1)));
        let mut join_set: JoinSet<(usize, Result<String, TransformError>)> = JoinSet::new();
        let timeout_secs = self.config.transform_timeout_secs;

        for (idx, job) in jobs.into_iter().enumerate() {
            let transformer = transformer.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (idx, Err(TransformError::DeadlineExceeded));
                };

                let mut limit = Duration::from_secs(timeout_secs);
                if let Some(d) = deadline {
                    let remaining = d.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return (idx, Err(TransformError::DeadlineExceeded));
                    }
                    limit = limit.min(remaining);
                }

                let result = match tokio::time::timeout(limit, transformer.transform(&job.text, &job.style)).await {
                    Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
                    Ok(Ok(_)) => Err(TransformError::MissingContent),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(TransformError::Timeout(limit.as_secs())),
                };
                (idx, result)
            });
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, result)) => results[idx] = result,
                Err(e) => warn!("[HUMANIZER] Transform task failed: {}", e),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::ParaphraseTransformer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ARTICLE: &str = "# Karachi Today\n\n\
Karachi is the largest city in Pakistan and its busiest commercial centre. The port handles \
most of the country's sea trade. Millions of people arrive every decade looking for work.\n\n\
- Population: more than twenty million residents\n\n\
The city's economy rests on textiles, finance and shipping. Informal markets employ a large \
share of workers. Planners struggle with water supply, housing and public transport, which \
shapes daily life in every neighbourhood across the metropolitan area.\n\n\
Culture in Karachi mixes languages from every province. Food streets stay open late into the \
night. Cricket matches fill parks on weekends, and beaches draw families when the heat breaks.";

    struct FailingTransformer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ParaphraseTransformer for FailingTransformer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn transform(&self, _chunk: &str, _style: &StyleParams) -> Result<String, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransformError::Api {
                status: 503,
                message: "model loading".to_string(),
            })
        }
    }

    struct ShrinkingTransformer;

    #[async_trait]
    impl ParaphraseTransformer for ShrinkingTransformer {
        fn name(&self) -> &str {
            "shrinking"
        }

        async fn transform(&self, _chunk: &str, _style: &StyleParams) -> Result<String, TransformError> {
            Ok("Short.".to_string())
        }
    }

    struct EchoTransformer;

    #[async_trait]
    impl ParaphraseTransformer for EchoTransformer {
        fn name(&self) -> &str {
            "echo"
        }

        async fn transform(&self, chunk: &str, _style: &StyleParams) -> Result<String, TransformError> {
            Ok(format!("{} It is clear.", chunk))
        }
    }

    /// Uppercases chunks; the chunk starting with "Alpha" finishes last.
    struct SlowFirstTransformer;

    #[async_trait]
    impl ParaphraseTransformer for SlowFirstTransformer {
        fn name(&self) -> &str {
            "slow-first"
        }

        async fn transform(&self, chunk: &str, _style: &StyleParams) -> Result<String, TransformError> {
            let delay = if chunk.starts_with("Alpha") { 300 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(chunk.to_uppercase())
        }
    }

    struct PanickingTransformer;

    #[async_trait]
    impl ParaphraseTransformer for PanickingTransformer {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn transform(&self, _chunk: &str, _style: &StyleParams) -> Result<String, TransformError> {
            panic!("model crashed");
        }
    }

    fn keywords() -> Vec<String> {
        vec!["Karachi".to_string()]
    }

    fn options(threshold: f64) -> RunOptions {
        RunOptions {
            threshold,
            seed: Some(42),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_unavailable_paraphraser_runs_all_rounds_locally() {
        let engine = HumanizationEngine::new(HumanizerConfig::default(), Paraphraser::Unavailable);
        let outcome = engine.run(ARTICLE, &keywords(), &options(0.0)).await;

        assert_eq!(outcome.termination, Termination::IterationCap);
        assert_eq!(outcome.rounds.len(), 3);
        assert_eq!(outcome.accepted_rounds(), 3);
        assert!(outcome.text.contains("Karachi"));
        assert!(outcome.text.starts_with("# Karachi Today"));
        assert!(outcome.text.contains("- Population: more than twenty million residents"));
        for round in &outcome.rounds {
            assert!(round.accepted);
            assert_eq!(round.transformed_chunks, 0);
            assert!(round.fallback_chunks > 0);
            assert!(round.output_chars as f64 >= round.input_chars as f64 * 0.7);
        }
    }

    #[tokio::test]
    async fn test_failing_transformer_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = HumanizationEngine::new(
            HumanizerConfig::default(),
            Paraphraser::available(FailingTransformer { calls: calls.clone() }),
        );
        let outcome = engine.run(ARTICLE, &keywords(), &options(0.0)).await;

        assert!(calls.load(Ordering::SeqCst) > 0);
        assert!(outcome.rounds.len() <= 3);
        assert!(outcome.rounds.iter().all(|r| r.transformed_chunks == 0));
        assert!(outcome.text.contains("Karachi"));
    }

    #[tokio::test]
    async fn test_threshold_already_met_skips_rounds() {
        let engine = HumanizationEngine::new(HumanizerConfig::default(), Paraphraser::Unavailable);
        let outcome = engine.run(ARTICLE, &keywords(), &options(1.0)).await;

        assert_eq!(outcome.termination, Termination::ThresholdMet);
        assert!(outcome.rounds.is_empty());
        assert_eq!(outcome.text, ARTICLE);
        assert_eq!(outcome.baseline_detection, outcome.final_detection);
    }

    #[tokio::test]
    async fn test_quality_gate_keeps_previous_text() {
        let engine = HumanizationEngine::new(
            HumanizerConfig::default(),
            Paraphraser::available(ShrinkingTransformer),
        );
        let outcome = engine.run(ARTICLE, &[], &options(0.0)).await;

        assert_eq!(outcome.termination, Termination::QualityGateFailed);
        assert_eq!(outcome.text, ARTICLE);
        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(outcome.accepted_rounds(), 0);
        assert!(!outcome.rounds[0].accepted);
        assert!(outcome.rounds[0].detection_score.is_none());
    }

    #[tokio::test]
    async fn test_passed_deadline_stops_before_first_round() {
        let engine = HumanizationEngine::new(HumanizerConfig::default(), Paraphraser::Unavailable);
        let opts = RunOptions {
            threshold: 0.0,
            seed: Some(1),
            deadline: Some(Instant::now()),
        };
        let outcome = engine.run(ARTICLE, &keywords(), &opts).await;

        assert_eq!(outcome.termination, Termination::DeadlineExceeded);
        assert!(outcome.rounds.is_empty());
        assert_eq!(outcome.text, ARTICLE);
    }

    #[tokio::test]
    async fn test_same_seed_same_output() {
        let engine = HumanizationEngine::new(HumanizerConfig::default(), Paraphraser::Unavailable);
        let a = engine.run(ARTICLE, &keywords(), &options(0.0)).await;
        let b = engine.run(ARTICLE, &keywords(), &options(0.0)).await;
        assert_eq!(a.text, b.text);
    }

    #[tokio::test]
    async fn test_successful_transform_gets_contractions_in_later_rounds() {
        let config = HumanizerConfig {
            max_rounds: 2,
            ..HumanizerConfig::default()
        };
        let engine = HumanizationEngine::new(config, Paraphraser::available(EchoTransformer));
        let outcome = engine.run(ARTICLE, &keywords(), &options(0.0)).await;

        assert_eq!(outcome.rounds.len(), 2);
        assert!(outcome.rounds.iter().all(|r| r.fallback_chunks == 0));
        assert!(outcome.text.contains("It's clear."));
    }

    #[tokio::test]
    async fn test_panicking_transformer_is_contained() {
        let config = HumanizerConfig {
            max_rounds: 1,
            ..HumanizerConfig::default()
        };
        let engine = HumanizationEngine::new(config, Paraphraser::available(PanickingTransformer));
        let outcome = engine.run(ARTICLE, &keywords(), &options(0.0)).await;

        assert_eq!(outcome.rounds.len(), 1);
        assert!(outcome.rounds[0].fallback_chunks > 0);
        assert!(outcome.text.contains("Karachi"));
    }

    #[tokio::test]
    async fn test_out_of_order_transforms_keep_chunk_and_paragraph_order() {
        let text = "Alpha leads the convoy out of the harbour. Bravo follows close behind the leader. \
Charlie keeps watch from the rear.\n\n\
Delta waits at the dock for the others. Echo signals the all clear at dawn.";
        let config = HumanizerConfig {
            max_rounds: 1,
            paragraph_chunk_chars: 45,
            rhythm_min_chars: usize::MAX,
            em_dash_probability: 0.0,
            parenthetical_probability: 0.0,
            rhetorical_question_probability: 0.0,
            ..HumanizerConfig::default()
        };
        let engine = HumanizationEngine::new(config, Paraphraser::available(SlowFirstTransformer));
        let outcome = engine.run(text, &[], &options(0.0)).await;

        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(outcome.rounds[0].transformed_chunks, 5);
        assert_eq!(outcome.rounds[0].fallback_chunks, 0);
        assert_eq!(outcome.text, text.to_uppercase());
    }
}
