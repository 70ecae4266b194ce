// QuillPass Core Services
// Chunking, scoring, retrieval, rewriting and the request pipeline

pub mod text_processor;
pub mod chunker;
pub mod config_store;
pub mod providers;
pub mod retrieval;
pub mod scoring;
pub mod humanizer;
pub mod pipeline;

pub use text_processor::*;
pub use chunker::{chunk_text, parse_document, reassemble_chunks, ChunkBudget, ChunkUnit};
pub use config_store::*;
pub use providers::{
    get_api_key, HttpParaphraser, ParaphraseTransformer, Paraphraser, TransformError,
    PARAPHRASE_PROVIDER,
};
pub use retrieval::{CorpusRetriever, RetrievalError, StaticRetriever, WebCorpusRetriever};
pub use scoring::{detection_score, Scorer, ScoringError, SimilarityScorer};
pub use humanizer::{HumanizationEngine, RunOptions};
pub use pipeline::{AnalysisReport, Pipeline, ValidatedRequest, MIN_CONTENT_CHARS};
