// Configuration Storage Service
// Handles config file read/write, version backup and provider API keys

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "quillpass";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub humanizer: HumanizerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub paraphrase: ParaphraseConfig,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            request_timeout_secs: default_request_timeout(),
            humanizer: HumanizerConfig::default(),
            scoring: ScoringConfig::default(),
            retrieval: RetrievalConfig::default(),
            paraphrase: ParaphraseConfig::default(),
            api_keys: HashMap::new(),
        }
    }
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_request_timeout() -> u64 { 300 }

/// Humanization loop constants. The defaults are the values the loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HumanizerConfig {
    pub max_rounds: u32,
    /// Minimum output/input length ratio for a round to be accepted.
    pub quality_gate_ratio: f64,
    /// Detection threshold (fraction of 100) used when the request does not carry one.
    pub default_threshold: f64,
    pub structural_min_chars: usize,
    pub rhythm_min_chars: usize,
    pub paragraph_chunk_chars: usize,
    pub temperature_jitter: f64,
    pub transform_timeout_secs: u64,
    pub transform_concurrency: usize,
    pub fallback_substitution_probability: f64,
    pub em_dash_probability: f64,
    pub parenthetical_probability: f64,
    pub rhetorical_question_probability: f64,
    pub typo_probability: f64,
    pub typo_edge_words: usize,
    pub seed: Option<u64>,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            quality_gate_ratio: 0.7,
            default_threshold: 0.40,
            structural_min_chars: 50,
            rhythm_min_chars: 100,
            paragraph_chunk_chars: 300,
            temperature_jitter: 0.1,
            transform_timeout_secs: 60,
            transform_concurrency: 4,
            fallback_substitution_probability: 0.4,
            em_dash_probability: 0.3,
            parenthetical_probability: 0.3,
            rhetorical_question_probability: 0.2,
            typo_probability: 0.3,
            typo_edge_words: 10,
            seed: None,
        }
    }
}

/// Similarity scoring weights, sampling caps and degenerate-case scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub min_source_chars: usize,
    pub min_sentence_chars: usize,
    pub candidate_sentence_cap: usize,
    pub source_sentence_cap: usize,
    pub sentence_match_ratio: f64,
    pub word_weight: f64,
    pub sentence_weight: f64,
    pub max_sim_weight: f64,
    pub top_avg_weight: f64,
    pub sentence_factor_weight: f64,
    pub max_word_sim_weight: f64,
    pub sentence_match_saturation: f64,
    pub top_k: usize,
    pub confidence_corpus_size: f64,
    pub real_match_threshold: f64,
    pub match_floor_score: i32,
    pub empty_candidate_score: i32,
    pub no_match_score: i32,
    pub error_score: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_source_chars: 100,
            min_sentence_chars: 20,
            candidate_sentence_cap: 10,
            source_sentence_cap: 20,
            sentence_match_ratio: 0.6,
            word_weight: 0.4,
            sentence_weight: 0.6,
            max_sim_weight: 50.0,
            top_avg_weight: 20.0,
            sentence_factor_weight: 100.0,
            max_word_sim_weight: 30.0,
            sentence_match_saturation: 5.0,
            top_k: 3,
            confidence_corpus_size: 5.0,
            real_match_threshold: 0.1,
            match_floor_score: 10,
            empty_candidate_score: 10,
            no_match_score: 5,
            error_score: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub max_workers: usize,
    pub fetch_timeout_secs: u64,
    /// Budget for the whole retrieval step, search included.
    pub retrieval_timeout_secs: u64,
    pub max_sources: usize,
    pub max_urls: usize,
    pub min_usable_sources: usize,
    /// Fetched pages with less extracted text than this are dropped.
    pub min_source_chars: usize,
    pub query_chars: usize,
    pub user_agent: String,
    /// Search results page; `{query}` is replaced with the url-encoded query.
    pub search_url_template: Option<String>,
    pub search_result_selector: String,
    pub reference_url_templates: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: 8,
            fetch_timeout_secs: 10,
            retrieval_timeout_secs: 60,
            max_sources: 15,
            max_urls: 24,
            min_usable_sources: 3,
            min_source_chars: 100,
            query_chars: 100,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36".to_string(),
            search_url_template: Some("https://html.duckduckgo.com/html/?q={query}".to_string()),
            search_result_selector: "a.result__a".to_string(),
            reference_url_templates: vec![
                "https://en.wikipedia.org/wiki/Special:Search?search={query}".to_string(),
                "https://www.britannica.com/search?query={query}".to_string(),
                "https://www.reuters.com/search/news?blob={query}".to_string(),
                "https://medium.com/search?q={query}".to_string(),
                "https://www.forbes.com/search/?q={query}".to_string(),
                "https://www.bbc.co.uk/search?q={query}".to_string(),
                "https://scholar.google.com/scholar?q={query}".to_string(),
                "https://www.sciencedirect.com/search?qs={query}".to_string(),
                "https://www.researchgate.net/search/publication?q={query}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParaphraseConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ParaphraseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            model: "humarin/chatgpt_paraphraser_on_T5_base".to_string(),
            timeout_secs: 80,
        }
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Use an explicit config file; backups go next to it.
    pub fn with_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)?;

        Ok(())
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete provider API key from config file
    pub fn delete_api_key(&self, provider: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}
