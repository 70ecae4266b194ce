// Paraphrase Provider Service
// Rewriting capability used by the humanizer, plus the default text2text inference client

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::config_store::{ConfigStore, ParaphraseConfig};
use crate::models::StyleParams;

const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";
pub const PARAPHRASE_PROVIDER: &str = "paraphrase";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    Json(String),
    #[error("Transform timed out after {0}s")]
    Timeout(u64),
    #[error("Request deadline passed before the transform ran")]
    DeadlineExceeded,
    #[error("Paraphrase model unavailable")]
    Unavailable,
    #[error("Transform task panicked: {0}")]
    Panicked(String),
}

/// Rewrites one chunk of text under the given style parameters.
#[async_trait]
pub trait ParaphraseTransformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, chunk: &str, style: &StyleParams) -> Result<String, TransformError>;
}

/// Whether a rewriting model is present for this process.
#[derive(Clone)]
pub enum Paraphraser {
    Available(Arc<dyn ParaphraseTransformer>),
    Unavailable,
}

impl fmt::Debug for Paraphraser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(t) => write!(f, "Paraphraser::Available({})", t.name()),
            Self::Unavailable => write!(f, "Paraphraser::Unavailable"),
        }
    }
}

impl Paraphraser {
    pub fn available<T: ParaphraseTransformer + 'static>(transformer: T) -> Self {
        Self::Available(Arc::new(transformer))
    }

    /// Build the HTTP client when enabled and a key is configured; otherwise `Unavailable`.
    pub fn from_config(config: &ParaphraseConfig, store: Option<&ConfigStore>) -> Self {
        if !config.enabled {
            info!("[PARAPHRASE] Disabled by config, local humanizer only");
            return Self::Unavailable;
        }

        let Some(api_key) = get_api_key(PARAPHRASE_PROVIDER, store) else {
            info!("[PARAPHRASE] No API key configured, local humanizer only");
            return Self::Unavailable;
        };

        match HttpParaphraser::new(config, api_key) {
            Ok(client) => {
                info!(model = %config.model, "[PARAPHRASE] Paraphrase model available");
                Self::available(client)
            }
            Err(e) => {
                info!("[PARAPHRASE] Failed to build client ({}), local humanizer only", e);
                Self::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Available(t) => t.name(),
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerationParameters {
    temperature: f64,
    repetition_penalty: f64,
    do_sample: bool,
    top_p: f64,
    top_k: u32,
    max_length: u32,
}

impl From<&StyleParams> for GenerationParameters {
    fn from(style: &StyleParams) -> Self {
        Self {
            temperature: style.temperature,
            repetition_penalty: style.repetition_penalty,
            do_sample: style.do_sample,
            top_p: style.top_p,
            top_k: style.top_k,
            max_length: style.max_length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

/// Text2text inference endpoint client (Hugging Face compatible).
pub struct HttpParaphraser {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl HttpParaphraser {
    pub fn new(config: &ParaphraseConfig, api_key: String) -> Result<Self, TransformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let url = config
            .base_url
            .clone()
            .or_else(|| env::var("QUILLPASS_PARAPHRASE_URL").ok())
            .unwrap_or_else(|| format!("{}/{}", HF_INFERENCE_URL, config.model));

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ParaphraseTransformer for HttpParaphraser {
    fn name(&self) -> &str {
        &self.model
    }

    async fn transform(&self, chunk: &str, style: &StyleParams) -> Result<String, TransformError> {
        let request = GenerationRequest {
            inputs: chunk,
            parameters: GenerationParameters::from(style),
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransformError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| TransformError::Json(e.to_string()))?;

        let text = parse_generated_text(&data)?;
        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            input_chars = chunk.chars().count(),
            output_chars = text.chars().count(),
            "[PARAPHRASE] Chunk rewritten"
        );
        Ok(text)
    }
}

/// Accepts `[{"generated_text": ..}]`, `{"generated_text": ..}` and `{"error": ..}` bodies.
pub fn parse_generated_text(data: &Value) -> Result<String, TransformError> {
    let item = match data {
        Value::Array(items) => items.first().ok_or(TransformError::MissingContent)?,
        other => other,
    };

    if let Some(err) = item.get("error").and_then(Value::as_str) {
        return Err(TransformError::Api {
            status: 200,
            message: err.to_string(),
        });
    }

    let text = item
        .get("generated_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or(TransformError::MissingContent)?;

    if text.is_empty() {
        return Err(TransformError::MissingContent);
    }
    Ok(text.to_string())
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str, store: Option<&ConfigStore>) -> Option<String> {
    // Try environment variables first
    let env_keys: &[&str] = match provider {
        PARAPHRASE_PROVIDER => &["QUILLPASS_PARAPHRASE_API_KEY", "HF_API_TOKEN"],
        _ => &[],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    // Try config file
    let default_store;
    let store = match store {
        Some(s) => s,
        None => {
            default_store = ConfigStore::new(ConfigStore::default_config_dir()?);
            &default_store
        }
    };
    match store.get_api_key(provider) {
        Ok(Some(key)) if !key.trim().is_empty() => Some(key.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoundProfile;

    #[test]
    fn test_parse_generated_text_shapes() {
        let arr = serde_json::json!([{"generated_text": "  Rewritten chunk. "}]);
        assert_eq!(parse_generated_text(&arr).unwrap(), "Rewritten chunk.");

        let obj = serde_json::json!({"generated_text": "Another."});
        assert_eq!(parse_generated_text(&obj).unwrap(), "Another.");

        let err = serde_json::json!({"error": "Model is loading"});
        assert!(matches!(
            parse_generated_text(&err),
            Err(TransformError::Api { .. })
        ));

        let empty = serde_json::json!([]);
        assert!(matches!(
            parse_generated_text(&empty),
            Err(TransformError::MissingContent)
        ));
    }

    #[test]
    fn test_generation_parameters_are_snake_case() {
        let style = RoundProfile::Aggressive.style_params();
        let body = serde_json::to_value(GenerationRequest {
            inputs: "text",
            parameters: GenerationParameters::from(&style),
        })
        .unwrap();
        assert_eq!(body["parameters"]["repetition_penalty"], 1.5);
        assert_eq!(body["parameters"]["top_k"], 60);
        assert_eq!(body["inputs"], "text");
    }

    #[test]
    fn test_disabled_config_is_unavailable() {
        let config = ParaphraseConfig {
            enabled: false,
            ..ParaphraseConfig::default()
        };
        let p = Paraphraser::from_config(&config, None);
        assert!(!p.is_available());
        assert_eq!(p.name(), "unavailable");
    }

    #[test]
    fn test_http_paraphraser_default_url() {
        let config = ParaphraseConfig {
            base_url: Some("http://localhost:9000/generate".to_string()),
            ..ParaphraseConfig::default()
        };
        let client = HttpParaphraser::new(&config, "key".to_string()).unwrap();
        assert_eq!(client.url(), "http://localhost:9000/generate");
        assert_eq!(client.name(), "humarin/chatgpt_paraphraser_on_T5_base");
    }
}
