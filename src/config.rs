use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub clip: ClipConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    #[default]
    LmStudio,
    OpenAI,
    Anthropic,
    Ollama,
}

impl LlmProviderType {
    /// Hosted providers refuse requests without a key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderType,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// How many (description, query) pairs to ask for per context.
    #[serde(default = "default_pair_count")]
    pub pair_count: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Replaces the built-in generation instructions.
    #[serde(default)]
    pub base_prompt: Option<String>,
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_llm_model() -> String {
    "gemma-3-4b".to_string()
}

fn default_pair_count() -> usize {
    3
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderType::default(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
            pair_count: default_pair_count(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            base_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Google Custom Search API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Google Programmable Search Engine id (`cx`).
    #[serde(default)]
    pub engine_id: Option<String>,

    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_safe_search")]
    pub safe_search: bool,
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

fn default_results_per_query() -> usize {
    10
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_safe_search() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            endpoint: default_search_endpoint(),
            results_per_query: default_results_per_query(),
            timeout_secs: default_search_timeout_secs(),
            safe_search: default_safe_search(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Payloads larger than this are rejected before decoding.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_loader_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_loader_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("contextsearch/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            timeout_secs: default_loader_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_visual_model_url")]
    pub visual_model_url: String,

    #[serde(default = "default_text_model_url")]
    pub text_model_url: String,

    #[serde(default = "default_tokenizer_url")]
    pub tokenizer_url: String,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Feed `attention_mask` to the text encoder. Turn off for exports that
    /// only take `input_ids`.
    #[serde(default = "default_text_attention_mask")]
    pub text_attention_mask: bool,
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("contextsearch")
        .join("models")
}

// Qdrant's ONNX exports of CLIP ViT-B/32
fn default_visual_model_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx".to_string()
}

fn default_text_model_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/model.onnx".to_string()
}

fn default_tokenizer_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/tokenizer.json".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_text_attention_mask() -> bool {
    true
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            visual_model_url: default_visual_model_url(),
            text_model_url: default_text_model_url(),
            tokenizer_url: default_tokenizer_url(),
            intra_threads: default_intra_threads(),
            text_attention_mask: default_text_attention_mask(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker threads shared by search, fetch and scoring.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Overall budget for one search after generation returns.
    #[serde(default = "default_pipeline_timeout_secs")]
    pub timeout_secs: u64,

    /// Scored candidates below this are dropped before ranking.
    #[serde(default)]
    pub min_score: Option<f32>,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_pipeline_timeout_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_pipeline_timeout_secs(),
            min_score: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("contextsearch")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Apply credentials from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply credential overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(cx) = get("GOOGLE_CX") {
            self.search.engine_id = Some(cx);
        }

        let provider_key = match self.llm.provider {
            LlmProviderType::OpenAI => get("OPENAI_API_KEY"),
            LlmProviderType::Anthropic => get("ANTHROPIC_API_KEY"),
            _ => None,
        };
        if let Some(key) = get("CONTEXTSEARCH_LLM_API_KEY").or(provider_key) {
            self.llm.api_key = Some(key);
        }
    }

    /// Check everything a search needs before touching the network.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if is_blank(self.search.api_key.as_deref()) {
            return Err(Error::Config("GOOGLE_API_KEY is not set".into()));
        }
        if is_blank(self.search.engine_id.as_deref()) {
            return Err(Error::Config("GOOGLE_CX is not set".into()));
        }
        if self.llm.provider.requires_api_key() && is_blank(self.llm.api_key.as_deref()) {
            return Err(Error::Config(format!(
                "llm provider {:?} requires an api_key",
                self.llm.provider
            )));
        }
        if self.llm.pair_count == 0 {
            return Err(Error::Config("llm.pair_count must be greater than 0".into()));
        }
        if self.search.results_per_query == 0 {
            return Err(Error::Config(
                "search.results_per_query must be greater than 0".into(),
            ));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.max_concurrency must be greater than 0".into(),
            ));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(Error::Config(
                "pipeline.timeout_secs must be greater than 0".into(),
            ));
        }
        for (name, secs) in [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("search.timeout_secs", self.search.timeout_secs),
            ("loader.timeout_secs", self.loader.timeout_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.loader.max_bytes == 0 || self.loader.max_bytes == u64::MAX {
            return Err(Error::Config(
                "loader.max_bytes must be between 1 and u64::MAX - 1".into(),
            ));
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_credentials() -> Config {
        let mut config = Config::default();
        config.search.api_key = Some("key".into());
        config.search.engine_id = Some("cx".into());
        config
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, LlmProviderType::LmStudio);
        assert_eq!(config.llm.pair_count, 3);
        assert_eq!(config.search.results_per_query, 10);
        assert_eq!(config.loader.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pipeline.max_concurrency, 8);
        assert!(config.pipeline.min_score.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            provider = "ollama"
            model = "llama3.2"

            [search]
            api_key = "abc"
            engine_id = "123"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.provider, LlmProviderType::Ollama);
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.llm.endpoint, default_llm_endpoint());
        assert_eq!(config.search.api_key.as_deref(), Some("abc"));
        assert_eq!(config.pipeline.timeout_secs, 60);
    }

    #[test]
    fn missing_google_key_is_config_error() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn missing_cx_is_config_error() {
        let mut config = with_credentials();
        config.search.engine_id = Some("  ".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_CX"));
    }

    #[test]
    fn hosted_provider_requires_key() {
        let mut config = with_credentials();
        config.llm.provider = LlmProviderType::Anthropic;
        assert!(config.validate().is_err());

        config.llm.api_key = Some("sk-ant".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = with_credentials();
        config.pipeline.max_concurrency = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_concurrency"));
    }

    #[test]
    fn zero_http_timeouts_rejected() {
        let cases: [fn(&mut Config); 3] = [
            |c| c.llm.timeout_secs = 0,
            |c| c.search.timeout_secs = 0,
            |c| c.loader.timeout_secs = 0,
        ];
        let names = ["llm.timeout_secs", "search.timeout_secs", "loader.timeout_secs"];

        for (zero, name) in cases.iter().zip(names) {
            let mut config = with_credentials();
            zero(&mut config);
            let err = config.validate().unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            assert!(err.to_string().contains(name), "{err}");
        }
    }

    #[test]
    fn max_bytes_bounds_rejected() {
        let mut config = with_credentials();
        config.loader.max_bytes = 0;
        assert!(config.validate().is_err());

        config.loader.max_bytes = u64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("max_bytes"));

        config.loader.max_bytes = u64::MAX - 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn huge_pipeline_timeout_accepted() {
        let mut config = with_credentials();
        config.pipeline.timeout_secs = u64::MAX;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_set_credentials() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_CX", "g-cx"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.llm.provider = LlmProviderType::OpenAI;
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.search.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.search.engine_id.as_deref(), Some("g-cx"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn generic_llm_key_wins_and_empty_values_ignored() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY", ""),
            ("CONTEXTSEARCH_LLM_API_KEY", "generic"),
            ("ANTHROPIC_API_KEY", "specific"),
        ]
        .into_iter()
        .collect();

        let mut config = with_credentials();
        config.llm.provider = LlmProviderType::Anthropic;
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.search.api_key.as_deref(), Some("key"));
        assert_eq!(config.llm.api_key.as_deref(), Some("generic"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = with_credentials();
        config.pipeline.min_score = Some(0.2);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.search.engine_id.as_deref(), Some("cx"));
        assert_eq!(loaded.pipeline.min_score, Some(0.2));
    }
}
