use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::provider::{create_provider, extract_json, LlmProvider};
use super::QueryGenerator;
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::types::SearchPair;

/// Query generator backed by an LLM provider
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    pair_count: usize,
    base_prompt: Option<String>,
}

/// Reply shape requested from the model.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedResponse {
    Wrapped { pairs: Vec<GeneratedPair> },
    Bare(Vec<GeneratedPair>),
}

#[derive(Debug, Deserialize)]
struct GeneratedPair {
    #[serde(alias = "imageDescription")]
    description: String,
    #[serde(alias = "searchQuery", alias = "searchQuerry")]
    query: String,
}

impl LlmClient {
    /// Create a new LlmClient from configuration
    pub fn from_config(config: &LlmConfig) -> Self {
        let provider = create_provider(config);

        Self {
            provider: Arc::from(provider),
            pair_count: config.pair_count.max(1),
            base_prompt: config.base_prompt.clone(),
        }
    }

    /// Wrap an existing provider
    pub fn with_provider(provider: Arc<dyn LlmProvider>, pair_count: usize) -> Self {
        Self {
            provider,
            pair_count: pair_count.max(1),
            base_prompt: None,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }
}

impl QueryGenerator for LlmClient {
    fn generate(&self, context: &str, custom_prompt: Option<&str>) -> Result<Vec<SearchPair>> {
        let prompt = build_generation_prompt(
            context,
            custom_prompt,
            self.pair_count,
            self.base_prompt.as_deref(),
        );

        let raw = self
            .provider
            .generate_structured(&prompt, &pairs_schema())
            .map_err(|e| Error::Generation(format!("{}: {:#}", self.provider_name(), e)))?;

        let mut pairs = parse_search_pairs(&raw)?;
        pairs.truncate(self.pair_count);

        tracing::debug!(
            provider = self.provider_name(),
            count = pairs.len(),
            "generated search pairs"
        );
        Ok(pairs)
    }
}

/// JSON Schema for the generation reply
pub fn pairs_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "pairs": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "query": { "type": "string" }
                    },
                    "required": ["description", "query"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["pairs"],
        "additionalProperties": false
    })
}

/// Returns the default generation instructions.
fn base_generation_prompt() -> &'static str {
    "Read the context below and propose distinct photographs that would illustrate it. \
     For each photograph give:\n\
     - description: one or two sentences describing what the photograph shows, \
     written like a caption (subjects, setting, colours, composition)\n\
     - query: a short web image search query (2 to 6 words) likely to find such a photograph\n\
     Prefer concrete, visually searchable subjects over abstract ideas."
}

/// Builds the full prompt with optional style guidance and optional base prompt override
pub fn build_generation_prompt(
    context: &str,
    custom_prompt: Option<&str>,
    pair_count: usize,
    base_prompt: Option<&str>,
) -> String {
    let base = base_prompt.unwrap_or_else(|| base_generation_prompt());
    let mut prompt = format!(
        "{}\n\nReturn exactly {} items as JSON: {{\"pairs\": [{{\"description\": \"...\", \"query\": \"...\"}}]}}",
        base, pair_count
    );

    if let Some(style) = custom_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\n\nStyle guidance: {}", style));
    }

    prompt.push_str(&format!("\n\nContext: {}", context.trim()));
    prompt
}

/// Validate a generation reply and turn it into search pairs.
///
/// Blank pairs are dropped. An empty list is a valid answer, but a list
/// whose every pair is blank is an error.
pub fn parse_search_pairs(raw: &str) -> Result<Vec<SearchPair>> {
    let json = extract_json(raw);
    let response: GeneratedResponse = serde_json::from_str(&json)
        .map_err(|e| Error::Generation(format!("invalid structured response: {}", e)))?;

    let generated = match response {
        GeneratedResponse::Wrapped { pairs } => pairs,
        GeneratedResponse::Bare(pairs) => pairs,
    };
    let total = generated.len();

    let pairs: Vec<SearchPair> = generated
        .into_iter()
        .map(|p| SearchPair::new(p.description.trim(), p.query.trim()))
        .filter(|p| !p.description.is_empty() && !p.query.is_empty())
        .collect();

    if pairs.len() < total {
        tracing::warn!(dropped = total - pairs.len(), "discarded blank search pairs");
    }

    if pairs.is_empty() && total > 0 {
        return Err(Error::Generation("no usable search pairs in response".into()));
    }

    Ok(pairs)
}
