use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{build_agent, describe_error};

/// Trait for LLM backends that can answer with schema-constrained JSON
pub trait LlmProvider: Send + Sync {
    /// Send one generation request and return the raw JSON text of the reply.
    ///
    /// `schema` is a JSON Schema the reply must follow. Providers that support
    /// constrained decoding pass it to the backend; the others put it in the prompt.
    fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String>;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

const SYSTEM_PROMPT: &str =
    "You are a photo research assistant. Always answer with a single JSON object and nothing else.";

/// Name under which the schema is registered with OpenAI-style backends
const SCHEMA_NAME: &str = "image_search_pairs";

// ============================================================================
// OpenAI-compatible provider (works with LM Studio, OpenAI, and compatible APIs)
// ============================================================================

pub struct OpenAICompatibleProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: OpenAIJsonSchema,
}

#[derive(Debug, Serialize)]
struct OpenAIJsonSchema {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn build_request(&self, prompt: &str, schema: &Value) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            response_format: OpenAIResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: OpenAIJsonSchema {
                    name: SCHEMA_NAME.to_string(),
                    strict: true,
                    schema: schema.clone(),
                },
            },
        }
    }
}

impl LlmProvider for OpenAICompatibleProvider {
    fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String> {
        let request = self.build_request(prompt, schema);
        let url = format!("{}/chat/completions", self.endpoint);

        let agent = build_agent(self.timeout_secs, crate::USER_AGENT);
        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("LLM request failed: {}", describe_error(e)))?;

        let chat_response: OpenAIChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse LLM response: {}", e))?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("No response from LLM"))?;

        if let Some(refusal) = message.refusal {
            return Err(anyhow!("LLM refused the request: {}", refusal));
        }

        message
            .content
            .ok_or_else(|| anyhow!("LLM response had no content"))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

/// Extract JSON from a string that might contain markdown code blocks
pub(crate) fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    // Check for markdown code block
    if trimmed.starts_with("```") {
        // Find the end of the code block
        if let Some(start) = trimmed.find('\n') {
            let after_first_line = &trimmed[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    // Prose around a bare object: take the outermost braces
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

// ============================================================================
// Anthropic Claude provider
// ============================================================================

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or("claude-sonnet-4-20250514").to_string(),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Messages API has no schema-constrained mode, so the schema rides in the prompt
fn prompt_with_schema(prompt: &str, schema: &Value) -> String {
    format!(
        "{}\n\nThe JSON must match this JSON Schema:\n{}\n\nReturn ONLY the JSON, no other text.",
        prompt, schema
    )
}

impl LlmProvider for AnthropicProvider {
    fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature: self.temperature,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContent::Text {
                    text: prompt_with_schema(prompt, schema),
                }],
            }],
        };

        let agent = build_agent(self.timeout_secs, crate::USER_AGENT);

        let response = agent
            .post("https://api.anthropic.com/v1/messages")
            .set("Content-Type", "application/json")
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", "2023-06-01")
            .send_json(&request)
            .map_err(|e| anyhow!("Anthropic request failed: {}", describe_error(e)))?;

        let anthropic_response: AnthropicResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse Anthropic response: {}", e))?;

        let content = anthropic_response
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| anyhow!("No response from Anthropic"))?;

        Ok(extract_json(&content))
    }

    fn provider_name(&self) -> &'static str {
        "Anthropic Claude"
    }
}

// ============================================================================
// Ollama provider
// ============================================================================

pub struct OllamaProvider {
    endpoint: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    system: String,
    prompt: String,
    format: Value,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(endpoint: Option<&str>, model: &str) -> Self {
        Self {
            endpoint: endpoint
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            temperature: 0.7,
            timeout_secs: 180,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl LlmProvider for OllamaProvider {
    fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            format: schema.clone(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let url = format!("{}/api/generate", self.endpoint);

        let agent = build_agent(self.timeout_secs, crate::USER_AGENT);

        let response = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| anyhow!("Ollama request failed: {}", describe_error(e)))?;

        let ollama_response: OllamaResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse Ollama response: {}", e))?;

        Ok(extract_json(&ollama_response.response))
    }

    fn provider_name(&self) -> &'static str {
        "Ollama"
    }
}

// ============================================================================
// Factory function
// ============================================================================

use crate::config::{LlmConfig, LlmProviderType};

/// Create an LLM provider based on configuration
pub fn create_provider(config: &LlmConfig) -> Box<dyn LlmProvider> {
    match config.provider {
        LlmProviderType::LmStudio => Box::new(
            OpenAICompatibleProvider::new(
                &config.endpoint,
                &config.model,
                config.api_key.as_deref(),
            )
            .with_temperature(config.temperature)
            .with_timeout(config.timeout_secs),
        ),
        LlmProviderType::OpenAI => Box::new(
            OpenAICompatibleProvider::new(
                "https://api.openai.com/v1",
                &config.model,
                config.api_key.as_deref(),
            )
            .with_temperature(config.temperature)
            .with_timeout(config.timeout_secs),
        ),
        LlmProviderType::Anthropic => {
            let api_key = config.api_key.as_deref().unwrap_or("");
            Box::new(
                AnthropicProvider::new(api_key, Some(&config.model))
                    .with_temperature(config.temperature)
                    .with_timeout(config.timeout_secs),
            )
        }
        LlmProviderType::Ollama => Box::new(
            OllamaProvider::new(Some(&config.endpoint), &config.model)
                .with_temperature(config.temperature)
                .with_timeout(config.timeout_secs),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_strips_code_fence() {
        let content = "```json\n{\"pairs\": []}\n```";
        assert_eq!(extract_json(content), "{\"pairs\": []}");
    }

    #[test]
    fn extract_json_strips_surrounding_prose() {
        let content = "Sure! Here you go: {\"pairs\": []} Hope that helps.";
        assert_eq!(extract_json(content), "{\"pairs\": []}");
    }

    #[test]
    fn extract_json_passes_plain_json() {
        assert_eq!(extract_json("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn openai_request_carries_strict_schema() {
        let provider = OpenAICompatibleProvider::new("http://localhost:1234/v1/", "m", None)
            .with_temperature(0.2);
        let schema = json!({"type": "object"});
        let request = provider.build_request("find cats", &schema);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(provider.endpoint, "http://localhost:1234/v1");
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["strict"], true);
        assert_eq!(value["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(value["messages"][1]["content"], "find cats");
        assert!((value["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn anthropic_prompt_embeds_schema() {
        let text = prompt_with_schema("find cats", &json!({"required": ["pairs"]}));
        assert!(text.starts_with("find cats"));
        assert!(text.contains("\"required\":[\"pairs\"]"));
    }

    #[test]
    fn factory_picks_provider() {
        let mut config = LlmConfig::default();
        assert_eq!(create_provider(&config).provider_name(), "OpenAI-compatible");

        config.provider = LlmProviderType::Ollama;
        assert_eq!(create_provider(&config).provider_name(), "Ollama");

        config.provider = LlmProviderType::Anthropic;
        assert_eq!(create_provider(&config).provider_name(), "Anthropic Claude");
    }
}
