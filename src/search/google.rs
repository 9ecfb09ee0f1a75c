//! Google Custom Search JSON API, image mode.
//!
//! Needs an API key and a Programmable Search Engine id (`cx`) with image
//! search enabled. The API returns at most 10 items per request.

use serde::Deserialize;

use super::ImageSearchClient;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::http::{build_agent, describe_error, status_of};
use crate::types::ImageCandidate;

/// Largest `num` the Custom Search API accepts.
pub const MAX_RESULTS_PER_REQUEST: usize = 10;

pub struct GoogleImageSearch {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    engine_id: String,
    safe_search: bool,
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    #[serde(default)]
    link: String,
    title: Option<String>,
    mime: Option<String>,
    image: Option<CseImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseImage {
    context_link: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    byte_size: Option<u64>,
    thumbnail_link: Option<String>,
}

impl GoogleImageSearch {
    pub fn new(api_key: &str, engine_id: &str) -> Self {
        Self::from_parts(api_key, engine_id, &SearchConfig::default())
    }

    /// Build from config. Credentials must already be validated.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("GOOGLE_API_KEY is not set".into()))?;
        let engine_id = config
            .engine_id
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("GOOGLE_CX is not set".into()))?;

        Ok(Self::from_parts(api_key, engine_id, config))
    }

    fn from_parts(api_key: &str, engine_id: &str, config: &SearchConfig) -> Self {
        Self {
            agent: build_agent(config.timeout_secs, crate::USER_AGENT),
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            safe_search: config.safe_search,
        }
    }
}

impl ImageSearchClient for GoogleImageSearch {
    fn search(&self, query: &str, count: usize) -> Result<Vec<ImageCandidate>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let num = clamp_count(count);

        tracing::debug!(query, num, "image search request");

        let response = self
            .agent
            .get(&self.endpoint)
            .query("key", &self.api_key)
            .query("cx", &self.engine_id)
            .query("q", query)
            .query("searchType", "image")
            .query("num", &num.to_string())
            .query("safe", if self.safe_search { "active" } else { "off" })
            .call()
            .map_err(|e| {
                let status = status_of(&e);
                Error::search(query, status, describe_error(e))
            })?;

        let body = response
            .into_string()
            .map_err(|e| Error::search(query, None, format!("failed to read response: {e}")))?;

        let candidates = parse_response(&body, query, count)?;
        tracing::debug!(query, count = candidates.len(), "image search returned");
        Ok(candidates)
    }
}

/// Clamp a requested count into what one API request can return.
pub fn clamp_count(count: usize) -> usize {
    count.clamp(1, MAX_RESULTS_PER_REQUEST)
}

/// Parse a Custom Search response body into at most `count` candidates.
pub fn parse_response(body: &str, query: &str, count: usize) -> Result<Vec<ImageCandidate>> {
    let response: CseResponse = serde_json::from_str(body)
        .map_err(|e| Error::search(query, None, format!("invalid response: {e}")))?;

    Ok(response
        .items
        .into_iter()
        .filter(|item| !item.link.trim().is_empty())
        .take(count)
        .map(|item| {
            let image = item.image;
            ImageCandidate {
                url: item.link.trim().to_string(),
                source_query: query.to_string(),
                title: item.title,
                mime: item.mime,
                width: image.as_ref().and_then(|i| i.width),
                height: image.as_ref().and_then(|i| i.height),
                byte_size: image.as_ref().and_then(|i| i.byte_size),
                context_link: image.as_ref().and_then(|i| i.context_link.clone()),
                thumbnail_link: image.and_then(|i| i.thumbnail_link),
            }
        })
        .collect())
}
