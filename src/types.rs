//! Data carried through the search pipeline.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// One generated hypothesis: what to look for and how to search for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPair {
    /// Human-readable description of the depicted scene or subject.
    pub description: String,
    /// Terse query suitable for a web image search.
    pub query: String,
}

impl SearchPair {
    pub fn new(description: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            query: query.into(),
        }
    }
}

/// A raw image hit from the search backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCandidate {
    pub url: String,
    /// The `SearchPair::query` that produced this hit.
    pub source_query: String,
    pub title: Option<String>,
    pub mime: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub byte_size: Option<u64>,
    /// Page the image was found on.
    pub context_link: Option<String>,
    pub thumbnail_link: Option<String>,
}

impl ImageCandidate {
    pub fn new(url: impl Into<String>, source_query: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_query: source_query.into(),
            ..Default::default()
        }
    }
}

/// A decoded image ready for scoring. Never persisted.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub url: String,
    pub image: DynamicImage,
}

/// A candidate after scoring against its originating description.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub url: String,
    pub description: String,
    pub source_query: String,
    pub score: f32,
}

/// Final public result unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSearchResult {
    pub url: String,
    pub image_description: String,
    pub image_search_query: String,
    pub score: f32,
}

impl From<ScoredCandidate> for ImageSearchResult {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            url: c.url,
            image_description: c.description,
            image_search_query: c.source_query,
            score: c.score,
        }
    }
}
