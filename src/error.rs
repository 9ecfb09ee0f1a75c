//! Error types for the context search pipeline.
//!
//! `Config`, `Model` and `Generation` errors are fatal to a whole call.
//! `Search`, `Load` and `Score` errors are scoped to one sub-query or one
//! candidate; the orchestrator logs and drops them.

/// Errors that can occur while building or running a context search.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration, detected before any network call.
    #[error("config error: {0}")]
    Config(String),

    /// CLIP model files could not be downloaded or loaded.
    #[error("model error: {0}")]
    Model(String),

    /// The generation backend failed or returned an invalid structure.
    #[error("generation error: {0}")]
    Generation(String),

    /// A single image search request failed.
    #[error("search error for {query:?}{}: {message}", status_suffix(.status))]
    Search {
        query: String,
        status: Option<u16>,
        message: String,
    },

    /// An image could not be fetched or decoded.
    #[error("load error for {url}: {message}")]
    Load { url: String, message: String },

    /// An image or description could not be embedded and compared.
    #[error("score error for {url}: {message}")]
    Score { url: String, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    pub fn search(query: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Search {
            query: query.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn load(url: &str, message: impl Into<String>) -> Self {
        Self::Load {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn score(url: &str, message: impl Into<String>) -> Self {
        Self::Score {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole call rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Model(_) | Self::Generation(_))
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
