//! Turns a free-text context into (description, search query) pairs.

pub mod client;
pub mod provider;

pub use client::LlmClient;
pub use provider::{create_provider, LlmProvider};

use crate::error::Result;
use crate::types::SearchPair;

/// Produces search hypotheses for a context.
pub trait QueryGenerator: Send + Sync {
    /// Issue one structured-generation request for `context`.
    ///
    /// Returns pairs in the model's own order, every one with a non-empty
    /// description and query, or [`Error::Generation`](crate::Error::Generation).
    fn generate(&self, context: &str, custom_prompt: Option<&str>) -> Result<Vec<SearchPair>>;
}
