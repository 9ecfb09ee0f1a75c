//! Web image search backends.
//!
//! Each backend implements [`ImageSearchClient`]. Failures are per query:
//! the orchestrator treats an error as "no candidates from this query".

pub mod google;

pub use google::GoogleImageSearch;

use crate::error::Result;
use crate::types::ImageCandidate;

/// A web image search backend.
///
/// All implementations must be `Send + Sync` for concurrent sub-queries.
pub trait ImageSearchClient: Send + Sync {
    /// Search for images matching `query`.
    ///
    /// Returns at most `count` candidates in the backend's relevance order,
    /// each tagged with `query` as its source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Search`](crate::Error::Search) if the request fails or
    /// the response cannot be parsed.
    fn search(&self, query: &str, count: usize) -> Result<Vec<ImageCandidate>>;
}
