//! Find web images that match a free-text context.
//!
//! A language model turns the context into (description, query) pairs,
//! each query runs against a web image search, and every hit is scored
//! against its description with CLIP. The best unique images come back
//! in descending score order.
//!
//! ```no_run
//! use contextsearch::ContextSearch;
//!
//! let search = ContextSearch::new("google-api-key", "engine-id")?;
//! for result in search.search_with_context("a cat sitting on a red sofa", 3, None)? {
//!     println!("{:.3} {}", result.score, result.url);
//! }
//! # Ok::<(), contextsearch::Error>(())
//! ```

pub mod clip;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod search;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{ContextSearch, PipelineOptions};
pub use types::{DecodedImage, ImageCandidate, ImageSearchResult, ScoredCandidate, SearchPair};

/// User-Agent sent to every API this crate calls.
pub const USER_AGENT: &str = concat!("contextsearch/", env!("CARGO_PKG_VERSION"));
