//! CLIP (Contrastive Language-Image Pre-training) relevance scoring
//!
//! Images and descriptions are embedded into the same space and compared
//! with cosine similarity. Scores are comparable within one call.

mod model;
pub mod preprocess;
mod scorer;

pub use model::ClipModel;
pub use scorer::{cosine_similarity, ClipEmbedding, EmbeddingModel, EmbeddingScorer, RelevanceScorer};

/// Default scorer backed by the CLIP ViT-B/32 encoders.
pub type ClipScorer = EmbeddingScorer<ClipModel>;
