//! Image/text relevance from a shared embedding space.

use image::DynamicImage;
use moka::sync::Cache;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::DecodedImage;

/// A single embedding vector.
pub type ClipEmbedding = Vec<f32>;

/// Distinct descriptions kept embedded. One search uses a handful.
const TEXT_CACHE_ENTRIES: u64 = 256;

/// Maps images and text into one vector space.
pub trait EmbeddingModel: Send + Sync {
    fn embed_image(&self, img: &DynamicImage) -> anyhow::Result<ClipEmbedding>;
    fn embed_text(&self, text: &str) -> anyhow::Result<ClipEmbedding>;
}

/// Scores how well an image matches a text description. Higher is better.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, image: &DecodedImage, description: &str) -> Result<f32>;
}

/// Cosine similarity between image and description embeddings.
///
/// Every candidate of a pair shares its description, so description
/// embeddings are cached and computed once per distinct text.
pub struct EmbeddingScorer<M> {
    model: M,
    text_cache: Cache<String, Arc<ClipEmbedding>>,
}

impl<M: EmbeddingModel> EmbeddingScorer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            text_cache: Cache::new(TEXT_CACHE_ENTRIES),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: EmbeddingModel> RelevanceScorer for EmbeddingScorer<M> {
    fn score(&self, image: &DecodedImage, description: &str) -> Result<f32> {
        let image_embedding = self
            .model
            .embed_image(&image.image)
            .map_err(|e| Error::score(&image.url, format!("image embedding failed: {e:#}")))?;

        // Concurrent callers with the same description wait for one computation;
        // failures are not cached
        let text_embedding = self
            .text_cache
            .try_get_with(description.to_string(), || {
                self.model.embed_text(description).map(Arc::new)
            })
            .map_err(|e| Error::score(&image.url, format!("text embedding failed: {e:#}")))?;

        checked_similarity(&image.url, &image_embedding, &text_embedding)
    }
}

/// Cosine similarity that rejects vectors no score can be drawn from.
fn checked_similarity(url: &str, a: &[f32], b: &[f32]) -> Result<f32> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::score(url, "empty embedding"));
    }
    if a.len() != b.len() {
        return Err(Error::score(
            url,
            format!("embedding dimensions differ ({} vs {})", a.len(), b.len()),
        ));
    }

    let score = cosine_similarity(a, b);
    if !score.is_finite() {
        return Err(Error::score(url, "similarity is not a finite number"));
    }
    Ok(score)
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds images by mean colour and text by colour words.
    struct ColourModel;

    impl EmbeddingModel for ColourModel {
        fn embed_image(&self, img: &DynamicImage) -> anyhow::Result<ClipEmbedding> {
            let rgb = img.to_rgb8();
            let n = (rgb.width() * rgb.height()) as f32;
            let mut sum = [0.0f32; 3];
            for p in rgb.pixels() {
                for c in 0..3 {
                    sum[c] += p[c] as f32;
                }
            }
            Ok(sum.iter().map(|s| s / n).collect())
        }

        fn embed_text(&self, text: &str) -> anyhow::Result<ClipEmbedding> {
            let text = text.to_lowercase();
            let has = |w: &str| if text.contains(w) { 1.0 } else { 0.05 };
            Ok(vec![has("red"), has("green"), has("blue")])
        }
    }

    struct BrokenModel;

    impl EmbeddingModel for BrokenModel {
        fn embed_image(&self, _img: &DynamicImage) -> anyhow::Result<ClipEmbedding> {
            Ok(vec![1.0, 0.0])
        }

        fn embed_text(&self, _text: &str) -> anyhow::Result<ClipEmbedding> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    struct FailingModel;

    impl EmbeddingModel for FailingModel {
        fn embed_image(&self, _img: &DynamicImage) -> anyhow::Result<ClipEmbedding> {
            anyhow::bail!("session crashed")
        }

        fn embed_text(&self, _text: &str) -> anyhow::Result<ClipEmbedding> {
            Ok(vec![1.0])
        }
    }

    /// Counts text encoder runs; text fails for descriptions containing "fail".
    struct CountingModel {
        text_calls: AtomicUsize,
    }

    impl EmbeddingModel for CountingModel {
        fn embed_image(&self, img: &DynamicImage) -> anyhow::Result<ClipEmbedding> {
            ColourModel.embed_image(img)
        }

        fn embed_text(&self, text: &str) -> anyhow::Result<ClipEmbedding> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("fail") {
                anyhow::bail!("tokenizer error");
            }
            ColourModel.embed_text(text)
        }
    }

    fn counting_scorer() -> EmbeddingScorer<CountingModel> {
        EmbeddingScorer::new(CountingModel {
            text_calls: AtomicUsize::new(0),
        })
    }

    fn decoded(color: [u8; 3]) -> DecodedImage {
        DecodedImage {
            url: "https://example.com/img.png".into(),
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color))),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn score_is_deterministic() {
        let scorer = EmbeddingScorer::new(ColourModel);
        let image = decoded([200, 10, 10]);
        let a = scorer.score(&image, "a red car").unwrap();
        let b = scorer.score(&image, "a red car").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn matching_description_scores_higher() {
        let scorer = EmbeddingScorer::new(ColourModel);
        let image = decoded([200, 10, 10]);
        let red = scorer.score(&image, "a red car").unwrap();
        let blue = scorer.score(&image, "a blue car").unwrap();
        assert!(red > blue);
    }

    #[test]
    fn dimension_mismatch_is_score_error() {
        let scorer = EmbeddingScorer::new(BrokenModel);
        let err = scorer.score(&decoded([0, 0, 0]), "anything").unwrap_err();
        assert!(matches!(err, Error::Score { .. }));
        assert!(err.to_string().contains("dimensions differ"));
    }

    #[test]
    fn model_failure_is_score_error() {
        let scorer = EmbeddingScorer::new(FailingModel);
        let err = scorer.score(&decoded([0, 0, 0]), "anything").unwrap_err();
        assert!(matches!(err, Error::Score { .. }));
        assert!(err.to_string().contains("session crashed"));
    }

    #[test]
    fn description_embedded_once_per_text() {
        let scorer = counting_scorer();
        for shade in 0..10u8 {
            scorer.score(&decoded([200, shade, 10]), "a red car").unwrap();
        }
        assert_eq!(scorer.model().text_calls.load(Ordering::SeqCst), 1);

        scorer.score(&decoded([0, 0, 200]), "a blue car").unwrap();
        assert_eq!(scorer.model().text_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cached_embedding_gives_same_score() {
        let scorer = counting_scorer();
        let image = decoded([200, 10, 10]);
        let first = scorer.score(&image, "a red car").unwrap();
        let second = scorer.score(&image, "a red car").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn shared_description_across_threads_embedded_once() {
        let scorer = counting_scorer();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| scorer.score(&decoded([200, 10, 10]), "a red car").unwrap());
            }
        });
        assert_eq!(scorer.model().text_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn text_failure_not_cached() {
        let scorer = counting_scorer();
        let image = decoded([200, 10, 10]);
        let err = scorer.score(&image, "fail here").unwrap_err();
        assert!(matches!(err, Error::Score { .. }));
        assert!(err.to_string().contains("tokenizer error"));

        assert!(scorer.score(&image, "fail here").is_err());
        assert_eq!(scorer.model().text_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_and_non_finite_rejected() {
        assert!(checked_similarity("u", &[], &[]).is_err());
        assert!(checked_similarity("u", &[f32::NAN, 1.0], &[1.0, 1.0]).is_err());
        assert!(checked_similarity("u", &[1.0, 0.0], &[1.0, 0.0]).is_ok());
    }
}
