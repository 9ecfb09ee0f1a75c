//! Merge, deduplicate and order scored candidates.

use std::collections::HashMap;

use crate::types::{ImageSearchResult, ScoredCandidate};

/// Deduplicate scored candidates by exact URL.
///
/// The entry with the higher score is kept; on equal scores the first-seen
/// entry wins. Survivors stay at the position where their URL first appeared.
pub fn deduplicate(candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match slots.get(&candidate.url) {
            Some(&slot) => {
                if candidate.score > kept[slot].score {
                    kept[slot] = candidate;
                }
            }
            None => {
                slots.insert(candidate.url.clone(), kept.len());
                kept.push(candidate);
            }
        }
    }

    kept
}

/// Produce the final result list.
///
/// Applies the optional score floor, deduplicates, sorts descending by score
/// (stable, so ties keep merge order) and truncates to `limit`.
pub fn rank(
    candidates: Vec<ScoredCandidate>,
    min_score: Option<f32>,
    limit: usize,
) -> Vec<ImageSearchResult> {
    let filtered: Vec<ScoredCandidate> = match min_score {
        Some(floor) => candidates.into_iter().filter(|c| c.score >= floor).collect(),
        None => candidates,
    };

    let mut unique = deduplicate(filtered);
    unique.sort_by(|a, b| b.score.total_cmp(&a.score));
    unique.truncate(limit);

    unique.into_iter().map(ImageSearchResult::from).collect()
}
