//! Reciprocal Rank Fusion and post-fusion de-duplication.

use std::collections::{HashMap, HashSet};

use index::RetrievalResult;

pub const RRF_K: f64 = 60.0;

/// Text prefix used as the fusion key for results without an id.
const FUSION_KEY_CHARS: usize = 100;
/// Text prefix used as the de-duplication key for results without an id.
const DEDUP_KEY_CHARS: usize = 80;

/// Fuse ranked lists with `score = Σ 1 / (k + rank)`, rank 1-based per list.
///
/// The first copy of a key's payload wins. Output is sorted by descending
/// score; ties keep first-seen order. Each result carries its fused score.
pub fn reciprocal_rank_fusion(lists: &[Vec<RetrievalResult>], k: f64) -> Vec<RetrievalResult> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<(RetrievalResult, f64)> = Vec::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f64);
            let key = result.identity(FUSION_KEY_CHARS);
            match slots.get(&key) {
                Some(&slot) => fused[slot].1 += contribution,
                None => {
                    slots.insert(key, fused.len());
                    fused.push((result.clone(), contribution));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
        .into_iter()
        .map(|(mut result, score)| {
            result.score = Some(score);
            result
        })
        .collect()
}

/// Drop results whose key was already emitted, keeping order.
pub fn deduplicate(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.identity(DEDUP_KEY_CHARS)))
        .collect()
}

/// Fuse, de-duplicate and cut to `top_k`.
pub fn fuse_top_k(lists: &[Vec<RetrievalResult>], k: f64, top_k: usize) -> Vec<RetrievalResult> {
    let mut results = deduplicate(reciprocal_rank_fusion(lists, k));
    results.truncate(top_k);
    results
}
