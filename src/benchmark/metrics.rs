//! Retrieval quality of k-NN answers.
//!
//! - Recall@k: fraction of the true k nearest neighbors retrieved
//! - Precision@k: fraction of the retrieved ids that are true neighbors

use std::collections::HashSet;

use crate::ann::KnnResults;

/// recall@k = |retrieved ∩ ground_truth| / k, over the first `k` of each.
pub fn recall_at_k(ground_truth: &[usize], retrieved: &[usize], k: usize) -> f32 {
    if k == 0 || ground_truth.is_empty() {
        return 0.0;
    }

    let gt_set: HashSet<usize> = ground_truth.iter().take(k).copied().collect();
    let retrieved_set: HashSet<usize> = retrieved.iter().take(k).copied().collect();

    let intersection = gt_set.intersection(&retrieved_set).count();
    intersection as f32 / k.min(ground_truth.len()) as f32
}

/// precision@k = |retrieved ∩ ground_truth| / |retrieved|, over the first `k`.
pub fn precision_at_k(ground_truth: &[usize], retrieved: &[usize], k: usize) -> f32 {
    let retrieved_k = &retrieved[..retrieved.len().min(k)];
    if retrieved_k.is_empty() {
        return 0.0;
    }

    let gt_set: HashSet<usize> = ground_truth.iter().take(k).copied().collect();
    let hits = retrieved_k.iter().filter(|id| gt_set.contains(id)).count();
    hits as f32 / retrieved_k.len() as f32
}

/// Mean recall@k across queries.
pub fn mean_recall(ground_truths: &[Vec<usize>], retrievals: &[Vec<usize>], k: usize) -> f32 {
    if ground_truths.is_empty() {
        return 0.0;
    }

    let total: f32 = ground_truths
        .iter()
        .zip(retrievals)
        .map(|(gt, ret)| recall_at_k(gt, ret, k))
        .sum();

    total / ground_truths.len() as f32
}

/// Mean recall@k of a batch search against its ground truth.
pub fn knn_recall(ground_truths: &[Vec<usize>], results: &KnnResults, k: usize) -> f32 {
    mean_recall(ground_truths, &results.indices, k)
}
