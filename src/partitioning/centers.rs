//! Seed selection for clustering-based builders.
//!
//! Choosers work on a subset of point ids (the slice of the permutation a tree
//! node owns) and measure distances through a closure, so the same code serves
//! dense k-means trees and bit-vector hierarchical clustering.
//!
//! All strategies stop early when the subset holds fewer than `k` distinct
//! points; the caller then turns the node into a leaf.
//!
//! # References
//!
//! - Gonzalez (1985): "Clustering to minimize the maximum intercluster distance"
//! - Arthur & Vassilvitskii (2007): "k-means++: the advantages of careful seeding"

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Two candidate centers closer than this are the same point.
const DUPLICATE_EPS: f64 = 1e-16;

/// Seed selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CentersInit {
    /// Uniform draws without replacement, skipping duplicates.
    #[default]
    Random,
    /// Farthest-first traversal from one random seed.
    Gonzalez,
    /// Potential-weighted sampling, one local trial per step.
    KMeansPP,
}

impl CentersInit {
    /// Choose up to `k` centers among `ids`; returns point ids.
    ///
    /// `dist(a, b)` must return the metric distance between points `a` and `b`.
    pub fn choose<F>(self, k: usize, ids: &[usize], dist: F, rng: &mut StdRng) -> Vec<usize>
    where
        F: Fn(usize, usize) -> f64,
    {
        if k == 0 || ids.is_empty() {
            return Vec::new();
        }
        match self {
            CentersInit::Random => random(k, ids, dist, rng),
            CentersInit::Gonzalez => gonzalez(k, ids, dist, rng),
            CentersInit::KMeansPP => kmeans_pp(k, ids, dist, rng),
        }
    }
}

fn random<F>(k: usize, ids: &[usize], dist: F, rng: &mut StdRng) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    let mut order: Vec<usize> = ids.to_vec();
    order.shuffle(rng);

    let mut centers = Vec::with_capacity(k);
    for candidate in order {
        if centers.len() == k {
            break;
        }
        let duplicate = centers
            .iter()
            .any(|&c| dist(candidate, c) < DUPLICATE_EPS);
        if !duplicate {
            centers.push(candidate);
        }
    }
    centers
}

fn gonzalez<F>(k: usize, ids: &[usize], dist: F, rng: &mut StdRng) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    let first = ids[rng.random_range(0..ids.len())];
    let mut centers = vec![first];
    let mut closest: Vec<f64> = ids.iter().map(|&p| dist(p, first)).collect();

    while centers.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (j, &d) in closest.iter().enumerate() {
            if d > best.map_or(0.0, |(_, v)| v) {
                best = Some((j, d));
            }
        }
        // Every remaining point coincides with a center.
        let Some((j, _)) = best else {
            break;
        };
        let center = ids[j];
        centers.push(center);
        for (slot, &p) in closest.iter_mut().zip(ids) {
            *slot = slot.min(dist(p, center));
        }
    }
    centers
}

fn kmeans_pp<F>(k: usize, ids: &[usize], dist: F, rng: &mut StdRng) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    let first = ids[rng.random_range(0..ids.len())];
    let mut centers = vec![first];
    let mut closest: Vec<f64> = ids.iter().map(|&p| dist(p, first)).collect();
    let mut potential: f64 = closest.iter().sum();

    while centers.len() < k && potential > 0.0 {
        let mut target = rng.random::<f64>() * potential;
        let mut pick = None;
        for (j, &w) in closest.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            pick = Some(j);
            if target < w {
                break;
            }
            target -= w;
        }
        let Some(j) = pick else {
            break;
        };

        let center = ids[j];
        centers.push(center);
        potential = 0.0;
        for (slot, &p) in closest.iter_mut().zip(ids) {
            *slot = slot.min(dist(p, center));
            potential += *slot;
        }
    }
    centers
}
