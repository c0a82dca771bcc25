//! Measuring precision against ground truth, and finding the visit budget that reaches a target.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ann::KnnSearch;
use crate::dataset::{Dataset, Query};
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::params::{Checks, SearchParams};

/// Bisection stops once measured precision is this close to the target.
pub const SEARCH_EPS: f32 = 0.001;

/// Queries with their reference neighbors.
#[derive(Debug, Clone, Copy)]
pub struct TestSet<'a> {
    pub queries: &'a Dataset,
    /// At least `nn` exact neighbor ids per query, already past `skip`.
    pub ground_truth: &'a [Vec<usize>],
    /// Neighbors compared per query.
    pub nn: usize,
    /// Leading results dropped before comparing (`1` when queries come from the data).
    pub skip: usize,
}

/// One measured point of the precision / budget curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionSample {
    pub checks: usize,
    pub precision: f32,
    /// Seconds per pass over all test queries.
    pub search_time: f64,
    /// Mean of achieved over exact neighbor distance.
    pub distance_ratio: f64,
}

/// Smallest budget found that reaches the target precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionEstimate {
    pub checks: usize,
    pub precision: f32,
    pub search_time: f64,
}

impl From<PrecisionSample> for PrecisionEstimate {
    fn from(s: PrecisionSample) -> Self {
        Self {
            checks: s.checks,
            precision: s.precision,
            search_time: s.search_time,
        }
    }
}

/// How many of `neighbors` appear among the first `neighbors.len()` reference ids.
pub fn count_correct_matches(neighbors: &[usize], ground_truth: &[usize]) -> usize {
    let n = neighbors.len();
    neighbors
        .iter()
        .filter(|id| ground_truth.iter().take(n).any(|g| g == *id))
        .count()
}

/// Mean of `dist(query, neighbor_i) / dist(query, truth_i)` over the pairs.
///
/// A pair where both distances are zero counts as `1.0`.
pub fn compute_distance_ratio(
    dataset: &Dataset,
    query: Query<'_>,
    neighbors: &[usize],
    ground_truth: &[usize],
    metric: DistanceMetric,
) -> Result<f64> {
    if neighbors.is_empty() {
        return Ok(1.0);
    }
    let mut total = 0.0;
    for (&found, &truth) in neighbors.iter().zip(ground_truth) {
        let num = point_distance(dataset, query, found, metric)?;
        let den = point_distance(dataset, query, truth, metric)?;
        total += if num == 0.0 && den == 0.0 { 1.0 } else { num / den };
    }
    Ok(total / neighbors.len() as f64)
}

fn point_distance(dataset: &Dataset, query: Query<'_>, id: usize, metric: DistanceMetric) -> Result<f64> {
    match (dataset, query) {
        (Dataset::Dense(m), Query::Dense(q)) => metric.distance(q, m.row(id)),
        (Dataset::Binary(m), Query::Binary(q)) => Ok(f64::from(metric.bit_distance(q, m.row(id))?)),
        _ => Err(IndexError::unsupported("query kind does not match the data")),
    }
}

/// Run every test query with `params`, repeating whole passes until `window` has
/// elapsed (at least once), and score the results against the ground truth.
pub fn search_with_ground_truth<S: KnnSearch + ?Sized>(
    index: &S,
    test: &TestSet<'_>,
    params: &SearchParams,
    window: Duration,
) -> Result<PrecisionSample> {
    let nq = test.queries.len();
    if nq == 0 || test.nn == 0 {
        return Err(IndexError::config("precision needs at least one query and one neighbor"));
    }
    if test.ground_truth.len() < nq || test.ground_truth.iter().any(|g| g.len() < test.nn) {
        return Err(IndexError::config(format!(
            "ground truth does not hold {} neighbors for each of the {nq} queries",
            test.nn
        )));
    }

    let k = test.nn + test.skip;
    let params = SearchParams {
        max_neighbors: Some(k),
        ..params.clone()
    };

    let start = Instant::now();
    let mut repeats = 0u32;
    let (mut correct, mut ratio);
    loop {
        repeats += 1;
        let found = index.knn_search(test.queries, k, &params)?;
        correct = 0;
        ratio = 0.0;
        for (i, ids) in found.indices.iter().enumerate() {
            let truth = &test.ground_truth[i][..test.nn];
            let neighbors = ids.get(test.skip..).unwrap_or(&[]);
            let neighbors = &neighbors[..neighbors.len().min(test.nn)];
            correct += count_correct_matches(neighbors, truth);
            let query = test.queries.query(i);
            ratio += compute_distance_ratio(index.dataset(), query, neighbors, truth, index.metric())?;
        }
        if start.elapsed() >= window {
            break;
        }
    }

    let sample = PrecisionSample {
        checks: match params.checks {
            Checks::Limited(n) => n,
            _ => index.dataset().len(),
        },
        precision: correct as f32 / (test.nn * nq) as f32,
        search_time: start.elapsed().as_secs_f64() / f64::from(repeats),
        distance_ratio: ratio / nq as f64,
    };
    log::trace!(
        "checks {}: precision {:.4}, {:.6}s per pass, distance ratio {:.4}",
        sample.checks,
        sample.precision,
        sample.search_time,
        sample.distance_ratio
    );
    Ok(sample)
}

/// Find the smallest `checks` whose precision is within [`SEARCH_EPS`] of `target`.
///
/// Doubles the budget from 1 until the target is reached, then bisects between the
/// last two budgets. Doubling stops once the budget exceeds the number of indexed
/// points, since no larger budget can see more of them.
pub fn test_index_precision<S: KnnSearch + ?Sized>(
    index: &S,
    test: &TestSet<'_>,
    target: f32,
    params: &SearchParams,
    window: Duration,
) -> Result<PrecisionEstimate> {
    let n = index.dataset().len();
    let eval = |checks: usize| {
        let params = SearchParams {
            checks: Checks::Limited(checks),
            ..params.clone()
        };
        search_with_ground_truth(index, test, &params, window)
    };

    let mut c1 = 1;
    let mut c2 = 1;
    let mut hi = eval(c2)?;
    if hi.precision > target {
        return Ok(hi.into());
    }
    while hi.precision < target {
        if c2 > n {
            log::debug!(
                "precision {:.4} below target {target} even at {c2} checks",
                hi.precision
            );
            return Ok(hi.into());
        }
        c1 = c2;
        c2 *= 2;
        hi = eval(c2)?;
    }

    if (hi.precision - target).abs() <= SEARCH_EPS {
        return Ok(hi.into());
    }

    let mut cx = (c1 + c2) / 2;
    let mut mid = eval(cx)?;
    while (mid.precision - target).abs() > SEARCH_EPS {
        if mid.precision < target {
            c1 = cx;
        } else {
            c2 = cx;
            hi = mid;
        }
        cx = (c1 + c2) / 2;
        if cx == c1 {
            // Converged without landing inside the tolerance: the upper end meets the target.
            return Ok(hi.into());
        }
        mid = eval(cx)?;
    }
    Ok(mid.into())
}
