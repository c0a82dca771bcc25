//! Automatic choice of index family and parameters.
//!
//! Building an autotuned index runs a small experiment on a sample of the data:
//!
//! 1. Draw `sample_fraction` of the rows and hold out up to 1000 of them (a tenth
//!    of the sample) as test queries; time the exact 1-NN answers as the cost of a
//!    linear scan.
//! 2. Build every k-means tree of the `kmeans_iterations x kmeans_branchings` grid
//!    and every KD-forest of the `kdtree_trees` grid over the sample, and find the
//!    visit budget each needs for `target_precision`.
//! 3. Score candidates by `build * build_weight + search`, normalized by the best
//!    such time, plus `memory_weight * memory_ratio`, and keep the cheapest.
//! 4. Build the winner over the full data and re-estimate its budget (and, for a
//!    k-means tree, its `cb_index`) on queries drawn from the full data.
//!
//! Searches with [`Checks::Autotuned`] then run with the tuned values.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::traits::NnIndex;
use super::{Engine, IndexKind, View};
use crate::benchmark::ground_truth::compute_ground_truth;
use crate::benchmark::precision::{test_index_precision, PrecisionEstimate, TestSet};
use crate::dataset::{DataKind, Dataset, Matrix, Query};
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::params::{AutotunedParams, Checks, IndexParams, KMeansParams, KdForestParams, SearchParams};
use crate::partitioning::CentersInit;
use crate::result_set::ResultSet;

/// Most test queries drawn for any one estimate.
const SAMPLE_COUNT: usize = 1000;

/// Fewer held-out queries than this make the estimates meaningless.
const MIN_TEST_QUERIES: usize = 10;

/// Measured costs of one candidate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCost {
    pub params: IndexParams,
    /// Seconds.
    pub build_time: f64,
    /// Seconds per pass over the test queries at the tuned budget.
    pub search_time: f64,
    /// `(structure + data) / data` bytes; `0` for the linear scan.
    pub memory_ratio: f64,
    /// Budget reaching the target precision on the sample.
    pub checks: usize,
    /// Normalized total cost; lower is better.
    pub total_cost: f64,
}

/// Outcome of tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    /// Winning family and build parameters.
    pub params: IndexParams,
    /// Budget substituted for [`Checks::Autotuned`].
    pub checks: Checks,
    /// Cluster-boundary bias substituted for k-means winners.
    pub cb_index: Option<f32>,
    /// Linear scan time over tuned search time on the full data.
    pub speedup: f64,
    pub candidates: Vec<CandidateCost>,
}

/// Index that picks its own family and parameters at build time (dense data only).
#[derive(Debug, Clone)]
pub struct AutotunedIndex {
    metric: DistanceMetric,
    params: AutotunedParams,
    best: Option<Engine>,
    report: Option<TuningReport>,
}

impl AutotunedIndex {
    pub(crate) fn new(metric: DistanceMetric, params: AutotunedParams) -> Result<Self> {
        if !metric.supports(DataKind::Dense) {
            return Err(IndexError::unsupported(format!(
                "autotuning needs a metric over dense vectors, got {metric:?}"
            )));
        }
        Ok(Self {
            metric,
            params,
            best: None,
            report: None,
        })
    }

    pub fn report(&self) -> Option<&TuningReport> {
        self.report.as_ref()
    }

    /// Family of the chosen index, once built.
    pub fn best_kind(&self) -> Option<IndexKind> {
        self.best.as_ref().map(Engine::kind)
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.params.timing_window_ms)
    }

    /// Search parameters with the tuned values substituted for `Checks::Autotuned`.
    fn resolve(&self, params: &SearchParams) -> SearchParams {
        match (&self.report, params.checks) {
            (Some(report), Checks::Autotuned) => SearchParams {
                checks: report.checks,
                cb_index: report.cb_index.or(params.cb_index),
                ..params.clone()
            },
            _ => params.clone(),
        }
    }

    fn best(&self) -> Result<&Engine> {
        self.best
            .as_ref()
            .ok_or_else(|| IndexError::unsupported("autotuned index has not been built"))
    }

    /// Cost every grid candidate over `sample`, with the linear scan first.
    fn explore(
        &self,
        sample: &Dataset,
        test: &TestSet<'_>,
        linear_time: f64,
        rng: &mut StdRng,
    ) -> Result<Vec<CandidateCost>> {
        let mut costs = vec![CandidateCost {
            params: IndexParams::Linear,
            build_time: 0.0,
            search_time: linear_time,
            memory_ratio: 0.0,
            checks: sample.len(),
            total_cost: 0.0,
        }];

        log::info!("autotune: exploring k-means trees");
        for &iterations in &self.params.kmeans_iterations {
            for &branching in &self.params.kmeans_branchings {
                let params = IndexParams::KMeans(KMeansParams {
                    branching,
                    iterations: Some(iterations),
                    centers_init: CentersInit::Random,
                    ..Default::default()
                });
                costs.push(self.evaluate(params, sample, test, rng)?);
            }
        }

        log::info!("autotune: exploring KD-forests");
        for &trees in &self.params.kdtree_trees {
            let params = IndexParams::KdForest(KdForestParams { trees });
            costs.push(self.evaluate(params, sample, test, rng)?);
        }
        Ok(costs)
    }

    fn evaluate(
        &self,
        params: IndexParams,
        sample: &Dataset,
        test: &TestSet<'_>,
        rng: &mut StdRng,
    ) -> Result<CandidateCost> {
        let mut engine = Engine::new(self.metric, &params)?;
        let start = Instant::now();
        engine.as_nn_mut().build_index(sample, rng)?;
        let build_time = start.elapsed().as_secs_f64();

        let view = View {
            metric: self.metric,
            data: sample,
            engine: &engine,
        };
        let estimate = test_index_precision(
            &view,
            test,
            self.params.target_precision,
            &SearchParams::default(),
            self.window(),
        )?;

        let data_bytes = (sample.len() * sample.width() * std::mem::size_of::<f64>()).max(1) as f64;
        let memory_ratio = (engine.as_nn().used_memory() as f64 + data_bytes) / data_bytes;
        log::debug!(
            "autotune: {params:?} built in {build_time:.4}s, {} checks, {:.6}s per pass",
            estimate.checks,
            estimate.search_time
        );
        Ok(CandidateCost {
            params,
            build_time,
            search_time: estimate.search_time,
            memory_ratio,
            checks: estimate.checks,
            total_cost: 0.0,
        })
    }

    /// Fill in `total_cost` for every candidate and return the cheapest one's index.
    fn select(&self, costs: &mut [CandidateCost]) -> usize {
        let build_weight = f64::from(self.params.build_weight);
        let memory_weight = f64::from(self.params.memory_weight);
        let time_cost = |c: &CandidateCost| c.build_time * build_weight + c.search_time;

        let best_time = costs.iter().map(time_cost).fold(f64::INFINITY, f64::min);
        if best_time.is_nan() || best_time <= 0.0 {
            // Nothing measurable; the scan needs no build.
            return 0;
        }

        for c in costs.iter_mut() {
            c.total_cost = time_cost(c) / best_time + memory_weight * c.memory_ratio;
        }
        costs.iter().enumerate().fold(0, |best, (i, c)| {
            if c.total_cost < costs[best].total_cost {
                i
            } else {
                best
            }
        })
    }

    /// Tune the search budget of the built winner on queries drawn from `data`.
    fn estimate_search_params(
        &self,
        engine: &Engine,
        data: &Matrix<f64>,
        dataset: &Dataset,
        rng: &mut StdRng,
    ) -> Result<(Checks, Option<f32>, f64)> {
        let samples = (data.rows() / 10).min(SAMPLE_COUNT);
        if samples == 0 || engine.kind() == IndexKind::Linear {
            return Ok((Checks::Unlimited, None, 1.0));
        }

        let queries = Dataset::Dense(data.sample_rows(samples, rng));
        let window = self.window();
        let start = Instant::now();
        let mut repeats = 0u32;
        let ground_truth = loop {
            repeats += 1;
            let gt = compute_ground_truth(dataset, &queries, 1, 1, self.metric)?;
            if start.elapsed() >= window {
                break gt;
            }
        };
        let linear = start.elapsed().as_secs_f64() / f64::from(repeats);

        let view = View {
            metric: self.metric,
            data: dataset,
            engine,
        };
        let test = TestSet {
            queries: &queries,
            ground_truth: &ground_truth,
            nn: 1,
            skip: 1,
        };
        let target = self.params.target_precision;

        let (estimate, cb_index) = if engine.kind() == IndexKind::KMeans {
            let mut best: Option<(PrecisionEstimate, f32)> = None;
            for step in 0..=5u8 {
                let cb_index = f32::from(step) * 0.2;
                let params = SearchParams {
                    cb_index: Some(cb_index),
                    ..SearchParams::default()
                };
                let estimate = test_index_precision(&view, &test, target, &params, window)?;
                log::debug!(
                    "autotune: cb_index {cb_index:.1} needs {} checks, {:.6}s per pass",
                    estimate.checks,
                    estimate.search_time
                );
                if best.map_or(true, |(b, _)| estimate.search_time < b.search_time) {
                    best = Some((estimate, cb_index));
                }
            }
            match best {
                Some((estimate, cb_index)) => (estimate, Some(cb_index)),
                None => return Ok((Checks::Unlimited, None, 1.0)),
            }
        } else {
            (test_index_precision(&view, &test, target, &SearchParams::default(), window)?, None)
        };

        let speedup = if estimate.search_time > 0.0 {
            linear / estimate.search_time
        } else {
            0.0
        };
        Ok((Checks::Limited(estimate.checks), cb_index, speedup))
    }
}

impl NnIndex for AutotunedIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        let matrix = data
            .as_dense()
            .ok_or_else(|| IndexError::unsupported("autotuning supports dense vectors only"))?;

        let sample_size = (f64::from(self.params.sample_fraction) * matrix.rows() as f64) as usize;
        let test_size = (sample_size / 10).min(SAMPLE_COUNT);

        let (best_params, candidates) = if test_size < MIN_TEST_QUERIES {
            log::warn!(
                "autotune: only {test_size} test queries from {} points, falling back to a linear scan",
                matrix.rows()
            );
            (IndexParams::Linear, Vec::new())
        } else {
            let mut sample = matrix.sample_rows(sample_size, rng);
            let queries = Dataset::Dense(sample.take_sample_rows(test_size, rng));
            let sample = Dataset::Dense(sample);

            let window = self.window();
            let start = Instant::now();
            let mut repeats = 0u32;
            let ground_truth = loop {
                repeats += 1;
                let gt = compute_ground_truth(&sample, &queries, 1, 0, self.metric)?;
                if start.elapsed() >= window {
                    break gt;
                }
            };
            let linear_time = start.elapsed().as_secs_f64() / f64::from(repeats);

            let test = TestSet {
                queries: &queries,
                ground_truth: &ground_truth,
                nn: 1,
                skip: 0,
            };
            let mut costs = self.explore(&sample, &test, linear_time, rng)?;
            let best = self.select(&mut costs);
            (costs[best].params.clone(), costs)
        };
        log::info!("autotune: selected {best_params:?}");

        let mut engine = Engine::new(self.metric, &best_params)?;
        engine.as_nn_mut().build_index(data, rng)?;
        let (checks, cb_index, speedup) = self.estimate_search_params(&engine, matrix, data, rng)?;
        log::info!("autotune: checks {checks:?}, cb_index {cb_index:?}, speedup {speedup:.2}");

        self.best = Some(engine);
        self.report = Some(TuningReport {
            params: best_params,
            checks,
            cb_index,
            speedup,
            candidates,
        });
        Ok(())
    }

    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        params: &SearchParams,
    ) -> Result<()> {
        let params = self.resolve(params);
        self.best()?.as_nn().find_neighbors(data, result, query, &params)
    }

    fn find_nearest(&self, data: &Dataset, result: &mut dyn ResultSet, query: Query<'_>) -> Result<()> {
        self.best()?.as_nn().find_nearest(data, result, query)
    }

    fn used_memory(&self) -> usize {
        self.best.as_ref().map_or(0, |b| b.as_nn().used_memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::datasets;
    use rand::SeedableRng;

    fn quick(params: AutotunedParams) -> AutotunedParams {
        AutotunedParams {
            timing_window_ms: 0,
            kmeans_iterations: vec![1, 5],
            kmeans_branchings: vec![8, 16],
            kdtree_trees: vec![1, 4],
            ..params
        }
    }

    #[test]
    fn tiny_sample_falls_back_to_linear() {
        let w = datasets::uniform(200, 0, 3, 1).unwrap();
        let mut index = AutotunedIndex::new(DistanceMetric::EuclideanSquared, quick(AutotunedParams::default())).unwrap();
        index.build_index(&w.base, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(index.best_kind(), Some(IndexKind::Linear));
        let report = index.report().unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.checks, Checks::Unlimited);
    }

    #[test]
    fn explores_the_whole_grid() {
        let w = datasets::clustered(3000, 0, 4, 12, 0.02, 2).unwrap();
        let params = quick(AutotunedParams {
            sample_fraction: 0.5,
            ..Default::default()
        });
        let mut index = AutotunedIndex::new(DistanceMetric::EuclideanSquared, params).unwrap();
        index.build_index(&w.base, &mut StdRng::seed_from_u64(3)).unwrap();

        let report = index.report().unwrap();
        // linear + 2x2 k-means + 2 forests
        assert_eq!(report.candidates.len(), 7);
        assert_eq!(report.candidates[0].params, IndexParams::Linear);
        let best = report
            .candidates
            .iter()
            .map(|c| c.total_cost)
            .fold(f64::INFINITY, f64::min);
        assert!(report.candidates.iter().any(|c| c.params == report.params && c.total_cost == best));
        assert_eq!(index.best_kind(), Some(report.params.kind()));
    }

    #[test]
    fn autotuned_checks_are_substituted() {
        let index = AutotunedIndex {
            metric: DistanceMetric::EuclideanSquared,
            params: AutotunedParams::default(),
            best: None,
            report: Some(TuningReport {
                params: IndexParams::KMeans(KMeansParams::default()),
                checks: Checks::Limited(48),
                cb_index: Some(0.4),
                speedup: 3.0,
                candidates: Vec::new(),
            }),
        };
        let resolved = index.resolve(&SearchParams::autotuned().max_neighbors(Some(3)));
        assert_eq!(resolved.checks, Checks::Limited(48));
        assert_eq!(resolved.cb_index, Some(0.4));
        assert_eq!(resolved.max_neighbors, Some(3));

        let explicit = index.resolve(&SearchParams::with_checks(7));
        assert_eq!(explicit.checks, Checks::Limited(7));
        assert_eq!(explicit.cb_index, None);
    }

    #[test]
    fn bit_vectors_are_rejected() {
        assert!(AutotunedIndex::new(DistanceMetric::Hamming, AutotunedParams::default()).is_err());
        let bits = Dataset::binary(&[[1u32]]).unwrap();
        let mut index = AutotunedIndex::new(DistanceMetric::EuclideanSquared, AutotunedParams::default()).unwrap();
        assert!(index.build_index(&bits, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
