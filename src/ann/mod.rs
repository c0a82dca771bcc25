//! Nearest-neighbor index facade.
//!
//! [`Index`] owns the dataset and one search structure picked by
//! [`IndexParams`]. Every family sits behind the same build and search calls:
//!
//! ```rust
//! use flannel::{Dataset, DistanceMetric, Index, IndexParams, KdForestParams, SearchParams};
//!
//! let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64, (i % 7) as f64]).collect();
//! let data = Dataset::dense(&rows)?;
//! let mut index = Index::new(
//!     DistanceMetric::EuclideanSquared,
//!     data,
//!     IndexParams::KdForest(KdForestParams { trees: 2 }),
//! )?
//! .with_seed(7);
//! index.build_index()?;
//!
//! let queries = Dataset::dense(&[[10.0, 3.0]])?;
//! let found = index.knn_search(&queries, 3, &SearchParams::with_checks(32))?;
//! assert_eq!(found.indices[0][0], 10);
//! # Ok::<(), flannel::IndexError>(())
//! ```
//!
//! Building is explicit and happens once; afterwards the index is read-only and
//! can be queried from many threads.

pub mod autotune;
pub mod composite;
pub mod linear;
pub(crate) mod traits;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub use autotune::{AutotunedIndex, CandidateCost, TuningReport};
pub use composite::CompositeIndex;
pub use linear::LinearIndex;
pub use traits::{plane_split, IndexStats};

use crate::classic::lsh::LshIndex;
use crate::classic::trees::hierarchical::HierarchicalIndex;
use crate::classic::trees::kdtree::KdForestIndex;
use crate::classic::trees::kdtree_single::KdTreeSingleIndex;
use crate::classic::trees::kmeans_tree::KMeansTreeIndex;
use crate::dataset::{DataKind, Dataset, Query};
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::params::{IndexParams, SearchParams};
use crate::result_set::{
    CountRadiusResultSet, KnnRadiusResultSet, KnnResultSet, Neighbor, RadiusResultSet, ResultSet,
};
use traits::NnIndex;

/// Index family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Linear,
    KdTreeSingle,
    KdForest,
    KMeans,
    Lsh,
    Hierarchical,
    Composite,
    Autotuned,
}

impl IndexKind {
    /// Data kind the family requires; `None` accepts both.
    pub fn data_kind(self) -> Option<DataKind> {
        match self {
            IndexKind::Linear => None,
            IndexKind::Lsh | IndexKind::Hierarchical => Some(DataKind::Binary),
            IndexKind::KdTreeSingle
            | IndexKind::KdForest
            | IndexKind::KMeans
            | IndexKind::Composite
            | IndexKind::Autotuned => Some(DataKind::Dense),
        }
    }
}

impl IndexParams {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexParams::Linear => IndexKind::Linear,
            IndexParams::KdTreeSingle(_) => IndexKind::KdTreeSingle,
            IndexParams::KdForest(_) => IndexKind::KdForest,
            IndexParams::KMeans(_) => IndexKind::KMeans,
            IndexParams::Lsh(_) => IndexKind::Lsh,
            IndexParams::Hierarchical(_) => IndexKind::Hierarchical,
            IndexParams::Composite(_) => IndexKind::Composite,
            IndexParams::Autotuned(_) => IndexKind::Autotuned,
        }
    }
}

/// Per-query neighbor ids and distances, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnnResults {
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
}

/// Per-query radius matches plus the total admitted over all queries.
///
/// When `max_neighbors` is `Some(0)` only `count` is filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadiusResults {
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
    pub count: usize,
}

/// Batch k-NN search over a fixed dataset.
///
/// Implemented by [`Index`]; the precision harness in
/// [`benchmark`](crate::benchmark) is generic over it.
pub trait KnnSearch {
    /// The indexed points.
    fn dataset(&self) -> &Dataset;

    fn metric(&self) -> DistanceMetric;

    fn knn_search(&self, queries: &Dataset, k: usize, params: &SearchParams) -> Result<KnnResults>;
}

/// Closed set of search structures.
#[derive(Debug, Clone)]
pub(crate) enum Engine {
    Linear(LinearIndex),
    KdTreeSingle(KdTreeSingleIndex),
    KdForest(KdForestIndex),
    KMeans(KMeansTreeIndex),
    Lsh(LshIndex),
    Hierarchical(HierarchicalIndex),
    Composite(CompositeIndex),
    Autotuned(Box<AutotunedIndex>),
}

impl Engine {
    pub(crate) fn new(metric: DistanceMetric, params: &IndexParams) -> Result<Self> {
        Ok(match params {
            IndexParams::Linear => Engine::Linear(LinearIndex::new(metric)),
            IndexParams::KdTreeSingle(p) => Engine::KdTreeSingle(KdTreeSingleIndex::new(
                metric.dense_kernel()?,
                metric.axis_kernel()?,
                p.clone(),
            )),
            IndexParams::KdForest(p) => Engine::KdForest(KdForestIndex::new(
                metric.dense_kernel()?,
                metric.axis_kernel()?,
                p.clone(),
            )),
            IndexParams::KMeans(p) => {
                Engine::KMeans(KMeansTreeIndex::new(metric.dense_kernel()?, p.clone()))
            }
            IndexParams::Lsh(p) => Engine::Lsh(LshIndex::new(metric.bit_kernel()?, p.clone())),
            IndexParams::Hierarchical(p) => {
                Engine::Hierarchical(HierarchicalIndex::new(metric.bit_kernel()?, p.clone()))
            }
            IndexParams::Composite(p) => Engine::Composite(CompositeIndex::new(
                metric.dense_kernel()?,
                metric.axis_kernel()?,
                p,
            )),
            IndexParams::Autotuned(p) => {
                Engine::Autotuned(Box::new(AutotunedIndex::new(metric, p.clone())?))
            }
        })
    }

    pub(crate) fn kind(&self) -> IndexKind {
        match self {
            Engine::Linear(_) => IndexKind::Linear,
            Engine::KdTreeSingle(_) => IndexKind::KdTreeSingle,
            Engine::KdForest(_) => IndexKind::KdForest,
            Engine::KMeans(_) => IndexKind::KMeans,
            Engine::Lsh(_) => IndexKind::Lsh,
            Engine::Hierarchical(_) => IndexKind::Hierarchical,
            Engine::Composite(_) => IndexKind::Composite,
            Engine::Autotuned(_) => IndexKind::Autotuned,
        }
    }

    pub(crate) fn as_nn(&self) -> &dyn NnIndex {
        match self {
            Engine::Linear(i) => i,
            Engine::KdTreeSingle(i) => i,
            Engine::KdForest(i) => i,
            Engine::KMeans(i) => i,
            Engine::Lsh(i) => i,
            Engine::Hierarchical(i) => i,
            Engine::Composite(i) => i,
            Engine::Autotuned(i) => &**i,
        }
    }

    pub(crate) fn as_nn_mut(&mut self) -> &mut dyn NnIndex {
        match self {
            Engine::Linear(i) => i,
            Engine::KdTreeSingle(i) => i,
            Engine::KdForest(i) => i,
            Engine::KMeans(i) => i,
            Engine::Lsh(i) => i,
            Engine::Hierarchical(i) => i,
            Engine::Composite(i) => i,
            Engine::Autotuned(i) => &mut **i,
        }
    }
}

/// A built engine paired with the data it was built over.
pub(crate) struct View<'a> {
    pub metric: DistanceMetric,
    pub data: &'a Dataset,
    pub engine: &'a Engine,
}

impl View<'_> {
    fn check_query(&self, query: Query<'_>) -> Result<()> {
        if query.kind() != self.data.kind() {
            return Err(IndexError::unsupported(format!(
                "{:?} query against {:?} data",
                query.kind(),
                self.data.kind()
            )));
        }
        if query.width() != self.data.width() {
            return Err(IndexError::DimensionMismatch {
                expected: self.data.width(),
                actual: query.width(),
            });
        }
        Ok(())
    }

    fn check_batch(&self, queries: &Dataset) -> Result<()> {
        if queries.kind() != self.data.kind() {
            return Err(IndexError::unsupported(format!(
                "{:?} queries against {:?} data",
                queries.kind(),
                self.data.kind()
            )));
        }
        if !queries.is_empty() && queries.width() != self.data.width() {
            return Err(IndexError::DimensionMismatch {
                expected: self.data.width(),
                actual: queries.width(),
            });
        }
        Ok(())
    }

    pub(crate) fn knn_one(&self, query: Query<'_>, k: usize, params: &SearchParams) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        let mut result = KnnResultSet::new(k);
        self.engine
            .as_nn()
            .find_neighbors(self.data, &mut result, query, params)?;
        Ok(result.neighbors().to_vec())
    }

    pub(crate) fn knn_batch(&self, queries: &Dataset, k: usize, params: &SearchParams) -> Result<KnnResults> {
        self.check_batch(queries)?;
        let mut out = KnnResults {
            indices: Vec::with_capacity(queries.len()),
            distances: Vec::with_capacity(queries.len()),
        };
        let mut result = KnnResultSet::new(k);
        for query in queries.queries() {
            result.clear();
            self.engine
                .as_nn()
                .find_neighbors(self.data, &mut result, query, params)?;
            let mut indices = vec![0usize; result.len()];
            let mut distances = vec![0.0f64; result.len()];
            let n = result.copy_into(&mut distances, &mut indices, params.sorted);
            indices.truncate(n);
            distances.truncate(n);
            out.indices.push(indices);
            out.distances.push(distances);
        }
        Ok(out)
    }

    /// Returns `(indices, distances, admitted)` for one query.
    fn radius_one(&self, query: Query<'_>, params: &SearchParams) -> Result<(Vec<usize>, Vec<f64>, usize)> {
        let nn = self.engine.as_nn();
        let (mut indices, mut distances, n) = match params.max_neighbors {
            Some(0) => {
                let mut result = CountRadiusResultSet::new(params.radius);
                nn.find_neighbors(self.data, &mut result, query, params)?;
                return Ok((Vec::new(), Vec::new(), result.len()));
            }
            Some(max) => {
                let mut result = KnnRadiusResultSet::new(max, params.radius);
                nn.find_neighbors(self.data, &mut result, query, params)?;
                let (mut i, mut d) = (vec![0usize; result.len()], vec![0.0f64; result.len()]);
                let n = result.copy_into(&mut d, &mut i, params.sorted);
                (i, d, n)
            }
            None => {
                let mut result = RadiusResultSet::new(params.radius);
                nn.find_neighbors(self.data, &mut result, query, params)?;
                let (mut i, mut d) = (vec![0usize; result.len()], vec![0.0f64; result.len()]);
                let n = result.copy_into(&mut d, &mut i, params.sorted);
                (i, d, n)
            }
        };
        indices.truncate(n);
        distances.truncate(n);
        Ok((indices, distances, n))
    }

    pub(crate) fn radius_batch(&self, queries: &Dataset, params: &SearchParams) -> Result<RadiusResults> {
        self.check_batch(queries)?;
        let mut out = RadiusResults::default();
        for query in queries.queries() {
            let (indices, distances, n) = self.radius_one(query, params)?;
            out.indices.push(indices);
            out.distances.push(distances);
            out.count += n;
        }
        Ok(out)
    }
}

impl KnnSearch for View<'_> {
    fn dataset(&self) -> &Dataset {
        self.data
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn knn_search(&self, queries: &Dataset, k: usize, params: &SearchParams) -> Result<KnnResults> {
        self.knn_batch(queries, k, params)
    }
}

/// Nearest-neighbor index over an owned dataset.
#[derive(Debug, Clone)]
pub struct Index {
    metric: DistanceMetric,
    data: Dataset,
    params: IndexParams,
    engine: Engine,
    seed: Option<u64>,
    built: bool,
}

impl Index {
    /// Validate `params` against `metric` and `data` and prepare an unbuilt index.
    pub fn new(metric: DistanceMetric, data: Dataset, params: IndexParams) -> Result<Self> {
        params.validate()?;
        if data.is_empty() {
            return Err(IndexError::config("cannot index an empty dataset"));
        }
        if !metric.supports(data.kind()) {
            return Err(IndexError::unsupported(format!(
                "{metric:?} is not defined on {:?} data",
                data.kind()
            )));
        }
        let kind = params.kind();
        if let Some(required) = kind.data_kind() {
            if required != data.kind() {
                return Err(IndexError::unsupported(format!(
                    "{kind:?} index requires {required:?} data, got {:?}",
                    data.kind()
                )));
            }
        }
        let engine = Engine::new(metric, &params)?;
        Ok(Self {
            metric,
            data,
            params,
            engine,
            seed: None,
            built: false,
        })
    }

    /// Fix the seed of the build-time random choices.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the search structure. A second call does nothing.
    pub fn build_index(&mut self) -> Result<()> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.build_index_with_rng(&mut rng)
    }

    pub fn build_index_with_rng(&mut self, rng: &mut StdRng) -> Result<()> {
        if self.built {
            return Ok(());
        }
        self.engine.as_nn_mut().build_index(&self.data, rng)?;
        self.built = true;
        log::info!(
            "built {:?} index over {} points, {} bytes of structure",
            self.kind(),
            self.data.len(),
            self.used_memory()
        );
        Ok(())
    }

    fn view(&self) -> Result<View<'_>> {
        if !self.built {
            return Err(IndexError::unsupported("index has not been built"));
        }
        Ok(View {
            metric: self.metric,
            data: &self.data,
            engine: &self.engine,
        })
    }

    /// Up to `k` neighbors of every query row.
    pub fn knn_search(&self, queries: &Dataset, k: usize, params: &SearchParams) -> Result<KnnResults> {
        self.view()?.knn_batch(queries, k, params)
    }

    /// Points strictly within `params.radius` of every query row.
    pub fn radius_search(&self, queries: &Dataset, params: &SearchParams) -> Result<RadiusResults> {
        self.view()?.radius_batch(queries, params)
    }

    pub fn knn_search_one(&self, query: Query<'_>, k: usize, params: &SearchParams) -> Result<Vec<Neighbor>> {
        self.view()?.knn_one(query, k, params)
    }

    /// Radius search for one query; see [`Index::radius_search`] for `max_neighbors`.
    pub fn radius_search_one(&self, query: Query<'_>, params: &SearchParams) -> Result<(Vec<Neighbor>, usize)> {
        let view = self.view()?;
        view.check_query(query)?;
        let (indices, distances, n) = view.radius_one(query, params)?;
        let neighbors = indices
            .into_iter()
            .zip(distances)
            .map(|(index, distance)| Neighbor { index, distance })
            .collect();
        Ok((neighbors, n))
    }

    /// Exact nearest neighbor of `query`.
    pub fn find_nearest(&self, query: Query<'_>) -> Result<Option<Neighbor>> {
        let view = self.view()?;
        view.check_query(query)?;
        let mut result = KnnResultSet::new(1);
        self.engine
            .as_nn()
            .find_nearest(&self.data, &mut result, query)?;
        Ok(result.neighbors().first().copied())
    }

    /// Bytes held by the search structure, excluding the dataset.
    pub fn used_memory(&self) -> usize {
        self.engine.as_nn().used_memory()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            kind: self.kind(),
            num_points: self.data.len(),
            width: self.data.width(),
            used_memory: self.used_memory(),
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.engine.kind()
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row width: dimensions for dense data, words for bit vectors.
    pub fn dimension(&self) -> usize {
        self.data.width()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    /// Parameters chosen by an autotuned index, once built.
    pub fn tuning_report(&self) -> Option<&TuningReport> {
        match &self.engine {
            Engine::Autotuned(a) => a.report(),
            _ => None,
        }
    }

    /// The LSH tables and probe plan, for LSH indexes.
    pub fn as_lsh(&self) -> Option<&LshIndex> {
        match &self.engine {
            Engine::Lsh(l) => Some(l),
            _ => None,
        }
    }
}

impl KnnSearch for Index {
    fn dataset(&self) -> &Dataset {
        &self.data
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn knn_search(&self, queries: &Dataset, k: usize, params: &SearchParams) -> Result<KnnResults> {
        Index::knn_search(self, queries, k, params)
    }
}

/// Create and build an index in one step.
pub fn build(metric: DistanceMetric, data: Dataset, params: IndexParams) -> Result<Index> {
    let mut index = Index::new(metric, data, params)?;
    index.build_index()?;
    Ok(index)
}
