//! flannel: exact and approximate nearest-neighbor search.
//!
//! One [`Index`] facade over several search structures, organized by approach:
//!
//! - `ann/`: the facade, brute-force scan, composite and autotuned indexes
//! - `classic/trees/`: single KD-tree, randomized KD-forest, hierarchical
//!   k-means tree, hierarchical clustering over bit vectors
//! - `classic/lsh/`: multi-probe LSH over bit vectors
//! - `partitioning/`: seed selection and Lloyd iterations used by the trees
//! - `benchmark/`: ground truth, precision measurement, recall metrics
//!
//! Dense data is compared with squared Euclidean distance, bit vectors with
//! Hamming distance. Distances are never rooted, so radii are squared too.
//!
//! # Choosing an index
//!
//! - Small or very high-dimensional data: [`IndexParams::Linear`] is exact and
//!   often fastest
//! - Low dimensions with exact answers: [`IndexParams::KdTreeSingle`]
//! - Medium to high dimensions: [`IndexParams::KdForest`] or
//!   [`IndexParams::KMeans`] with a visit budget ([`Checks::Limited`])
//! - Binary descriptors: [`IndexParams::Lsh`] or [`IndexParams::Hierarchical`]
//! - Unsure: [`IndexParams::Autotuned`] measures the candidates on a sample
//!   and keeps the cheapest one that reaches the target precision
//!
//! Budgeted searches trade precision for speed: `checks` bounds how many points
//! are scored once the result set is full. [`Checks::Unlimited`] makes every
//! tree search exact.

pub mod ann;
pub mod benchmark;
pub mod classic;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod params;
pub mod partitioning;
pub mod result_set;

pub use ann::{build, Index, IndexKind, IndexStats, KnnResults, KnnSearch, RadiusResults, TuningReport};
pub use dataset::{DataKind, Dataset, Matrix, Query};
pub use distance::DistanceMetric;
pub use error::{IndexError, Result};
pub use params::{
    AutotunedParams, Checks, CompositeParams, HierarchicalParams, IndexParams, KMeansParams,
    KdForestParams, KdTreeSingleParams, LshParams, SearchParams,
};
pub use partitioning::CentersInit;
pub use result_set::{
    CountRadiusResultSet, KnnRadiusResultSet, KnnResultSet, Neighbor, RadiusResultSet, ResultSet,
};
