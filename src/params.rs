//! Build and search configuration.
//!
//! Every params struct carries the defaults the index families are tuned for and
//! derives `serde` traits with `#[serde(default)]`, so a driver can load partial
//! configurations from any serde format and get the remaining fields filled in.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::partitioning::CentersInit;

/// Visit budget for budgeted (best-bin-first) searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checks {
    /// Score at most this many points (once the result set is full).
    Limited(usize),
    /// Exact search (`-1` in the raw encoding).
    Unlimited,
    /// Use the value picked by the autotuned index (`-2` in the raw encoding).
    Autotuned,
}

impl Checks {
    /// Raw sentinel used on external surfaces.
    pub const UNLIMITED: i32 = -1;
    pub const AUTOTUNED: i32 = -2;

    /// Decode the raw integer form: `-1` unlimited, `-2` autotuned, `n >= 0` limited.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            Self::UNLIMITED => Ok(Checks::Unlimited),
            Self::AUTOTUNED => Ok(Checks::Autotuned),
            n if n >= 0 => Ok(Checks::Limited(n as usize)),
            n => Err(IndexError::config(format!("invalid checks value {n}"))),
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Checks::Limited(n) => n as i64,
            Checks::Unlimited => Self::UNLIMITED as i64,
            Checks::Autotuned => Self::AUTOTUNED as i64,
        }
    }
}

impl Default for Checks {
    fn default() -> Self {
        Checks::Unlimited
    }
}

/// Per-query search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Visit budget.
    pub checks: Checks,
    /// Relative slack for approximate pruning (`0.0` keeps pruning exact).
    pub eps: f32,
    /// Sort unbounded radius results before copying them out.
    pub sorted: bool,
    /// Radius search bound on returned neighbors: `None` unbounded, `Some(0)` count only.
    pub max_neighbors: Option<usize>,
    /// Radius (in squared distance units) for radius search.
    pub radius: f64,
    /// Cluster-boundary bias override for k-means trees.
    pub cb_index: Option<f32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            checks: Checks::default(),
            eps: 0.0,
            sorted: true,
            max_neighbors: None,
            radius: 0.0,
            cb_index: None,
        }
    }
}

impl SearchParams {
    /// Parameters for an exact search.
    pub fn exact() -> Self {
        Self {
            checks: Checks::Unlimited,
            ..Self::default()
        }
    }

    pub fn with_checks(checks: usize) -> Self {
        Self {
            checks: Checks::Limited(checks),
            ..Self::default()
        }
    }

    /// Parameters deferring to an autotuned index's tuned values.
    pub fn autotuned() -> Self {
        Self {
            checks: Checks::Autotuned,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    #[must_use]
    pub fn max_neighbors(mut self, max_neighbors: Option<usize>) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }
}

/// Single KD-tree parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdTreeSingleParams {
    /// A node with at most this many points becomes a leaf.
    pub max_leaf_size: usize,
}

impl Default for KdTreeSingleParams {
    fn default() -> Self {
        Self { max_leaf_size: 10 }
    }
}

/// Randomized KD-forest parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdForestParams {
    pub trees: usize,
}

impl Default for KdForestParams {
    fn default() -> Self {
        Self { trees: 4 }
    }
}

/// Hierarchical k-means tree parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    /// Children per internal node; must be at least 2.
    pub branching: usize,
    /// Lloyd rounds per node; `None` iterates until assignments stop changing,
    /// up to 1000 rounds.
    pub iterations: Option<usize>,
    /// Cluster-boundary bias applied to queued branches.
    pub cb_index: f32,
    pub centers_init: CentersInit,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            branching: 32,
            iterations: Some(11),
            cb_index: 0.2,
            centers_init: CentersInit::Random,
        }
    }
}

/// Multi-probe LSH parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshParams {
    pub tables: usize,
    /// Bits per hash key; each table has `2^key_size` buckets.
    pub key_size: usize,
    /// How many key bits a probe may flip.
    pub multi_probe_level: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 12,
            key_size: 8,
            multi_probe_level: 2,
        }
    }
}

/// Hierarchical clustering forest parameters (bit vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalParams {
    pub branching: usize,
    pub trees: usize,
    /// Nodes with fewer points than this become leaves.
    pub leaf_max_size: usize,
    pub centers_init: CentersInit,
}

impl Default for HierarchicalParams {
    fn default() -> Self {
        Self {
            branching: 32,
            trees: 4,
            leaf_max_size: 100,
            centers_init: CentersInit::Random,
        }
    }
}

/// K-means tree plus KD-forest over the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    pub trees: usize,
    pub branching: usize,
    pub iterations: Option<usize>,
    pub cb_index: f32,
    pub centers_init: CentersInit,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            trees: 4,
            branching: 32,
            iterations: Some(11),
            cb_index: 0.2,
            centers_init: CentersInit::Random,
        }
    }
}

impl CompositeParams {
    pub(crate) fn kmeans(&self) -> KMeansParams {
        KMeansParams {
            branching: self.branching,
            iterations: self.iterations,
            cb_index: self.cb_index,
            centers_init: self.centers_init,
        }
    }

    pub(crate) fn kdtree(&self) -> KdForestParams {
        KdForestParams { trees: self.trees }
    }
}

/// Autotuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotunedParams {
    /// Fraction of 1-NN queries that must match the oracle.
    pub target_precision: f32,
    /// Weight of build time relative to search time.
    pub build_weight: f32,
    /// Weight of memory overhead relative to time.
    pub memory_weight: f32,
    /// Fraction of the dataset used to evaluate candidates.
    pub sample_fraction: f32,
    /// Minimum wall time a precision measurement repeats its query pass for.
    pub timing_window_ms: u64,
    /// K-means grid: Lloyd rounds.
    pub kmeans_iterations: Vec<usize>,
    /// K-means grid: branching factors.
    pub kmeans_branchings: Vec<usize>,
    /// KD-forest grid: tree counts.
    pub kdtree_trees: Vec<usize>,
}

impl Default for AutotunedParams {
    fn default() -> Self {
        Self {
            target_precision: 0.8,
            build_weight: 0.01,
            memory_weight: 0.0,
            sample_fraction: 0.1,
            timing_window_ms: 200,
            kmeans_iterations: vec![1, 5, 10, 15],
            kmeans_branchings: vec![16, 32, 64, 128, 256],
            kdtree_trees: vec![1, 4, 8, 16, 32],
        }
    }
}

/// Index family and its build parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexParams {
    Linear,
    KdTreeSingle(KdTreeSingleParams),
    KdForest(KdForestParams),
    KMeans(KMeansParams),
    Lsh(LshParams),
    Hierarchical(HierarchicalParams),
    Composite(CompositeParams),
    Autotuned(AutotunedParams),
}

impl IndexParams {
    /// Reject parameter values no index could be built with.
    pub fn validate(&self) -> Result<()> {
        match self {
            IndexParams::Linear => Ok(()),
            IndexParams::KdTreeSingle(p) => {
                if p.max_leaf_size == 0 {
                    return Err(IndexError::config("max_leaf_size must be at least 1"));
                }
                Ok(())
            }
            IndexParams::KdForest(p) => check_trees(p.trees),
            IndexParams::KMeans(p) => check_branching(p.branching),
            IndexParams::Lsh(p) => {
                if p.tables == 0 {
                    return Err(IndexError::config("LSH needs at least one table"));
                }
                if p.key_size == 0 || p.key_size > crate::classic::lsh::MAX_KEY_SIZE {
                    return Err(IndexError::config(format!(
                        "key_size must be in 1..={}, got {}",
                        crate::classic::lsh::MAX_KEY_SIZE,
                        p.key_size
                    )));
                }
                Ok(())
            }
            IndexParams::Hierarchical(p) => {
                check_branching(p.branching)?;
                check_trees(p.trees)?;
                if p.leaf_max_size == 0 {
                    return Err(IndexError::config("leaf_max_size must be at least 1"));
                }
                Ok(())
            }
            IndexParams::Composite(p) => {
                check_branching(p.branching)?;
                check_trees(p.trees)
            }
            IndexParams::Autotuned(p) => {
                if !(p.target_precision > 0.0 && p.target_precision <= 1.0) {
                    return Err(IndexError::config(format!(
                        "target_precision must be in (0, 1], got {}",
                        p.target_precision
                    )));
                }
                if !(p.sample_fraction > 0.0 && p.sample_fraction <= 1.0) {
                    return Err(IndexError::config(format!(
                        "sample_fraction must be in (0, 1], got {}",
                        p.sample_fraction
                    )));
                }
                if p.build_weight < 0.0 || p.memory_weight < 0.0 {
                    return Err(IndexError::config("cost weights must be non-negative"));
                }
                p.kmeans_branchings
                    .iter()
                    .try_for_each(|&b| check_branching(b))?;
                p.kdtree_trees.iter().try_for_each(|&t| check_trees(t))
            }
        }
    }
}

fn check_branching(branching: usize) -> Result<()> {
    if branching < 2 {
        return Err(IndexError::config(format!(
            "branching factor must be at least 2, got {branching}"
        )));
    }
    Ok(())
}

fn check_trees(trees: usize) -> Result<()> {
    if trees == 0 {
        return Err(IndexError::config("forest needs at least one tree"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_raw_sentinels() {
        assert_eq!(Checks::from_raw(-1).unwrap(), Checks::Unlimited);
        assert_eq!(Checks::from_raw(-2).unwrap(), Checks::Autotuned);
        assert_eq!(Checks::from_raw(64).unwrap(), Checks::Limited(64));
        assert!(Checks::from_raw(-3).is_err());
        assert_eq!(Checks::Autotuned.to_raw(), -2);
    }

    #[test]
    fn branching_below_two_is_rejected() {
        let params = IndexParams::KMeans(KMeansParams {
            branching: 1,
            ..Default::default()
        });
        assert!(matches!(
            params.validate(),
            Err(IndexError::Configuration(_))
        ));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let p: KMeansParams = serde_json::from_str(r#"{"branching": 8}"#).unwrap();
        assert_eq!(p.branching, 8);
        assert_eq!(p.iterations, Some(11));
        assert_eq!(p.centers_init, CentersInit::Random);

        let a: AutotunedParams = serde_json::from_str(r#"{"target_precision": 0.95}"#).unwrap();
        assert_eq!(a.kdtree_trees, vec![1, 4, 8, 16, 32]);
    }

    #[test]
    fn lsh_key_size_bounds() {
        let bad = IndexParams::Lsh(LshParams {
            key_size: 0,
            ..Default::default()
        });
        assert!(bad.validate().is_err());
        let ok = IndexParams::Lsh(LshParams::default());
        assert!(ok.validate().is_ok());
    }
}
