//! Internal index contract and the primitives every tree family shares.

use std::cmp::Ordering;

use rand::rngs::StdRng;

use crate::dataset::{Dataset, Matrix, Query};
use crate::error::{IndexError, Result};
use crate::params::{Checks, SearchParams};
use crate::result_set::ResultSet;

/// Arena node handle.
pub(crate) type NodeId = u32;

/// Hooks each index variant implements behind [`Index`](super::Index).
///
/// The dataset is owned by the facade and lent to every call, so composite
/// variants can share one copy of the data.
pub(crate) trait NnIndex {
    /// Build the search structure. Called at most once per instance.
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()>;

    /// Feed candidates for `query` into `result`.
    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        params: &SearchParams,
    ) -> Result<()>;

    /// Exact nearest-neighbor hook.
    fn find_nearest(&self, data: &Dataset, result: &mut dyn ResultSet, query: Query<'_>) -> Result<()> {
        self.find_neighbors(data, result, query, &SearchParams::exact())
    }

    /// Bytes held by the search structure, excluding the dataset itself.
    fn used_memory(&self) -> usize;
}

/// Statistics about a built index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub kind: super::IndexKind,
    pub num_points: usize,
    /// Dimensions for dense data, `u32` words for bit vectors.
    pub width: usize,
    pub used_memory: usize,
}

/// Three-way hyperplane partition of `ids` by coordinate `dim` around `value`.
///
/// Reorders `ids` in place and returns `(lim1, lim2)` relative to the slice:
///
/// - `ids[..lim1]` have `data[id][dim] < value`
/// - `ids[lim1..lim2]` have `data[id][dim] == value`
/// - `ids[lim2..]` have `data[id][dim] > value`
pub fn plane_split(ids: &mut [usize], data: &Matrix<f64>, dim: usize, value: f64) -> (usize, usize) {
    let coord = |id: usize| data.row(id)[dim];

    // Pass 1: `< value` to the front.
    let mut left = 0;
    let mut right = ids.len();
    loop {
        while left < right && coord(ids[left]) < value {
            left += 1;
        }
        while left < right && coord(ids[right - 1]) >= value {
            right -= 1;
        }
        if left >= right {
            break;
        }
        ids.swap(left, right - 1);
        left += 1;
        right -= 1;
    }
    let lim1 = left;

    // Pass 2: `== value` right after, `> value` last.
    right = ids.len();
    loop {
        while left < right && coord(ids[left]) <= value {
            left += 1;
        }
        while left < right && coord(ids[right - 1]) > value {
            right -= 1;
        }
        if left >= right {
            break;
        }
        ids.swap(left, right - 1);
        left += 1;
        right -= 1;
    }
    (lim1, left)
}

/// Where a split through `count` points should fall, given the partition limits.
///
/// Prefers the middle, but never cuts through a run of values on the wrong side.
pub(crate) fn cut_position(lim1: usize, lim2: usize, count: usize) -> usize {
    let half = count / 2;
    if lim1 > half {
        lim1
    } else if lim2 < half {
        lim2
    } else {
        half
    }
}

/// Unexplored subtree waiting in the best-bin-first queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Branch {
    pub node: NodeId,
    pub mindist: f64,
}

impl Eq for Branch {}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smaller mindist = higher priority
        self.mindist.total_cmp(&other.mindist).reverse()
    }
}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Visit budget for a best-bin-first search: `None` means unlimited.
pub(crate) fn visit_budget(params: &SearchParams) -> Result<Option<usize>> {
    match params.checks {
        Checks::Limited(n) => Ok(Some(n)),
        Checks::Unlimited => Ok(None),
        Checks::Autotuned => Err(IndexError::unsupported(
            "autotuned checks are only meaningful for an autotuned index",
        )),
    }
}

/// Per-query "already scored" flags shared across the trees of a forest.
pub(crate) struct Checked {
    bits: Vec<u64>,
}

impl Checked {
    pub fn new(n: usize) -> Self {
        Self {
            bits: vec![0; n.div_ceil(64)],
        }
    }

    /// Mark `id`; returns `false` if it was already marked.
    #[inline]
    pub fn insert(&mut self, id: usize) -> bool {
        let (word, bit) = (id / 64, 1u64 << (id % 64));
        let fresh = self.bits[word] & bit == 0;
        self.bits[word] |= bit;
        fresh
    }
}

/// Borrow the dense matrix and query, or fail for bit-vector inputs.
pub(crate) fn dense_pair<'a, 'q>(
    data: &'a Dataset,
    query: Query<'q>,
) -> Result<(&'a Matrix<f64>, &'q [f64])> {
    match (data, query) {
        (Dataset::Dense(m), Query::Dense(q)) => Ok((m, q)),
        _ => Err(IndexError::unsupported(
            "this index only searches dense vectors",
        )),
    }
}

/// Borrow the bit-vector matrix and query, or fail for dense inputs.
pub(crate) fn binary_pair<'a, 'q>(
    data: &'a Dataset,
    query: Query<'q>,
) -> Result<(&'a Matrix<u32>, &'q [u32])> {
    match (data, query) {
        (Dataset::Binary(m), Query::Binary(q)) => Ok((m, q)),
        _ => Err(IndexError::unsupported(
            "this index only searches bit vectors",
        )),
    }
}
