//! Randomized KD-forest.
//!
//! Several KD-trees over the same points, each built from an independently
//! shuffled permutation and cutting at a dimension drawn at random among the
//! highest-variance ones. The trees disagree about where the boundaries are, so a
//! query that lands near a cut in one tree is likely well inside a cell of another.
//!
//! **Technical Name**: randomized k-d trees with best-bin-first search
//!
//! Algorithm:
//! - Split: sample up to [`SAMPLE_MEAN`] points, compute per-dimension mean and
//!   variance, pick one of the top [`RAND_DIM`] variance dimensions at random, cut
//!   at the sampled mean. A degenerate cut (everything on one side) falls back to
//!   the middle of the permutation.
//! - Search: descend every tree once, queueing each skipped sibling with its
//!   lower-bound distance. Then pop branches in ascending order until the `checks`
//!   budget is spent and the result set is full. A point reached from several
//!   trees is scored once.
//! - `Checks::Unlimited`: a full traversal of the first tree with exact
//!   per-dimension bounds.
//!
//! # References
//!
//! - Silpa-Anan & Hartley (2008): "Optimised KD-trees for fast image descriptor matching"
//! - Muja & Lowe (2009): "Fast approximate nearest neighbors with automatic algorithm
//!   configuration"

use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::ann::traits::{cut_position, dense_pair, plane_split, visit_budget, Branch, Checked, NnIndex, NodeId};
use crate::dataset::{Dataset, Matrix, Query};
use crate::distance::{AxisKernel, DenseKernel};
use crate::error::{IndexError, Result};
use crate::params::{KdForestParams, SearchParams};
use crate::result_set::ResultSet;

/// Points sampled to estimate the split mean and variance.
pub const SAMPLE_MEAN: usize = 100;
/// Number of top-variance dimensions the cut dimension is drawn from.
pub const RAND_DIM: usize = 5;

#[derive(Debug, Clone)]
enum Node {
    Leaf { id: usize },
    Split {
        dim: usize,
        value: f64,
        left: NodeId,
        right: NodeId,
    },
}

/// Randomized KD-forest index.
#[derive(Debug, Clone)]
pub struct KdForestIndex {
    dist: DenseKernel,
    axis: AxisKernel,
    params: KdForestParams,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    num_points: usize,
}

/// Mutable state of one approximate query.
struct Search<'a> {
    data: &'a Matrix<f64>,
    query: &'a [f64],
    heap: BinaryHeap<Branch>,
    checked: Checked,
    checks: usize,
    max_checks: usize,
    eps_error: f64,
}

impl KdForestIndex {
    pub(crate) fn new(dist: DenseKernel, axis: AxisKernel, params: KdForestParams) -> Self {
        Self {
            dist,
            axis,
            params,
            nodes: Vec::new(),
            roots: Vec::new(),
            num_points: 0,
        }
    }

    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    fn divide_tree(&mut self, data: &Matrix<f64>, ids: &mut [usize], rng: &mut StdRng) -> NodeId {
        if ids.len() == 1 {
            return self.push(Node::Leaf { id: ids[0] });
        }
        let (dim, value, cut) = mean_split(data, ids, rng);
        let (left_ids, right_ids) = ids.split_at_mut(cut);
        let left = self.divide_tree(data, left_ids, rng);
        let right = self.divide_tree(data, right_ids, rng);
        self.push(Node::Split {
            dim,
            value,
            left,
            right,
        })
    }

    fn search_level(&self, s: &mut Search<'_>, result: &mut dyn ResultSet, start: NodeId, mindist: f64) {
        let mut node = start;
        loop {
            if result.worst_distance() < mindist {
                return;
            }
            match self.nodes[node as usize] {
                Node::Leaf { id } => {
                    if s.checks >= s.max_checks && result.is_full() {
                        return;
                    }
                    if !s.checked.insert(id) {
                        return;
                    }
                    s.checks += 1;
                    result.add_point((self.dist)(s.query, s.data.row(id)), id);
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let val = s.query[dim];
                    let (best, other) = if val < value { (left, right) } else { (right, left) };
                    let bound = mindist + (self.axis)(val, value);
                    if bound * s.eps_error < result.worst_distance() || !result.is_full() {
                        s.heap.push(Branch {
                            node: other,
                            mindist: bound,
                        });
                    }
                    node = best;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn search_exact(
        &self,
        data: &Matrix<f64>,
        query: &[f64],
        result: &mut dyn ResultSet,
        node: NodeId,
        mindist: f64,
        dists: &mut [f64],
        eps_error: f64,
    ) {
        match self.nodes[node as usize] {
            Node::Leaf { id } => {
                result.add_point((self.dist)(query, data.row(id)), id);
            }
            Node::Split {
                dim,
                value,
                left,
                right,
            } => {
                let val = query[dim];
                let (best, other) = if val < value { (left, right) } else { (right, left) };
                self.search_exact(data, query, result, best, mindist, dists, eps_error);

                let saved = dists[dim];
                let contribution = saved.max((self.axis)(val, value));
                let bound = mindist - saved + contribution;
                if bound * eps_error <= result.worst_distance() {
                    dists[dim] = contribution;
                    self.search_exact(data, query, result, other, bound, dists, eps_error);
                    dists[dim] = saved;
                }
            }
        }
    }
}

impl NnIndex for KdForestIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        let data = data
            .as_dense()
            .ok_or_else(|| IndexError::unsupported("KD-trees index dense vectors only"))?;
        self.num_points = data.rows();
        self.nodes = Vec::with_capacity(self.params.trees * (2 * data.rows()).saturating_sub(1));
        self.roots.clear();

        let mut ids: Vec<usize> = (0..data.rows()).collect();
        for _ in 0..self.params.trees {
            ids.shuffle(rng);
            let root = self.divide_tree(data, &mut ids, rng);
            self.roots.push(root);
        }
        log::debug!(
            "kd-forest: {} trees over {} points, {} nodes",
            self.roots.len(),
            self.num_points,
            self.nodes.len()
        );
        Ok(())
    }

    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        params: &SearchParams,
    ) -> Result<()> {
        let (data, query) = dense_pair(data, query)?;
        let eps_error = 1.0 + f64::from(params.eps);

        let Some(max_checks) = visit_budget(params)? else {
            if self.roots.len() > 1 {
                log::warn!(
                    "exact search on a {}-tree kd-forest only traverses the first tree",
                    self.roots.len()
                );
            }
            if let Some(&root) = self.roots.first() {
                let mut dists = vec![0.0; data.cols()];
                self.search_exact(data, query, result, root, 0.0, &mut dists, eps_error);
            }
            return Ok(());
        };

        let mut s = Search {
            data,
            query,
            heap: BinaryHeap::new(),
            checked: Checked::new(self.num_points),
            checks: 0,
            max_checks,
            eps_error,
        };
        for &root in &self.roots {
            self.search_level(&mut s, result, root, 0.0);
        }
        while let Some(branch) = s.heap.pop() {
            if s.checks >= s.max_checks && result.is_full() {
                break;
            }
            self.search_level(&mut s, result, branch.node, branch.mindist);
        }
        Ok(())
    }

    fn used_memory(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<Node>()
            + self.roots.len() * std::mem::size_of::<NodeId>()
    }
}

/// Pick the cut for `ids` (at least two points): `(dim, value, cut offset)`.
fn mean_split(data: &Matrix<f64>, ids: &mut [usize], rng: &mut StdRng) -> (usize, f64, usize) {
    let dims = data.cols();
    let sample = ids.len().min(SAMPLE_MEAN);

    let mut mean = vec![0.0f64; dims];
    for &id in &ids[..sample] {
        for (m, &v) in mean.iter_mut().zip(data.row(id)) {
            *m += v;
        }
    }
    let inv = 1.0 / sample as f64;
    mean.iter_mut().for_each(|m| *m *= inv);

    let mut var = vec![0.0f64; dims];
    for &id in &ids[..sample] {
        for ((acc, &m), &v) in var.iter_mut().zip(&mean).zip(data.row(id)) {
            let d = v - m;
            *acc += d * d;
        }
    }

    let dim = select_division(&var, rng);
    let value = mean[dim];

    let count = ids.len();
    let (lim1, lim2) = plane_split(ids, data, dim, value);
    let mut cut = cut_position(lim1, lim2, count);
    // Everything on one side: the remaining values are identical along `dim`.
    if lim1 == count || lim2 == 0 || cut == 0 || cut == count {
        cut = count / 2;
    }
    (dim, value, cut)
}

/// Random index among the `RAND_DIM` largest entries of `var`.
fn select_division(var: &[f64], rng: &mut StdRng) -> usize {
    let mut top: Vec<usize> = (0..var.len()).collect();
    top.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then(a.cmp(&b)));
    top.truncate(RAND_DIM);
    top[rng.random_range(0..top.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::result_set::KnnResultSet;
    use rand::SeedableRng;

    fn forest(trees: usize) -> KdForestIndex {
        let m = DistanceMetric::EuclideanSquared;
        KdForestIndex::new(
            m.dense_kernel().unwrap(),
            m.axis_kernel().unwrap(),
            KdForestParams { trees },
        )
    }

    fn grid(n: usize) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i % 17) as f64, (i * 5 % 23) as f64, (i % 3) as f64])
            .collect();
        Dataset::dense(&rows).unwrap()
    }

    #[test]
    fn each_tree_holds_every_point_once() {
        let data = grid(200);
        let mut index = forest(3);
        index.build_index(&data, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(index.tree_count(), 3);

        for &root in &index.roots {
            let mut seen = vec![0usize; 200];
            let mut stack = vec![root];
            while let Some(n) = stack.pop() {
                match index.nodes[n as usize] {
                    Node::Leaf { id } => seen[id] += 1,
                    Node::Split { left, right, .. } => {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
            assert!(seen.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn identical_points_still_split() {
        let rows = vec![vec![1.0, 1.0]; 9];
        let data = Dataset::dense(&rows).unwrap();
        let mut index = forest(1);
        index.build_index(&data, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(index.nodes.len(), 17);
    }

    #[test]
    fn zero_budget_still_fills_the_result_set() {
        let data = grid(300);
        let mut index = forest(4);
        index.build_index(&data, &mut StdRng::seed_from_u64(2)).unwrap();
        let mut result = KnnResultSet::new(5);
        index
            .find_neighbors(&data, &mut result, Query::Dense(&[3.0, 4.0, 1.0]), &SearchParams::with_checks(0))
            .unwrap();
        assert!(result.is_full());
    }

    #[test]
    fn select_division_stays_in_top_variances() {
        let var = [0.1, 9.0, 0.2, 8.0, 7.0, 0.3, 6.0, 5.0, 0.0];
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let d = select_division(&var, &mut rng);
            assert!([1, 3, 4, 6, 7].contains(&d));
        }
    }
}
