//! Hierarchical k-means tree.
//!
//! Recursive top-down clustering: every internal node splits its points into
//! `branching` clusters with Lloyd's algorithm and records, per child, the pivot
//! (cluster mean), radius (largest member distance) and variance (mean member
//! distance). Nodes with fewer than `branching` points, or whose points hold fewer
//! than `branching` distinct values, become leaves.
//!
//! Approximate search is best-bin-first along one path at a time: the closest
//! child is descended immediately and every sibling is queued with key
//! `distance - cb_index * variance`, which favors wide clusters whose boundary may
//! still hide a closer point. Exact search visits children in pivot order.
//!
//! Both searches skip a node outright with the ball-exclusion test: with `b` the
//! query-to-pivot distance, `r` the node radius and `w` the current worst accepted
//! distance, nothing inside can beat `w` when `b - r - w > 0` and
//! `(b - r - w)^2 > 4rw`.
//!
//! # References
//!
//! - Fukunaga & Narendra (1975): "A branch and bound algorithm for computing
//!   k-nearest neighbors"
//! - Muja & Lowe (2009): "Fast approximate nearest neighbors with automatic algorithm
//!   configuration"

use std::collections::BinaryHeap;

use rand::rngs::StdRng;

use crate::ann::traits::{dense_pair, visit_budget, Branch, NnIndex, NodeId};
use crate::dataset::{Dataset, Matrix, Query};
use crate::distance::DenseKernel;
use crate::error::{IndexError, Result};
use crate::params::{KMeansParams, SearchParams};
use crate::partitioning::kmeans::lloyd;
use crate::result_set::ResultSet;

#[derive(Debug, Clone)]
enum Contents {
    Leaf(Vec<usize>),
    Internal(Vec<NodeId>),
}

#[derive(Debug, Clone)]
struct Node {
    pivot: Vec<f64>,
    radius: f64,
    variance: f64,
    contents: Contents,
}

/// Hierarchical k-means tree index (dense vectors).
#[derive(Debug, Clone)]
pub struct KMeansTreeIndex {
    dist: DenseKernel,
    params: KMeansParams,
    nodes: Vec<Node>,
}

struct Search<'a> {
    data: &'a Matrix<f64>,
    query: &'a [f64],
    heap: BinaryHeap<Branch>,
    checks: usize,
    max_checks: usize,
    cb_index: f64,
}

/// Ball-exclusion test: `true` if the node cannot hold anything closer than `worst`.
#[inline]
pub(crate) fn ball_excluded(pivot_dist: f64, radius: f64, worst: f64) -> bool {
    let val = pivot_dist - radius - worst;
    val > 0.0 && val * val - 4.0 * radius * worst > 0.0
}

impl KMeansTreeIndex {
    pub(crate) fn new(dist: DenseKernel, params: KMeansParams) -> Self {
        Self {
            dist,
            params,
            nodes: Vec::new(),
        }
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    /// Number of tree nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    fn compute_clustering(&mut self, data: &Matrix<f64>, node: NodeId, ids: &mut [usize], rng: &mut StdRng) {
        let branching = self.params.branching;
        if ids.len() < branching {
            self.nodes[node as usize].contents = Contents::Leaf(ids.to_vec());
            return;
        }

        let dist = self.dist;
        let seeds = self
            .params
            .centers_init
            .choose(branching, ids, |a, b| dist(data.row(a), data.row(b)), rng);
        if seeds.len() < branching {
            self.nodes[node as usize].contents = Contents::Leaf(ids.to_vec());
            return;
        }

        let clustering = lloyd(data, ids, &seeds, self.params.iterations, dist);

        // Group the permutation slice by cluster.
        let mut grouped = Vec::with_capacity(ids.len());
        for c in 0..branching {
            grouped.extend(
                ids.iter()
                    .zip(&clustering.assignment)
                    .filter(|&(_, &a)| a == c)
                    .map(|(&id, _)| id),
            );
        }
        ids.copy_from_slice(&grouped);

        let mut children = Vec::with_capacity(branching);
        for c in 0..branching {
            children.push(self.push(Node {
                pivot: clustering.centers[c].clone(),
                radius: clustering.radii[c],
                variance: clustering.variances[c],
                contents: Contents::Leaf(Vec::new()),
            }));
        }
        self.nodes[node as usize].contents = Contents::Internal(children.clone());

        let mut start = 0;
        for (c, &child) in children.iter().enumerate() {
            let end = start + clustering.counts[c];
            self.compute_clustering(data, child, &mut ids[start..end], rng);
            start = end;
        }
    }

    /// Descend from `start`, queueing siblings, until a leaf is scored or pruned.
    fn find_nn(&self, s: &mut Search<'_>, result: &mut dyn ResultSet, start: NodeId) {
        let mut node = &self.nodes[start as usize];
        loop {
            let b = (self.dist)(s.query, &node.pivot);
            if ball_excluded(b, node.radius, result.worst_distance()) {
                return;
            }
            match &node.contents {
                Contents::Leaf(points) => {
                    if s.checks >= s.max_checks && result.is_full() {
                        return;
                    }
                    for &id in points {
                        result.add_point((self.dist)(s.query, s.data.row(id)), id);
                        s.checks += 1;
                    }
                    return;
                }
                Contents::Internal(children) => {
                    let domain: Vec<f64> = children
                        .iter()
                        .map(|&c| (self.dist)(s.query, &self.nodes[c as usize].pivot))
                        .collect();
                    let best = domain
                        .iter()
                        .enumerate()
                        .fold(0, |best, (i, &d)| if d < domain[best] { i } else { best });
                    for (i, &child) in children.iter().enumerate() {
                        if i != best {
                            let variance = self.nodes[child as usize].variance;
                            s.heap.push(Branch {
                                node: child,
                                mindist: domain[i] - s.cb_index * variance,
                            });
                        }
                    }
                    node = &self.nodes[children[best] as usize];
                }
            }
        }
    }

    fn find_exact(&self, data: &Matrix<f64>, query: &[f64], result: &mut dyn ResultSet, node: NodeId) {
        let node = &self.nodes[node as usize];
        let b = (self.dist)(query, &node.pivot);
        if ball_excluded(b, node.radius, result.worst_distance()) {
            return;
        }
        match &node.contents {
            Contents::Leaf(points) => {
                for &id in points {
                    result.add_point((self.dist)(query, data.row(id)), id);
                }
            }
            Contents::Internal(children) => {
                let mut order: Vec<(f64, NodeId)> = children
                    .iter()
                    .map(|&c| ((self.dist)(query, &self.nodes[c as usize].pivot), c))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (_, child) in order {
                    self.find_exact(data, query, result, child);
                }
            }
        }
    }
}

impl NnIndex for KMeansTreeIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        let data = data
            .as_dense()
            .ok_or_else(|| IndexError::unsupported("k-means trees index dense vectors only"))?;
        if self.params.branching < 2 {
            return Err(IndexError::config("branching factor must be at least 2"));
        }

        let n = data.rows();
        let mut mean = vec![0.0f64; data.cols()];
        for row in data.iter_rows() {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f64);
        let (radius, total) = data.iter_rows().fold((0.0f64, 0.0f64), |(r, t), row| {
            let d = (self.dist)(&mean, row);
            (r.max(d), t + d)
        });

        self.nodes.clear();
        let root = self.push(Node {
            pivot: mean,
            radius,
            variance: total / n as f64,
            contents: Contents::Leaf(Vec::new()),
        });
        let mut ids: Vec<usize> = (0..n).collect();
        self.compute_clustering(data, root, &mut ids, rng);

        log::debug!(
            "k-means tree: branching {}, {} nodes over {} points",
            self.params.branching,
            self.nodes.len(),
            n
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
        if self.nodes.is_empty() {
            return Ok(());
        }
        let Some(max_checks) = visit_budget(params)? else {
            self.find_exact(data, query, result, 0);
            return Ok(());
        };

        let mut s = Search {
            data,
            query,
            heap: BinaryHeap::new(),
            checks: 0,
            max_checks,
            cb_index: f64::from(params.cb_index.unwrap_or(self.params.cb_index)),
        };
        self.find_nn(&mut s, result, 0);
        while let Some(branch) = s.heap.pop() {
            if s.checks >= s.max_checks && result.is_full() {
                break;
            }
            self.find_nn(&mut s, result, branch.node);
        }
        Ok(())
    }

    fn find_nearest(&self, data: &Dataset, result: &mut dyn ResultSet, query: Query<'_>) -> Result<()> {
        let (data, query) = dense_pair(data, query)?;
        if !self.nodes.is_empty() {
            self.find_exact(data, query, result, 0);
        }
        Ok(())
    }

    fn used_memory(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| {
                std::mem::size_of::<Node>()
                    + n.pivot.len() * std::mem::size_of::<f64>()
                    + match &n.contents {
                        Contents::Leaf(points) => points.len() * std::mem::size_of::<usize>(),
                        Contents::Internal(children) => children.len() * std::mem::size_of::<NodeId>(),
                    }
            })
            .sum()
    }
}
