//! Hierarchical clustering forest over bit vectors.
//!
//! Each tree recursively partitions its points around `branching` pivots chosen
//! among the points themselves (no means exist in Hamming space), assigning each
//! point to the nearest pivot in a single labelling pass. Trees differ only
//! through the randomness of the center chooser; every tree restarts from the
//! identity permutation.
//!
//! Search is best-bin-first across the whole forest: each tree is descended to a
//! leaf, siblings are queued by pivot distance, and a shared `checked` bitset makes
//! sure a point reached through several trees is scored once.
//!
//! # References
//!
//! - Muja & Lowe (2012): "Fast matching of binary features"

use std::collections::BinaryHeap;

use rand::rngs::StdRng;

use crate::ann::traits::{binary_pair, visit_budget, Branch, Checked, NnIndex, NodeId};
use crate::dataset::{Dataset, Matrix, Query};
use crate::distance::BitKernel;
use crate::error::{IndexError, Result};
use crate::params::{HierarchicalParams, SearchParams};
use crate::result_set::ResultSet;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<usize>),
    /// `(pivot point id, child)` pairs.
    Internal(Vec<(usize, NodeId)>),
}

/// Forest of hierarchical clustering trees (bit vectors).
#[derive(Debug, Clone)]
pub struct HierarchicalIndex {
    dist: BitKernel,
    params: HierarchicalParams,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    num_points: usize,
}

struct Search<'a> {
    data: &'a Matrix<u32>,
    query: &'a [u32],
    heap: BinaryHeap<Branch>,
    checked: Checked,
    checks: usize,
    max_checks: usize,
}

impl HierarchicalIndex {
    pub(crate) fn new(dist: BitKernel, params: HierarchicalParams) -> Self {
        Self {
            dist,
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

    fn compute_clustering(&mut self, data: &Matrix<u32>, ids: &mut [usize], rng: &mut StdRng) -> NodeId {
        let branching = self.params.branching;
        if ids.len() < self.params.leaf_max_size {
            return self.push(Node::Leaf(ids.to_vec()));
        }

        let dist = self.dist;
        let centers = self.params.centers_init.choose(
            branching,
            ids,
            |a, b| f64::from(dist(data.row(a), data.row(b))),
            rng,
        );
        if centers.len() < branching {
            return self.push(Node::Leaf(ids.to_vec()));
        }

        let labels: Vec<usize> = ids
            .iter()
            .map(|&id| {
                let point = data.row(id);
                centers
                    .iter()
                    .enumerate()
                    .map(|(c, &center)| (c, dist(point, data.row(center))))
                    .fold((0, u32::MAX), |best, cur| if cur.1 < best.1 { cur } else { best })
                    .0
            })
            .collect();

        let mut counts = vec![0usize; branching];
        for &label in &labels {
            counts[label] += 1;
        }
        // No progress possible; recursing would loop forever.
        if counts.iter().any(|&c| c == ids.len()) {
            return self.push(Node::Leaf(ids.to_vec()));
        }

        let mut grouped = Vec::with_capacity(ids.len());
        for c in 0..branching {
            grouped.extend(
                ids.iter()
                    .zip(&labels)
                    .filter(|&(_, &l)| l == c)
                    .map(|(&id, _)| id),
            );
        }
        ids.copy_from_slice(&grouped);

        let mut children = Vec::with_capacity(branching);
        let mut start = 0;
        for (c, &pivot) in centers.iter().enumerate() {
            let end = start + counts[c];
            let child = self.compute_clustering(data, &mut ids[start..end], rng);
            children.push((pivot, child));
            start = end;
        }
        self.push(Node::Internal(children))
    }

    fn find_nn(&self, s: &mut Search<'_>, result: &mut dyn ResultSet, start: NodeId) {
        let mut node = start;
        loop {
            match &self.nodes[node as usize] {
                Node::Leaf(points) => {
                    if s.checks >= s.max_checks && result.is_full() {
                        return;
                    }
                    for &id in points {
                        if !s.checked.insert(id) {
                            continue;
                        }
                        result.add_point(f64::from((self.dist)(s.query, s.data.row(id))), id);
                        s.checks += 1;
                    }
                    return;
                }
                Node::Internal(children) => {
                    let domain: Vec<u32> = children
                        .iter()
                        .map(|&(pivot, _)| (self.dist)(s.query, s.data.row(pivot)))
                        .collect();
                    let best = domain
                        .iter()
                        .enumerate()
                        .fold(0, |best, (i, &d)| if d < domain[best] { i } else { best });
                    for (i, &(_, child)) in children.iter().enumerate() {
                        if i != best {
                            s.heap.push(Branch {
                                node: child,
                                mindist: f64::from(domain[i]),
                            });
                        }
                    }
                    node = children[best].1;
                }
            }
        }
    }
}

impl NnIndex for HierarchicalIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        let data = data.as_binary().ok_or_else(|| {
            IndexError::unsupported("hierarchical clustering indexes bit vectors only")
        })?;
        if self.params.branching < 2 {
            return Err(IndexError::config("branching factor must be at least 2"));
        }

        self.nodes.clear();
        self.roots.clear();
        self.num_points = data.rows();
        let mut ids: Vec<usize> = Vec::with_capacity(data.rows());
        for _ in 0..self.params.trees {
            ids.clear();
            ids.extend(0..data.rows());
            let root = self.compute_clustering(data, &mut ids, rng);
            self.roots.push(root);
        }

        log::debug!(
            "hierarchical clustering: {} trees, {} nodes over {} points",
            self.roots.len(),
            self.nodes.len(),
            self.num_points
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
        let (data, query) = binary_pair(data, query)?;
        let mut s = Search {
            data,
            query,
            heap: BinaryHeap::new(),
            checked: Checked::new(self.num_points),
            checks: 0,
            max_checks: visit_budget(params)?.unwrap_or(usize::MAX),
        };

        for &root in &self.roots {
            self.find_nn(&mut s, result, root);
        }
        while let Some(branch) = s.heap.pop() {
            if s.checks >= s.max_checks && result.is_full() {
                break;
            }
            self.find_nn(&mut s, result, branch.node);
        }
        Ok(())
    }

    fn used_memory(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| {
                std::mem::size_of::<Node>()
                    + match n {
                        Node::Leaf(points) => points.len() * std::mem::size_of::<usize>(),
                        Node::Internal(children) => {
                            children.len() * std::mem::size_of::<(usize, NodeId)>()
                        }
                    }
            })
            .sum()
    }
}
