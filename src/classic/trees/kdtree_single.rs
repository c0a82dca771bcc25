//! Single KD-tree with bounding-box incremental search.
//!
//! Build splits the tight bounding box of each node at the midpoint of its widest
//! dimension. Internal nodes record the *two* facing bounds of their children along
//! the cut dimension (`low` = max of the left child, `high` = min of the right
//! child), so the gap between them counts toward the pruning bound.
//!
//! Search is depth-first. The caller keeps a per-dimension lower-bound vector; at
//! each split only the cut dimension's contribution changes, so updating the
//! running bound is O(1). The far child is visited only when
//! `bound * (1 + eps) <= worst_distance()`, which makes `eps = 0` exact.
//!
//! # References
//!
//! - Friedman, Bentley & Finkel (1977): "An algorithm for finding best matches in
//!   logarithmic expected time"
//! - Arya & Mount (1993): "Algorithms for fast vector quantization"

use rand::rngs::StdRng;

use crate::ann::traits::{cut_position, dense_pair, plane_split, NnIndex, NodeId};
use crate::dataset::{Dataset, Matrix, Query};
use crate::distance::{AxisKernel, DenseKernel};
use crate::error::{IndexError, Result};
use crate::params::{KdTreeSingleParams, SearchParams};
use crate::result_set::ResultSet;

/// Per-dimension `(min, max)`.
type BoundingBox = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
enum Node {
    /// Points `ids[lo..hi]`.
    Leaf { lo: usize, hi: usize },
    Split {
        dim: usize,
        low: f64,
        high: f64,
        left: NodeId,
        right: NodeId,
    },
}

/// Single KD-tree index.
#[derive(Debug, Clone)]
pub struct KdTreeSingleIndex {
    dist: DenseKernel,
    axis: AxisKernel,
    params: KdTreeSingleParams,
    ids: Vec<usize>,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    root_bbox: BoundingBox,
}

impl KdTreeSingleIndex {
    pub(crate) fn new(dist: DenseKernel, axis: AxisKernel, params: KdTreeSingleParams) -> Self {
        Self {
            dist,
            axis,
            params,
            ids: Vec::new(),
            nodes: Vec::new(),
            root: None,
            root_bbox: Vec::new(),
        }
    }

    /// Number of tree nodes (leaves and splits).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn divide_tree(&mut self, data: &Matrix<f64>, lo: usize, hi: usize) -> (NodeId, BoundingBox) {
        let bbox = bounding_box(data, &self.ids[lo..hi]);
        let count = hi - lo;

        let (dim, span) = bbox
            .iter()
            .enumerate()
            .map(|(d, &(min, max))| (d, max - min))
            .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        // Identical points cannot be separated; keep them in one leaf.
        if count <= self.params.max_leaf_size || span <= 0.0 {
            return (self.push(Node::Leaf { lo, hi }), bbox);
        }

        let value = (bbox[dim].0 + bbox[dim].1) / 2.0;
        let (lim1, lim2) = plane_split(&mut self.ids[lo..hi], data, dim, value);
        let cut = cut_position(lim1, lim2, count).clamp(1, count - 1);

        let (left, left_box) = self.divide_tree(data, lo, lo + cut);
        let (right, right_box) = self.divide_tree(data, lo + cut, hi);
        let node = Node::Split {
            dim,
            low: left_box[dim].1,
            high: right_box[dim].0,
            left,
            right,
        };
        (self.push(node), bbox)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    #[allow(clippy::too_many_arguments)]
    fn search_level(
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
            Node::Leaf { lo, hi } => {
                let worst = result.worst_distance();
                for &id in &self.ids[lo..hi] {
                    let d = (self.dist)(query, data.row(id));
                    if d < worst {
                        result.add_point(d, id);
                    }
                }
            }
            Node::Split {
                dim,
                low,
                high,
                left,
                right,
            } => {
                let val = query[dim];
                let (best, other, cut_dist) = if (val - low) + (val - high) < 0.0 {
                    (left, right, (self.axis)(val, high))
                } else {
                    (right, left, (self.axis)(val, low))
                };

                self.search_level(data, query, result, best, mindist, dists, eps_error);

                let saved = dists[dim];
                let bound = mindist - saved + cut_dist;
                dists[dim] = cut_dist;
                if bound * eps_error <= result.worst_distance() {
                    self.search_level(data, query, result, other, bound, dists, eps_error);
                }
                dists[dim] = saved;
            }
        }
    }
}

impl NnIndex for KdTreeSingleIndex {
    fn build_index(&mut self, data: &Dataset, _rng: &mut StdRng) -> Result<()> {
        let data = data
            .as_dense()
            .ok_or_else(|| IndexError::unsupported("KD-trees index dense vectors only"))?;
        self.ids = (0..data.rows()).collect();
        self.nodes.clear();
        let (root, bbox) = self.divide_tree(data, 0, data.rows());
        self.root = Some(root);
        self.root_bbox = bbox;
        log::debug!(
            "kd-tree (single): {} points, {} nodes",
            data.rows(),
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
        let Some(root) = self.root else {
            return Ok(());
        };

        let mut dists: Vec<f64> = query
            .iter()
            .zip(&self.root_bbox)
            .map(|(&q, &(min, max))| {
                if q < min {
                    (self.axis)(q, min)
                } else if q > max {
                    (self.axis)(q, max)
                } else {
                    0.0
                }
            })
            .collect();
        let mindist = dists.iter().sum();
        let eps_error = 1.0 + f64::from(params.eps);
        self.search_level(data, query, result, root, mindist, &mut dists, eps_error);
        Ok(())
    }

    fn used_memory(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<Node>()
            + self.ids.len() * std::mem::size_of::<usize>()
            + self.root_bbox.len() * std::mem::size_of::<(f64, f64)>()
    }
}

fn bounding_box(data: &Matrix<f64>, ids: &[usize]) -> BoundingBox {
    let mut bbox = vec![(f64::INFINITY, f64::NEG_INFINITY); data.cols()];
    for &id in ids {
        for ((min, max), &v) in bbox.iter_mut().zip(data.row(id)) {
            *min = min.min(v);
            *max = max.max(v);
        }
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::result_set::KnnResultSet;
    use rand::SeedableRng;

    fn index(max_leaf_size: usize) -> KdTreeSingleIndex {
        let m = DistanceMetric::EuclideanSquared;
        KdTreeSingleIndex::new(
            m.dense_kernel().unwrap(),
            m.axis_kernel().unwrap(),
            KdTreeSingleParams { max_leaf_size },
        )
    }

    #[test]
    fn every_point_lands_in_exactly_one_leaf() {
        let rows: Vec<Vec<f64>> = (0..57)
            .map(|i| vec![(i * 7 % 13) as f64, (i * 3 % 11) as f64])
            .collect();
        let data = Dataset::dense(&rows).unwrap();
        let mut tree = index(3);
        tree.build_index(&data, &mut StdRng::seed_from_u64(0)).unwrap();

        let mut seen = vec![0usize; rows.len()];
        for node in &tree.nodes {
            if let Node::Leaf { lo, hi } = *node {
                assert!(hi > lo);
                for &id in &tree.ids[lo..hi] {
                    seen[id] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn duplicate_points_form_one_leaf() {
        let rows = vec![vec![2.0, 2.0]; 40];
        let data = Dataset::dense(&rows).unwrap();
        let mut tree = index(4);
        tree.build_index(&data, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(tree.node_count(), 1);

        let mut result = KnnResultSet::new(3);
        tree.find_neighbors(&data, &mut result, Query::Dense(&[0.0, 0.0]), &SearchParams::exact())
            .unwrap();
        let ids: Vec<usize> = result.neighbors().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn query_outside_the_box_is_exact() {
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![(i % 10) as f64, (i / 10) as f64]).collect();
        let data = Dataset::dense(&rows).unwrap();
        let mut tree = index(2);
        tree.build_index(&data, &mut StdRng::seed_from_u64(0)).unwrap();

        let mut result = KnnResultSet::new(1);
        tree.find_neighbors(&data, &mut result, Query::Dense(&[20.0, -5.0]), &SearchParams::exact())
            .unwrap();
        assert_eq!(result.neighbors()[0].index, 9);
        assert_eq!(result.neighbors()[0].distance, 11.0 * 11.0 + 25.0);
    }
}
