//! Lloyd's k-means over a subset of dataset rows.
//!
//! Used by the k-means tree to split one node's points into `branching`
//! clusters. The input seeds come from a [`CentersInit`](super::CentersInit)
//! chooser and must be distinct points of the subset, which guarantees there are
//! at least as many points as clusters.

use crate::dataset::Matrix;
use crate::distance::DenseKernel;

/// Round limit when no iteration count is configured. Steals from
/// `fill_empty` can keep a degenerate subset from ever settling.
pub(crate) const MAX_UNBOUNDED_ROUNDS: usize = 1000;

/// Result of clustering one node.
#[derive(Debug, Clone)]
pub(crate) struct Clustering {
    /// Cluster means (`k` rows of the data dimension).
    pub centers: Vec<Vec<f64>>,
    /// Cluster of each id, aligned with the `ids` slice that was clustered.
    pub assignment: Vec<usize>,
    /// Members per cluster; never zero.
    pub counts: Vec<usize>,
    /// Largest member distance to its center, per cluster.
    pub radii: Vec<f64>,
    /// Mean member distance to its center, per cluster.
    pub variances: Vec<f64>,
    /// Lloyd rounds actually run.
    pub rounds: usize,
}

/// Cluster `ids` around `seeds` for at most `iterations` rounds.
///
/// `None` runs until stable, bounded by [`MAX_UNBOUNDED_ROUNDS`].
pub(crate) fn lloyd(
    data: &Matrix<f64>,
    ids: &[usize],
    seeds: &[usize],
    iterations: Option<usize>,
    dist: DenseKernel,
) -> Clustering {
    let k = seeds.len();
    let mut centers: Vec<Vec<f64>> = seeds.iter().map(|&s| data.row(s).to_vec()).collect();
    let mut assignment = vec![0usize; ids.len()];
    let mut counts = vec![0usize; k];

    for (slot, &id) in assignment.iter_mut().zip(ids) {
        let c = nearest(data.row(id), &centers, dist);
        *slot = c;
        counts[c] += 1;
    }
    fill_empty(&mut assignment, &mut counts);

    let max_rounds = iterations.unwrap_or(MAX_UNBOUNDED_ROUNDS);
    let mut rounds = 0;
    let mut converged = false;
    while !converged && rounds < max_rounds {
        converged = true;
        rounds += 1;

        recompute_means(data, ids, &assignment, &counts, &mut centers);

        for (slot, &id) in assignment.iter_mut().zip(ids) {
            let c = nearest(data.row(id), &centers, dist);
            if c != *slot {
                counts[*slot] -= 1;
                counts[c] += 1;
                *slot = c;
                converged = false;
            }
        }
        if fill_empty(&mut assignment, &mut counts) {
            converged = false;
        }
    }

    recompute_means(data, ids, &assignment, &counts, &mut centers);

    let mut radii = vec![0.0f64; k];
    let mut variances = vec![0.0f64; k];
    for (&c, &id) in assignment.iter().zip(ids) {
        let d = dist(data.row(id), &centers[c]);
        radii[c] = radii[c].max(d);
        variances[c] += d;
    }
    for (v, &n) in variances.iter_mut().zip(&counts) {
        *v /= n as f64;
    }

    Clustering {
        centers,
        assignment,
        counts,
        radii,
        variances,
        rounds,
    }
}

/// Index of the closest center; ties go to the lower index.
fn nearest(point: &[f64], centers: &[Vec<f64>], dist: DenseKernel) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, c) in centers.iter().enumerate() {
        let d = dist(point, c);
        if d < best_dist {
            best = j;
            best_dist = d;
        }
    }
    best
}

fn recompute_means(
    data: &Matrix<f64>,
    ids: &[usize],
    assignment: &[usize],
    counts: &[usize],
    centers: &mut [Vec<f64>],
) {
    for c in centers.iter_mut() {
        c.fill(0.0);
    }
    for (&c, &id) in assignment.iter().zip(ids) {
        for (acc, &v) in centers[c].iter_mut().zip(data.row(id)) {
            *acc += v;
        }
    }
    for (c, &n) in centers.iter_mut().zip(counts) {
        if n > 0 {
            let inv = 1.0 / n as f64;
            for v in c.iter_mut() {
                *v *= inv;
            }
        }
    }
}

/// Give every empty cluster one point taken from the next cluster (cyclically)
/// that has more than one member. Returns whether anything moved.
fn fill_empty(assignment: &mut [usize], counts: &mut [usize]) -> bool {
    let k = counts.len();
    let mut moved = false;
    for i in 0..k {
        if counts[i] != 0 {
            continue;
        }
        let Some(donor) = (1..k).map(|step| (i + step) % k).find(|&j| counts[j] > 1) else {
            // Fewer points than clusters; cannot happen with distinct seeds.
            break;
        };
        if let Some(slot) = assignment.iter_mut().find(|slot| **slot == donor) {
            *slot = i;
            counts[donor] -= 1;
            counts[i] += 1;
            moved = true;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::euclidean_squared;
    use proptest::prelude::*;

    fn matrix(points: &[[f64; 2]]) -> Matrix<f64> {
        Matrix::from_rows(points).unwrap()
    }

    #[test]
    fn separates_two_blobs() {
        let data = matrix(&[
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ]);
        let ids: Vec<usize> = (0..6).collect();
        let c = lloyd(&data, &ids, &[0, 1], Some(10), euclidean_squared);

        assert_eq!(c.assignment[0], c.assignment[1]);
        assert_eq!(c.assignment[0], c.assignment[2]);
        assert_eq!(c.assignment[3], c.assignment[4]);
        assert_ne!(c.assignment[0], c.assignment[3]);
        assert_eq!(c.counts, vec![3, 3]);
        assert!(c.radii.iter().all(|&r| r < 0.1));
    }

    #[test]
    fn empty_cluster_steals_a_point() {
        let mut assignment = vec![0, 0, 0, 2];
        let mut counts = vec![3, 0, 1];
        assert!(fill_empty(&mut assignment, &mut counts));
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(assignment.iter().filter(|&&c| c == 1).count(), 1);
    }

    #[test]
    fn zero_iterations_keeps_seed_assignment() {
        let data = matrix(&[[0.0, 0.0], [1.0, 0.0], [5.0, 0.0], [6.0, 0.0]]);
        let ids: Vec<usize> = (0..4).collect();
        let c = lloyd(&data, &ids, &[0, 3], Some(0), euclidean_squared);
        assert_eq!(c.rounds, 0);
        assert_eq!(c.assignment, vec![0, 0, 1, 1]);
        assert_eq!(c.centers[0], vec![0.5, 0.0]);
    }

    #[test]
    fn unbounded_rounds_are_capped() {
        let raw: Vec<f64> = (0..400).map(|i| f64::from((i * 37) % 101)).collect();
        let data = Matrix::new(raw, 2).unwrap();
        let ids: Vec<usize> = (0..200).collect();
        let seeds = [0, 1, 2, 3, 5];

        let open = lloyd(&data, &ids, &seeds, None, euclidean_squared);
        assert!(open.rounds >= 1 && open.rounds <= MAX_UNBOUNDED_ROUNDS);
        let capped = lloyd(&data, &ids, &seeds, Some(MAX_UNBOUNDED_ROUNDS), euclidean_squared);
        assert_eq!(open.rounds, capped.rounds);
        assert_eq!(open.assignment, capped.assignment);
    }

    proptest! {
        #[test]
        fn prop_clusters_are_never_empty(
            raw in proptest::collection::vec(-5.0f64..5.0, 16..128),
            k in 2usize..6,
            rounds in proptest::option::of(0usize..8),
        ) {
            let n = raw.len() / 2;
            let data = Matrix::new(raw[..n * 2].to_vec(), 2).unwrap();
            let ids: Vec<usize> = (0..n).collect();
            // Seeds must be distinct points.
            let mut seeds: Vec<usize> = Vec::new();
            for &i in &ids {
                if seeds.len() == k {
                    break;
                }
                if seeds.iter().all(|&s| data.row(s) != data.row(i)) {
                    seeds.push(i);
                }
            }
            prop_assume!(seeds.len() == k);

            let c = lloyd(&data, &ids, &seeds, rounds, euclidean_squared);
            prop_assert!(c.counts.iter().all(|&n| n > 0));
            prop_assert_eq!(c.counts.iter().sum::<usize>(), n);
            for (j, &count) in c.counts.iter().enumerate() {
                prop_assert_eq!(c.assignment.iter().filter(|&&a| a == j).count(), count);
            }
        }
    }
}
