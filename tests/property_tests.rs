//! Property-based tests for flannel.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Result sets keep the best candidates in order, ties to the smaller id
//! - The three-way partition separates <, == and > the cut value
//! - Exact searches agree with a brute-force oracle
//! - More checks never lower recall for a fixed index

use flannel::ann::plane_split;
use flannel::benchmark::{compute_ground_truth, mean_recall};
use flannel::{
    build, Dataset, DistanceMetric, IndexParams, KMeansParams, KdForestParams, KdTreeSingleParams,
    KnnRadiusResultSet, KnnResultSet, Matrix, Query, RadiusResultSet, ResultSet, SearchParams,
};
use proptest::prelude::*;

/// `(distance, id)` pairs sorted the way result sets order them.
fn oracle(candidates: &[(f64, usize)], k: usize, radius: f64) -> Vec<(f64, usize)> {
    let mut sorted: Vec<(f64, usize)> = candidates
        .iter()
        .copied()
        .filter(|&(d, _)| d < radius)
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    sorted.dedup();
    sorted.truncate(k);
    sorted
}

fn brute_force(data: &Matrix<f64>, query: &[f64], k: usize) -> Vec<(f64, usize)> {
    let all: Vec<(f64, usize)> = data
        .iter_rows()
        .enumerate()
        .map(|(i, r)| (flannel::distance::euclidean_squared(query, r), i))
        .collect();
    oracle(&all, k, f64::INFINITY)
}

prop_compose! {
    fn arb_points(max_n: usize, dim: usize)
        (rows in prop::collection::vec(prop::collection::vec(-50i32..50, dim), 1..max_n))
        -> Vec<Vec<f64>>
    {
        // Integer grid coordinates make ties common.
        rows.into_iter()
            .map(|r| r.into_iter().map(f64::from).collect())
            .collect()
    }
}

mod result_set_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn knn_keeps_the_k_best(
            dists in prop::collection::vec(0u8..20, 0..60),
            k in 0usize..10,
        ) {
            let candidates: Vec<(f64, usize)> = dists
                .iter()
                .enumerate()
                .map(|(i, &d)| (f64::from(d), i))
                .collect();
            let mut set = KnnResultSet::new(k);
            for &(d, i) in &candidates {
                set.add_point(d, i);
            }
            prop_assert!(set.len() <= k);
            let got: Vec<(f64, usize)> = set.neighbors().iter().map(|n| (n.distance, n.index)).collect();
            prop_assert_eq!(got, oracle(&candidates, k, f64::INFINITY));
        }

        #[test]
        fn knn_radius_respects_both_bounds(
            dists in prop::collection::vec(0u8..20, 0..60),
            k in 1usize..10,
            radius in 0.0f64..25.0,
        ) {
            let candidates: Vec<(f64, usize)> = dists
                .iter()
                .enumerate()
                .map(|(i, &d)| (f64::from(d), i))
                .collect();
            let mut set = KnnRadiusResultSet::new(k, radius);
            for &(d, i) in &candidates {
                set.add_point(d, i);
            }
            let got: Vec<(f64, usize)> = set.neighbors().iter().map(|n| (n.distance, n.index)).collect();
            prop_assert_eq!(got, oracle(&candidates, k, radius));
        }

        #[test]
        fn radius_set_copies_sorted_unique(
            dists in prop::collection::vec(0u8..20, 0..60),
            radius in 0.0f64..25.0,
        ) {
            // Every candidate offered twice, as overlapping LSH tables would.
            let candidates: Vec<(f64, usize)> = dists
                .iter()
                .enumerate()
                .map(|(i, &d)| (f64::from(d), i))
                .collect();
            let mut set = RadiusResultSet::new(radius);
            for &(d, i) in candidates.iter().chain(&candidates) {
                set.add_point(d, i);
            }
            let mut distances = vec![0.0; set.len()];
            let mut indices = vec![0; set.len()];
            let n = set.copy_into(&mut distances, &mut indices, true);
            let got: Vec<(f64, usize)> = distances[..n].iter().copied().zip(indices[..n].iter().copied()).collect();
            prop_assert_eq!(got, oracle(&candidates, usize::MAX, radius));
        }
    }
}

mod partition_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn plane_split_separates_three_ways(
            values in prop::collection::vec(0i32..10, 1..80),
            cut in 0i32..10,
            start_frac in 0.0f64..1.0,
        ) {
            let data = Matrix::new(values.iter().map(|&v| f64::from(v)).collect(), 1).unwrap();
            let mut ids: Vec<usize> = (0..values.len()).collect();
            let start = ((values.len() as f64) * start_frac) as usize;
            let value = f64::from(cut);

            let (lim1, lim2) = plane_split(&mut ids[start..], &data, 0, value);
            let slice = &ids[start..];
            prop_assert!(lim1 <= lim2 && lim2 <= slice.len());
            prop_assert!(slice[..lim1].iter().all(|&i| data.row(i)[0] < value));
            prop_assert!(slice[lim1..lim2].iter().all(|&i| data.row(i)[0] == value));
            prop_assert!(slice[lim2..].iter().all(|&i| data.row(i)[0] > value));

            // Still a permutation, prefix untouched.
            prop_assert!(ids[..start].iter().enumerate().all(|(i, &id)| i == id));
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..values.len()).collect::<Vec<_>>());
        }
    }
}

mod exactness_props {
    use super::*;

    fn check_exact(params: IndexParams, rows: &[Vec<f64>], query: &[f64], k: usize) -> Result<(), TestCaseError> {
        let data = Dataset::dense(rows).unwrap();
        let index = build(DistanceMetric::EuclideanSquared, data.clone(), params.clone()).unwrap();
        let found = index
            .knn_search_one(Query::Dense(query), k, &SearchParams::exact())
            .unwrap();
        let got: Vec<(f64, usize)> = found.iter().map(|n| (n.distance, n.index)).collect();
        let want = brute_force(data.as_dense().unwrap(), query, k);
        // Equal distances at the k-th place may resolve to different ids.
        let got_d: Vec<f64> = got.iter().map(|p| p.0).collect();
        let want_d: Vec<f64> = want.iter().map(|p| p.0).collect();
        prop_assert_eq!(got_d, want_d, "{:?}", params);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(60))]

        #[test]
        fn linear_matches_oracle(rows in arb_points(120, 3), q in prop::collection::vec(-60.0f64..60.0, 3), k in 1usize..8) {
            check_exact(IndexParams::Linear, &rows, &q, k)?;
        }

        #[test]
        fn kd_single_matches_oracle(rows in arb_points(120, 3), q in prop::collection::vec(-60.0f64..60.0, 3), k in 1usize..8) {
            check_exact(IndexParams::KdTreeSingle(KdTreeSingleParams { max_leaf_size: 4 }), &rows, &q, k)?;
        }

        #[test]
        fn one_tree_forest_matches_oracle(rows in arb_points(120, 3), q in prop::collection::vec(-60.0f64..60.0, 3), k in 1usize..8) {
            check_exact(IndexParams::KdForest(KdForestParams { trees: 1 }), &rows, &q, k)?;
        }

        #[test]
        fn kmeans_tree_matches_oracle(rows in arb_points(120, 3), q in prop::collection::vec(-60.0f64..60.0, 3), k in 1usize..8) {
            let params = KMeansParams { branching: 3, ..Default::default() };
            check_exact(IndexParams::KMeans(params), &rows, &q, k)?;
        }
    }
}

mod recall_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn more_checks_never_lower_recall(seed in 0u64..1000) {
            let w = flannel::benchmark::datasets::uniform(800, 20, 5, seed).unwrap();
            let gt = compute_ground_truth(&w.base, &w.queries, 5, 0, DistanceMetric::EuclideanSquared).unwrap();

            for params in [
                IndexParams::KdForest(KdForestParams { trees: 4 }),
                IndexParams::KMeans(KMeansParams { branching: 8, ..Default::default() }),
            ] {
                let mut index = flannel::Index::new(DistanceMetric::EuclideanSquared, w.base.clone(), params)
                    .unwrap()
                    .with_seed(seed);
                index.build_index().unwrap();

                let mut last = 0.0f32;
                for checks in [1, 8, 32, 128, 512] {
                    let found = index.knn_search(&w.queries, 5, &SearchParams::with_checks(checks)).unwrap();
                    let recall = mean_recall(&gt, &found.indices, 5);
                    prop_assert!(recall >= last, "{checks} checks: {recall} < {last}");
                    last = recall;
                }
            }
        }
    }
}
