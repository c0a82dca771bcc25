//! Brute-force reference neighbors.

use crate::dataset::{Dataset, Query};
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};

/// Exact neighbor ids of every query, `nn` per query, after dropping the first `skip`.
///
/// `skip = 1` is used when the queries are themselves drawn from `dataset`, so a
/// query does not count itself as its own neighbor. Ties keep the smaller id.
pub fn compute_ground_truth(
    dataset: &Dataset,
    queries: &Dataset,
    nn: usize,
    skip: usize,
    metric: DistanceMetric,
) -> Result<Vec<Vec<usize>>> {
    if !metric.supports(dataset.kind()) || dataset.kind() != queries.kind() {
        return Err(IndexError::unsupported(format!(
            "{metric:?} ground truth over {:?} data with {:?} queries",
            dataset.kind(),
            queries.kind()
        )));
    }
    if dataset.width() != queries.width() && !queries.is_empty() {
        return Err(IndexError::DimensionMismatch {
            expected: dataset.width(),
            actual: queries.width(),
        });
    }

    queries
        .queries()
        .map(|q| find_nearest(dataset, q, nn, skip, metric))
        .collect()
}

fn find_nearest(
    dataset: &Dataset,
    query: Query<'_>,
    nn: usize,
    skip: usize,
    metric: DistanceMetric,
) -> Result<Vec<usize>> {
    let n = nn + skip;
    let mut best: Vec<(f64, usize)> = Vec::with_capacity(n + 1);

    let mut offer = |d: f64, id: usize| {
        if best.len() == n && best.last().map_or(true, |&(worst, _)| d >= worst) {
            return;
        }
        // Insertion sort; equal distances stay in id order.
        let pos = best.partition_point(|&(bd, _)| bd <= d);
        best.insert(pos, (d, id));
        best.truncate(n);
    };

    match (dataset, query) {
        (Dataset::Dense(m), Query::Dense(q)) => {
            let dist = metric.dense_kernel()?;
            for (id, row) in m.iter_rows().enumerate() {
                offer(dist(q, row), id);
            }
        }
        (Dataset::Binary(m), Query::Binary(q)) => {
            let dist = metric.bit_kernel()?;
            for (id, row) in m.iter_rows().enumerate() {
                offer(f64::from(dist(q, row)), id);
            }
        }
        _ => return Err(IndexError::unsupported("query kind does not match the data")),
    }

    Ok(best.into_iter().skip(skip).map(|(_, id)| id).take(nn).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Dataset {
        Dataset::dense(&[[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]]).unwrap()
    }

    #[test]
    fn nearest_in_order() {
        let queries = Dataset::dense(&[[2.2], [4.9]]).unwrap();
        let gt = compute_ground_truth(&line(), &queries, 3, 0, DistanceMetric::EuclideanSquared).unwrap();
        assert_eq!(gt, vec![vec![2, 3, 1], vec![5, 4, 3]]);
    }

    #[test]
    fn skip_drops_the_query_itself() {
        let data = line();
        let gt = compute_ground_truth(&data, &data, 1, 1, DistanceMetric::EuclideanSquared).unwrap();
        // Point 0's next neighbor is 1; interior points tie and keep the smaller id.
        assert_eq!(gt, vec![vec![1], vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn hamming_over_bits() {
        let data = Dataset::binary(&[[0b0000u32], [0b0111], [0b0001]]).unwrap();
        let queries = Dataset::binary(&[[0b0011u32]]).unwrap();
        let gt = compute_ground_truth(&data, &queries, 2, 0, DistanceMetric::Hamming).unwrap();
        assert_eq!(gt, vec![vec![1, 2]]);
    }

    #[test]
    fn metric_and_data_must_agree() {
        let queries = Dataset::dense(&[[0.0]]).unwrap();
        assert!(compute_ground_truth(&line(), &queries, 1, 0, DistanceMetric::Hamming).is_err());
    }
}
