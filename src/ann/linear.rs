//! Brute-force scan.
//!
//! Scores every point against the query. No build step, exact by
//! construction; serves as the baseline the autotuner compares against.

use rand::rngs::StdRng;

use super::traits::NnIndex;
use crate::dataset::{Dataset, Query};
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::params::SearchParams;
use crate::result_set::ResultSet;

/// Exhaustive index over dense or bit-vector data.
#[derive(Debug, Clone)]
pub struct LinearIndex {
    metric: DistanceMetric,
}

impl LinearIndex {
    pub(crate) fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl NnIndex for LinearIndex {
    fn build_index(&mut self, _data: &Dataset, _rng: &mut StdRng) -> Result<()> {
        Ok(())
    }

    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        _params: &SearchParams,
    ) -> Result<()> {
        match (data, query) {
            (Dataset::Dense(m), Query::Dense(q)) => {
                let dist = self.metric.dense_kernel()?;
                for (id, row) in m.iter_rows().enumerate() {
                    result.add_point(dist(q, row), id);
                }
            }
            (Dataset::Binary(m), Query::Binary(q)) => {
                let dist = self.metric.bit_kernel()?;
                for (id, row) in m.iter_rows().enumerate() {
                    result.add_point(f64::from(dist(q, row)), id);
                }
            }
            _ => {
                return Err(IndexError::unsupported(
                    "query kind does not match the indexed data",
                ))
            }
        }
        Ok(())
    }

    fn used_memory(&self) -> usize {
        0
    }
}
