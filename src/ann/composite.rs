//! K-means tree and randomized KD-forest over one dataset.
//!
//! Both structures are built from the same borrowed data and every search feeds
//! the same result set from both, so a point missed by one partitioning can
//! still be found through the other.

use rand::rngs::StdRng;

use super::traits::NnIndex;
use crate::classic::trees::kdtree::KdForestIndex;
use crate::classic::trees::kmeans_tree::KMeansTreeIndex;
use crate::dataset::{Dataset, Query};
use crate::distance::{AxisKernel, DenseKernel};
use crate::error::Result;
use crate::params::{CompositeParams, SearchParams};
use crate::result_set::ResultSet;

#[derive(Debug, Clone)]
pub struct CompositeIndex {
    kmeans: KMeansTreeIndex,
    kdtree: KdForestIndex,
}

impl CompositeIndex {
    pub(crate) fn new(dist: DenseKernel, axis: AxisKernel, params: &CompositeParams) -> Self {
        Self {
            kmeans: KMeansTreeIndex::new(dist, params.kmeans()),
            kdtree: KdForestIndex::new(dist, axis, params.kdtree()),
        }
    }

    pub fn kmeans(&self) -> &KMeansTreeIndex {
        &self.kmeans
    }

    pub fn kdtree(&self) -> &KdForestIndex {
        &self.kdtree
    }
}

impl NnIndex for CompositeIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        self.kmeans.build_index(data, rng)?;
        self.kdtree.build_index(data, rng)
    }

    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        params: &SearchParams,
    ) -> Result<()> {
        self.kmeans.find_neighbors(data, result, query, params)?;
        self.kdtree.find_neighbors(data, result, query, params)
    }

    fn find_nearest(&self, data: &Dataset, result: &mut dyn ResultSet, query: Query<'_>) -> Result<()> {
        self.kmeans.find_nearest(data, result, query)
    }

    fn used_memory(&self) -> usize {
        self.kmeans.used_memory() + self.kdtree.used_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::result_set::KnnResultSet;
    use rand::SeedableRng;

    #[test]
    fn memory_is_the_sum_of_both_parts() {
        let rows: Vec<Vec<f64>> = (0..200).map(|i| vec![(i % 17) as f64, (i / 17) as f64]).collect();
        let data = Dataset::dense(&rows).unwrap();
        let m = DistanceMetric::EuclideanSquared;
        let params = CompositeParams {
            branching: 4,
            trees: 2,
            ..Default::default()
        };
        let mut index = CompositeIndex::new(m.dense_kernel().unwrap(), m.axis_kernel().unwrap(), &params);
        index.build_index(&data, &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(
            index.used_memory(),
            index.kmeans().used_memory() + index.kdtree().used_memory()
        );
        assert_eq!(index.kdtree().tree_count(), 2);

        let mut result = KnnResultSet::new(3);
        index
            .find_neighbors(&data, &mut result, data.query(40), &SearchParams::with_checks(16))
            .unwrap();
        assert_eq!(result.neighbors()[0].index, 40);
        assert_eq!(result.len(), 3);
    }
}
