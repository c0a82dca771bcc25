//! Multi-probe LSH index.

use rand::rngs::StdRng;

use super::table::LshTable;
use crate::ann::traits::{binary_pair, NnIndex};
use crate::dataset::{Dataset, Query};
use crate::distance::BitKernel;
use crate::error::{IndexError, Result};
use crate::params::{LshParams, SearchParams};
use crate::result_set::ResultSet;

/// LSH index over bit vectors.
///
/// Search ignores the visit budget: every point in every probed bucket is scored.
/// A point colliding with the query in several tables is offered to the result
/// set several times; every result set admits an id once.
#[derive(Debug, Clone)]
pub struct LshIndex {
    dist: BitKernel,
    params: LshParams,
    tables: Vec<LshTable>,
    xor_masks: Vec<usize>,
}

/// Push `key` and every key obtained by setting up to `level` more bits below `lowest`.
fn fill_xor_mask(key: usize, lowest: usize, level: usize, out: &mut Vec<usize>) {
    out.push(key);
    if level == 0 {
        return;
    }
    for index in (0..lowest).rev() {
        fill_xor_mask(key | (1 << index), index, level - 1, out);
    }
}

impl LshIndex {
    pub(crate) fn new(dist: BitKernel, params: LshParams) -> Self {
        let mut xor_masks = Vec::new();
        fill_xor_mask(0, params.key_size, params.multi_probe_level, &mut xor_masks);
        Self {
            dist,
            params,
            tables: Vec::new(),
            xor_masks,
        }
    }

    /// Key perturbations probed in every table, the exact key (`0`) first.
    pub fn probe_masks(&self) -> &[usize] {
        &self.xor_masks
    }

    /// `(table, bucket key)` pairs a search for `query` visits, in probe order.
    pub fn probed_buckets(&self, query: &[u32]) -> Vec<(usize, usize)> {
        self.tables
            .iter()
            .enumerate()
            .flat_map(|(t, table)| {
                let key = table.key(query);
                self.xor_masks
                    .iter()
                    .map(move |&mask| (t, key ^ mask))
                    .filter(move |&(_, k)| table.bucket(k).is_some())
            })
            .collect()
    }

    pub fn tables(&self) -> &[LshTable] {
        &self.tables
    }
}

impl NnIndex for LshIndex {
    fn build_index(&mut self, data: &Dataset, rng: &mut StdRng) -> Result<()> {
        let data = data
            .as_binary()
            .ok_or_else(|| IndexError::unsupported("LSH indexes bit vectors only"))?;

        let mut tables = Vec::with_capacity(self.params.tables);
        for _ in 0..self.params.tables {
            let mut table = LshTable::new(data.cols(), self.params.key_size, rng)?;
            table.add_all(data);
            tables.push(table);
        }
        self.tables = tables;

        log::debug!(
            "lsh: {} tables, key size {}, {} probes per table",
            self.tables.len(),
            self.params.key_size,
            self.xor_masks.len()
        );
        Ok(())
    }

    fn find_neighbors(
        &self,
        data: &Dataset,
        result: &mut dyn ResultSet,
        query: Query<'_>,
        _params: &SearchParams,
    ) -> Result<()> {
        let (data, query) = binary_pair(data, query)?;
        for (t, key) in self.probed_buckets(query) {
            let Some(bucket) = self.tables[t].bucket(key) else {
                continue;
            };
            for &id in bucket {
                result.add_point(f64::from((self.dist)(query, data.row(id))), id);
            }
        }
        Ok(())
    }

    fn used_memory(&self) -> usize {
        self.tables.iter().map(LshTable::used_memory).sum::<usize>()
            + self.xor_masks.len() * std::mem::size_of::<usize>()
    }
}
