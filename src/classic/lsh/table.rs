//! One bit-sampling hash table.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::MAX_KEY_SIZE;
use crate::dataset::Matrix;
use crate::error::{IndexError, Result};

/// Bucketed point ids keyed by `key_size` sampled bits.
#[derive(Debug, Clone)]
pub struct LshTable {
    key_size: usize,
    /// Sampled bit positions, one mask word per row word.
    mask: Vec<u32>,
    buckets: Vec<Vec<usize>>,
}

impl LshTable {
    /// Empty table for rows of `words` 32-bit words, sampling `key_size` distinct bits.
    pub fn new(words: usize, key_size: usize, rng: &mut StdRng) -> Result<Self> {
        if key_size == 0 || key_size > MAX_KEY_SIZE {
            return Err(IndexError::config(format!(
                "key_size must be in 1..={MAX_KEY_SIZE}, got {key_size}"
            )));
        }
        if key_size > words * 32 {
            return Err(IndexError::config(format!(
                "key_size {key_size} exceeds the {} bits of a row",
                words * 32
            )));
        }

        let mut bits: Vec<usize> = (0..words * 32).collect();
        bits.shuffle(rng);
        let mut mask = vec![0u32; words];
        for &bit in &bits[..key_size] {
            mask[bit / 32] |= 1 << (bit % 32);
        }

        Ok(Self {
            key_size,
            mask,
            buckets: vec![Vec::new(); 1 << key_size],
        })
    }

    /// Hash every row of `data`, row `i` under id `i`.
    pub fn add_all(&mut self, data: &Matrix<u32>) {
        for (id, row) in data.iter_rows().enumerate() {
            self.add(id, row);
        }
    }

    pub fn add(&mut self, id: usize, point: &[u32]) {
        let key = self.key(point);
        self.buckets[key].push(id);
    }

    /// Gather the sampled bits of `point`, lowest mask bit of the first word first.
    pub fn key(&self, point: &[u32]) -> usize {
        let mut key = 0usize;
        let mut bit = 0;
        for (&word, &mask) in point.iter().zip(&self.mask) {
            let mut remaining = mask;
            while remaining != 0 {
                let lowest = remaining & remaining.wrapping_neg();
                if word & lowest != 0 {
                    key |= 1 << bit;
                }
                remaining ^= lowest;
                bit += 1;
            }
        }
        key
    }

    /// Points stored under `key`; `None` when `key` is out of range.
    pub fn bucket(&self, key: usize) -> Option<&[usize]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn mask(&self) -> &[u32] {
        &self.mask
    }

    pub(crate) fn used_memory(&self) -> usize {
        self.mask.len() * std::mem::size_of::<u32>()
            + self
                .buckets
                .iter()
                .map(|b| std::mem::size_of::<Vec<usize>>() + b.len() * std::mem::size_of::<usize>())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn mask_samples_exactly_key_size_bits() {
        let mut rng = StdRng::seed_from_u64(9);
        for key_size in [1, 8, 20] {
            let table = LshTable::new(3, key_size, &mut rng).unwrap();
            let set: u32 = table.mask().iter().map(|m| m.count_ones()).sum();
            assert_eq!(set as usize, key_size);
        }
    }

    #[test]
    fn key_packs_sampled_bits_in_order() {
        let table = LshTable {
            key_size: 3,
            mask: vec![0b1010, 0b1],
            buckets: vec![Vec::new(); 8],
        };
        // bit 1 of word 0 -> key bit 0, bit 3 -> key bit 1, bit 0 of word 1 -> key bit 2
        assert_eq!(table.key(&[0b0010, 0]), 0b001);
        assert_eq!(table.key(&[0b1000, 0]), 0b010);
        assert_eq!(table.key(&[0, 1]), 0b100);
        assert_eq!(table.key(&[0b0101, 0xfffe]), 0);
    }

    #[test]
    fn key_wider_than_row_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(LshTable::new(1, 20, &mut rng).is_ok());
        assert!(LshTable::new(1, 21, &mut rng).is_err());
        assert!(LshTable::new(0, 4, &mut rng).is_err());
    }

    #[test]
    fn identical_points_share_a_bucket() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut table = LshTable::new(2, 6, &mut rng).unwrap();
        table.add(0, &[0xabcd, 0x1234]);
        table.add(1, &[0xabcd, 0x1234]);
        let key = table.key(&[0xabcd, 0x1234]);
        assert_eq!(table.bucket(key).unwrap(), &[0, 1]);
        assert!(table.bucket(1 << 6).is_none());
    }
}
