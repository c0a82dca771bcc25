//! Distance metrics for dense and bit-vector data.
//!
//! Two metrics are supported:
//!
//! - [`DistanceMetric::EuclideanSquared`]: sum of squared per-dimension differences
//!   over dense `f64` vectors.
//! - [`DistanceMetric::Hamming`]: popcount of XOR over `u32` words, each row read as
//!   a `32 * words` bit string.
//!
//! ## Important nuance
//!
//! Distances are **never square-rooted**. Every pruning bound in the tree indexes
//! (per-dimension cut distances, ball-exclusion tests) is expressed in the same
//! squared units, so comparisons stay monotone without paying for `sqrt`.
//!
//! Indexes resolve a kernel once at construction ([`DistanceMetric::dense_kernel`],
//! [`DistanceMetric::axis_kernel`], [`DistanceMetric::bit_kernel`]) so the query hot
//! path never re-checks metric compatibility.

use serde::{Deserialize, Serialize};

use crate::dataset::DataKind;
use crate::error::{IndexError, Result};

/// Distance between two dense vectors.
pub type DenseKernel = fn(&[f64], &[f64]) -> f64;
/// Distance contribution along a single axis.
pub type AxisKernel = fn(f64, f64) -> f64;
/// Distance between two bit vectors.
pub type BitKernel = fn(&[u32], &[u32]) -> u32;

/// Distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance, dense vectors only.
    #[default]
    EuclideanSquared,
    /// Hamming distance, bit vectors only.
    Hamming,
}

impl DistanceMetric {
    /// Whether this metric can measure data of the given kind.
    #[must_use]
    pub fn supports(self, kind: DataKind) -> bool {
        matches!(
            (self, kind),
            (DistanceMetric::EuclideanSquared, DataKind::Dense)
                | (DistanceMetric::Hamming, DataKind::Binary)
        )
    }

    /// Dense vector distance.
    pub fn distance(self, a: &[f64], b: &[f64]) -> Result<f64> {
        let kernel = self.dense_kernel()?;
        same_len(a.len(), b.len())?;
        Ok(kernel(a, b))
    }

    /// Scalar distance, used for per-dimension pruning bounds.
    pub fn scalar_distance(self, a: f64, b: f64) -> Result<f64> {
        Ok(self.axis_kernel()?(a, b))
    }

    /// Bit-vector distance.
    pub fn bit_distance(self, a: &[u32], b: &[u32]) -> Result<u32> {
        let kernel = self.bit_kernel()?;
        same_len(a.len(), b.len())?;
        Ok(kernel(a, b))
    }

    /// Distance between two 32-bit words.
    pub fn word_distance(self, a: u32, b: u32) -> Result<u32> {
        match self {
            DistanceMetric::Hamming => Ok(hamming_word(a, b)),
            DistanceMetric::EuclideanSquared => Err(self.mismatch("32-bit words")),
        }
    }

    /// Resolve the dense kernel, failing for metrics that cannot measure dense data.
    pub fn dense_kernel(self) -> Result<DenseKernel> {
        match self {
            DistanceMetric::EuclideanSquared => Ok(euclidean_squared),
            DistanceMetric::Hamming => Err(self.mismatch("dense vectors")),
        }
    }

    /// Resolve the per-axis kernel.
    pub fn axis_kernel(self) -> Result<AxisKernel> {
        match self {
            DistanceMetric::EuclideanSquared => Ok(axis_squared),
            DistanceMetric::Hamming => Err(self.mismatch("scalars")),
        }
    }

    /// Resolve the bit-vector kernel.
    pub fn bit_kernel(self) -> Result<BitKernel> {
        match self {
            DistanceMetric::Hamming => Ok(hamming),
            DistanceMetric::EuclideanSquared => Err(self.mismatch("bit vectors")),
        }
    }

    fn mismatch(self, what: &str) -> IndexError {
        IndexError::unsupported(format!("{self:?} distance is not defined for {what}"))
    }
}

fn same_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch { expected, actual })
    }
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub fn euclidean_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
fn axis_squared(a: f64, b: f64) -> f64 {
    let d = a - b;
    d * d
}

/// Hamming distance between two bit vectors of equal word count.
#[inline]
#[must_use]
pub fn hamming(a: &[u32], b: &[u32]) -> u32 {
    a.iter().zip(b.iter()).map(|(&x, &y)| hamming_word(x, y)).sum()
}

#[inline]
fn hamming_word(a: u32, b: u32) -> u32 {
    (a ^ b).count_ones()
}
