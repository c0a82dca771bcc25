//! Row-major datasets and borrowed query views.
//!
//! A [`Dataset`] is either a dense `rows x cols` matrix of `f64` values or a
//! `rows x words` matrix of `u32` words read as bit strings. Indexes take
//! ownership of the dataset once, at construction, and never mutate it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{IndexError, Result};

/// Kind of feature vectors a dataset or query holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Dense `f64` vectors.
    Dense,
    /// Bit vectors packed into `u32` words.
    Binary,
}

/// Row-major matrix with a fixed row width.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Copy> Matrix<T> {
    /// Wrap a flat row-major buffer of `rows * cols` values.
    pub fn new(data: Vec<T>, cols: usize) -> Result<Self> {
        if cols == 0 {
            if data.is_empty() {
                return Ok(Self {
                    data,
                    rows: 0,
                    cols,
                });
            }
            return Err(IndexError::config("row width must be greater than 0"));
        }
        if data.len() % cols != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: cols,
                actual: data.len() % cols,
            });
        }
        let rows = data.len() / cols;
        Ok(Self { data, rows, cols })
    }

    /// Build from individual rows; every row must have the width of the first.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        if cols == 0 && !rows.is_empty() {
            return Err(IndexError::config("row width must be greater than 0"));
        }
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(IndexError::DimensionMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row `i` as a slice. Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Flat row-major storage.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copy `size` distinct random rows (all rows if `size >= rows`).
    pub fn sample_rows(&self, size: usize, rng: &mut StdRng) -> Matrix<T> {
        let picked = self.pick_rows(size, rng);
        self.gather(&picked)
    }

    /// Like [`Matrix::sample_rows`] but removes the sampled rows from `self`.
    pub fn take_sample_rows(&mut self, size: usize, rng: &mut StdRng) -> Matrix<T> {
        let picked = self.pick_rows(size, rng);
        let sample = self.gather(&picked);

        let mut taken = vec![false; self.rows];
        for &i in &picked {
            taken[i] = true;
        }
        let mut kept = Vec::with_capacity((self.rows - picked.len()) * self.cols);
        for (i, row) in self.iter_rows().enumerate() {
            if !taken[i] {
                kept.extend_from_slice(row);
            }
        }
        self.rows -= picked.len();
        self.data = kept;
        sample
    }

    fn pick_rows(&self, size: usize, rng: &mut StdRng) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.shuffle(rng);
        order.truncate(size.min(self.rows));
        order
    }

    fn gather(&self, rows: &[usize]) -> Matrix<T> {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &i in rows {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            data,
            rows: rows.len(),
            cols: self.cols,
        }
    }
}

/// Owned dataset (or batch of queries).
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Dense(Matrix<f64>),
    Binary(Matrix<u32>),
}

impl Dataset {
    /// Dense dataset from rows of `f64`.
    pub fn dense<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        Ok(Dataset::Dense(Matrix::from_rows(rows)?))
    }

    /// Bit-vector dataset from rows of `u32` words.
    pub fn binary<R: AsRef<[u32]>>(rows: &[R]) -> Result<Self> {
        Ok(Dataset::Binary(Matrix::from_rows(rows)?))
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Dataset::Dense(_) => DataKind::Dense,
            Dataset::Binary(_) => DataKind::Binary,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Dataset::Dense(m) => m.rows(),
            Dataset::Binary(m) => m.rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row width: dimensions for dense data, `u32` words for bit vectors.
    pub fn width(&self) -> usize {
        match self {
            Dataset::Dense(m) => m.cols(),
            Dataset::Binary(m) => m.cols(),
        }
    }

    /// Row `i` as a borrowed query.
    pub fn query(&self, i: usize) -> Query<'_> {
        match self {
            Dataset::Dense(m) => Query::Dense(m.row(i)),
            Dataset::Binary(m) => Query::Binary(m.row(i)),
        }
    }

    pub fn queries(&self) -> impl Iterator<Item = Query<'_>> + '_ {
        (0..self.len()).map(move |i| self.query(i))
    }

    pub fn as_dense(&self) -> Option<&Matrix<f64>> {
        match self {
            Dataset::Dense(m) => Some(m),
            Dataset::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Matrix<u32>> {
        match self {
            Dataset::Binary(m) => Some(m),
            Dataset::Dense(_) => None,
        }
    }
}

impl From<Matrix<f64>> for Dataset {
    fn from(m: Matrix<f64>) -> Self {
        Dataset::Dense(m)
    }
}

impl From<Matrix<u32>> for Dataset {
    fn from(m: Matrix<u32>) -> Self {
        Dataset::Binary(m)
    }
}

/// Borrowed view of a single query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query<'a> {
    Dense(&'a [f64]),
    Binary(&'a [u32]),
}

impl Query<'_> {
    pub fn kind(&self) -> DataKind {
        match self {
            Query::Dense(_) => DataKind::Dense,
            Query::Binary(_) => DataKind::Binary,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Query::Dense(q) => q.len(),
            Query::Binary(q) => q.len(),
        }
    }
}

impl<'a> From<&'a [f64]> for Query<'a> {
    fn from(q: &'a [f64]) -> Self {
        Query::Dense(q)
    }
}

impl<'a> From<&'a [u32]> for Query<'a> {
    fn from(q: &'a [u32]) -> Self {
        Query::Binary(q)
    }
}
