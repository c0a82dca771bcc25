//! Seeded synthetic workloads for tests, benches and tuning experiments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::{Dataset, Matrix};
use crate::error::Result;

/// Points to index plus the queries to run against them.
#[derive(Debug, Clone)]
pub struct Workload {
    pub base: Dataset,
    pub queries: Dataset,
}

impl Workload {
    pub fn n_base(&self) -> usize {
        self.base.len()
    }

    pub fn n_queries(&self) -> usize {
        self.queries.len()
    }
}

/// Dense vectors uniform in `[0, 1)^dim`.
///
/// A baseline with no structure; real data usually clusters, which helps
/// every partitioning index.
pub fn uniform(n_base: usize, n_queries: usize, dim: usize, seed: u64) -> Result<Workload> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut draw = |n: usize| -> Result<Dataset> {
        let flat: Vec<f64> = (0..n * dim).map(|_| rng.random::<f64>()).collect();
        Ok(Dataset::Dense(Matrix::new(flat, dim)?))
    };
    Ok(Workload {
        base: draw(n_base)?,
        queries: draw(n_queries)?,
    })
}

/// Dense vectors drawn around `n_clusters` random centers with Gaussian noise.
pub fn clustered(
    n_base: usize,
    n_queries: usize,
    dim: usize,
    n_clusters: usize,
    cluster_std: f64,
    seed: u64,
) -> Result<Workload> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f64>> = (0..n_clusters.max(1))
        .map(|_| (0..dim).map(|_| rng.random::<f64>()).collect())
        .collect();

    let mut draw = |n: usize| -> Result<Dataset> {
        let mut flat = Vec::with_capacity(n * dim);
        for _ in 0..n {
            let center = &centers[rng.random_range(0..centers.len())];
            for &c in center {
                // Box-Muller; `1 - u` keeps the log argument in (0, 1]
                let u1 = 1.0 - rng.random::<f64>();
                let u2 = rng.random::<f64>();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                flat.push(c + z * cluster_std);
            }
        }
        Ok(Dataset::Dense(Matrix::new(flat, dim)?))
    };
    Ok(Workload {
        base: draw(n_base)?,
        queries: draw(n_queries)?,
    })
}

/// Random bit vectors of `words` 32-bit words.
///
/// Queries are base points with a few bits flipped, so each has a close but
/// usually not identical neighbor.
pub fn binary(n_base: usize, n_queries: usize, words: usize, flips: u32, seed: u64) -> Result<Workload> {
    let mut rng = StdRng::seed_from_u64(seed);
    let flat: Vec<u32> = (0..n_base * words).map(|_| rng.random::<u32>()).collect();
    let base = Matrix::new(flat, words)?;

    let mut queries = Vec::with_capacity(n_queries * words);
    for _ in 0..n_queries {
        if base.is_empty() {
            queries.extend((0..words).map(|_| rng.random::<u32>()));
            continue;
        }
        let mut row = base.row(rng.random_range(0..base.rows())).to_vec();
        for _ in 0..flips {
            let bit = rng.random_range(0..words * 32);
            row[bit / 32] ^= 1 << (bit % 32);
        }
        queries.extend_from_slice(&row);
    }

    Ok(Workload {
        base: Dataset::Binary(base),
        queries: Dataset::Binary(Matrix::new(queries, words)?),
    })
}
