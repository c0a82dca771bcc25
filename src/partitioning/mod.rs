//! Clustering primitives shared by the tree builders.
//!
//! - [`centers`]: seed selection (random, farthest-first, k-means++)
//! - `kmeans`: Lloyd iterations for one k-means tree node

pub mod centers;
pub(crate) mod kmeans;

pub use centers::CentersInit;
