//! Classic space-partitioning and hashing indexes.
//!
//! Trees partition dense vectors (KD-trees, k-means trees) or bit vectors
//! (hierarchical clustering); LSH hashes bit vectors into buckets.

pub mod lsh;
pub mod trees;
