//! Multi-probe locality sensitive hashing for bit vectors.
//!
//! Each table hashes a point by sampling `key_size` of its bits; Hamming-close
//! points collide with high probability. Multi-probing also visits the buckets
//! whose keys differ from the query's in up to `multi_probe_level` bits, trading
//! a few extra bucket scans for far fewer tables.
//!
//! # References
//!
//! - Indyk & Motwani (1998): "Approximate nearest neighbors: towards removing
//!   the curse of dimensionality"
//! - Lv et al. (2007): "Multi-probe LSH: efficient indexing for high-dimensional
//!   similarity search"

mod search;
mod table;

pub use search::LshIndex;
pub use table::LshTable;

/// Largest supported key width; a table allocates `2^key_size` buckets.
pub const MAX_KEY_SIZE: usize = 20;
