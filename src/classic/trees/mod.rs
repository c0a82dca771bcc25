//! Tree-based indexes.

pub mod hierarchical;
pub mod kdtree;
pub mod kdtree_single;
pub mod kmeans_tree;
