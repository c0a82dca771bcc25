//! Evaluation utilities for index quality.
//!
//! - **Ground truth**: brute-force reference neighbors
//! - **Precision**: measured precision per visit budget, and the budget search
//!   the autotuner runs
//! - **Metrics**: recall@k, precision@k
//! - **Datasets**: seeded synthetic workloads

pub mod datasets;
pub mod ground_truth;
pub mod metrics;
pub mod precision;

pub use datasets::Workload;
pub use ground_truth::compute_ground_truth;
pub use metrics::{knn_recall, mean_recall, precision_at_k, recall_at_k};
pub use precision::{
    compute_distance_ratio, count_correct_matches, search_with_ground_truth, test_index_precision,
    PrecisionEstimate, PrecisionSample, TestSet, SEARCH_EPS,
};
