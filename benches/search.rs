//! Build and query benchmarks for every index family.
//!
//! Dense families run on a clustered workload, the bit-vector families on
//! random words with perturbed queries. Budgets are swept so the recall/latency
//! tradeoff shows up in the criterion report.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flannel::benchmark::{datasets, Workload};
use flannel::{
    DistanceMetric, HierarchicalParams, Index, IndexParams, KMeansParams, KdForestParams, LshParams,
    SearchParams,
};

const N_BASE: usize = 10_000;
const N_QUERIES: usize = 100;
const DIM: usize = 16;
const K: usize = 10;

fn dense_workload() -> Workload {
    datasets::clustered(N_BASE, N_QUERIES, DIM, 32, 0.05, 7).expect("workload")
}

fn binary_workload() -> Workload {
    datasets::binary(N_BASE, N_QUERIES, 4, 6, 7).expect("workload")
}

fn built(metric: DistanceMetric, w: &Workload, params: IndexParams) -> Index {
    let mut index = Index::new(metric, w.base.clone(), params)
        .expect("params")
        .with_seed(1);
    index.build_index().expect("build");
    index
}

fn dense_families() -> Vec<(&'static str, IndexParams)> {
    vec![
        ("kdforest_4", IndexParams::KdForest(KdForestParams { trees: 4 })),
        ("kdforest_8", IndexParams::KdForest(KdForestParams { trees: 8 })),
        (
            "kmeans_32",
            IndexParams::KMeans(KMeansParams {
                branching: 32,
                ..Default::default()
            }),
        ),
    ]
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    let dense = dense_workload();
    for (name, params) in dense_families() {
        group.bench_function(name, |b| {
            b.iter(|| built(DistanceMetric::EuclideanSquared, &dense, black_box(params.clone())))
        });
    }

    let bits = binary_workload();
    group.bench_function("lsh_12x16", |b| {
        b.iter(|| {
            built(
                DistanceMetric::Hamming,
                &bits,
                IndexParams::Lsh(LshParams {
                    tables: 12,
                    key_size: 16,
                    multi_probe_level: 2,
                }),
            )
        })
    });
    group.bench_function("hierarchical_4", |b| {
        b.iter(|| {
            built(
                DistanceMetric::Hamming,
                &bits,
                IndexParams::Hierarchical(HierarchicalParams::default()),
            )
        })
    });

    group.finish();
}

fn bench_dense_search(c: &mut Criterion) {
    let w = dense_workload();
    let mut group = c.benchmark_group("dense_knn");

    let linear = built(DistanceMetric::EuclideanSquared, &w, IndexParams::Linear);
    group.bench_function("linear", |b| {
        b.iter(|| linear.knn_search(black_box(&w.queries), K, &SearchParams::default()))
    });

    for (name, params) in dense_families() {
        let index = built(DistanceMetric::EuclideanSquared, &w, params);
        for checks in [32, 128, 512] {
            group.bench_with_input(BenchmarkId::new(name, checks), &checks, |b, &checks| {
                let params = SearchParams::with_checks(checks);
                b.iter(|| index.knn_search(black_box(&w.queries), K, &params))
            });
        }
    }

    group.finish();
}

fn bench_binary_search(c: &mut Criterion) {
    let w = binary_workload();
    let mut group = c.benchmark_group("binary_knn");

    let linear = built(DistanceMetric::Hamming, &w, IndexParams::Linear);
    group.bench_function("linear", |b| {
        b.iter(|| linear.knn_search(black_box(&w.queries), K, &SearchParams::default()))
    });

    for level in [0, 1, 2] {
        let lsh = built(
            DistanceMetric::Hamming,
            &w,
            IndexParams::Lsh(LshParams {
                tables: 12,
                key_size: 16,
                multi_probe_level: level,
            }),
        );
        group.bench_with_input(BenchmarkId::new("lsh", level), &level, |b, _| {
            b.iter(|| lsh.knn_search(black_box(&w.queries), K, &SearchParams::default()))
        });
    }

    let tree = built(
        DistanceMetric::Hamming,
        &w,
        IndexParams::Hierarchical(HierarchicalParams::default()),
    );
    group.bench_function("hierarchical_512", |b| {
        let params = SearchParams::with_checks(512);
        b.iter(|| tree.knn_search(black_box(&w.queries), K, &params))
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_dense_search, bench_binary_search);
criterion_main!(benches);
