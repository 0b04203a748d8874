// operation_queue.rs - Benchmarks for queue throughput and end-to-end edit bursts
//
// Run with: cargo bench --bench operation_queue --features test-support
// Compare baselines: cargo bench --bench operation_queue --features test-support -- --baseline before

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use analysis_server::engine::PackageMap;
use analysis_server::operation::{Operation, OperationQueue, SetContents};
use analysis_server::test_utils::FakeEngine;
use analysis_server::{AnalysisServer, ServerConfig, Source};

fn source(i: usize) -> Source {
    Source::parse(&format!("file:///bench/s{}.src", i)).unwrap()
}

fn set_contents(context: usize, source_index: usize) -> Operation {
    Operation::SetContents(SetContents {
        context_id: format!("bench-{}", context),
        source: source(source_index),
        contents: "class Bench {}".to_string(),
    })
}

/// Distinct operations: every add appends, every take pops.
fn bench_add_take(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_add_take");
    group.sample_size(20);

    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("distinct", size), &size, |b, &size| {
            b.iter(|| {
                let queue = OperationQueue::new();
                for i in 0..size {
                    queue.add(set_contents(i % 8, i));
                    queue.add(Operation::perform_analysis(
                        format!("bench-{}", i % 8),
                        i % 2 == 0,
                        false,
                    ));
                }
                while let Some(op) = queue.take(Duration::from_millis(1)) {
                    black_box(&op);
                    queue.mark_last_operation_completed();
                    if queue.is_empty() {
                        break;
                    }
                }
            });
        });
    }

    group.finish();
}

/// Repeated edits of a few sources: most adds merge into a queued operation.
fn bench_merge_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_merge");
    group.sample_size(20);

    for hot in [1usize, 16, 128] {
        group.bench_with_input(BenchmarkId::new("hot_sources", hot), &hot, |b, &hot| {
            b.iter(|| {
                let queue = OperationQueue::new();
                for i in 0..2_000 {
                    black_box(queue.add(set_contents(0, i % hot)));
                }
                black_box(queue.len())
            });
        });
    }

    group.finish();
}

fn bench_cancellation(c: &mut Criterion) {
    c.bench_function("queue_remove_with_context_id", |b| {
        b.iter(|| {
            let queue = OperationQueue::new();
            for i in 0..5_000 {
                queue.add(set_contents(i % 10, i));
            }
            black_box(queue.remove_with_context_id("bench-3"))
        });
    });
}

/// Submit a burst of edits and wait for the worker to drain it.
fn bench_server_burst(c: &mut Criterion) {
    let server =
        AnalysisServer::start(Arc::new(FakeEngine::new()), ServerConfig::default()).unwrap();
    let id = server
        .create_context("bench", "/opt/sdk", PackageMap::new())
        .unwrap();

    let mut group = c.benchmark_group("server_burst");
    group.sample_size(10);
    group.bench_function("edits_until_idle", |b| {
        b.iter(|| {
            for i in 0..500 {
                server.set_contents(&id, source(i % 20), format!("v{}", i));
            }
            assert!(server.wait_for_idle(Duration::from_secs(30)));
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_add_take,
    bench_merge_scan,
    bench_cancellation,
    bench_server_burst
);
criterion_main!(benches);
