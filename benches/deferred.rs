//! Benchmarks for queueing and replaying bootstrap records.

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use femtorelay::test_utils::CollectingHandler;
use femtorelay::{
    FemtoDeferredHandler, FemtoHandlerTrait, FemtoLevel, FemtoLogRecord, LoggerRegistry,
    SeverityMethods,
};

fn filled(max_size: usize, records: usize) -> FemtoDeferredHandler {
    let deferred = FemtoDeferredHandler::with_stream(std::io::sink(), max_size);
    for i in 0..records {
        let record =
            FemtoLogRecord::new("bench", FemtoLevel::INFO, "queued %s").with_args([i.to_string()]);
        let _ = deferred.handle(record);
    }
    deferred
}

fn deferred_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("deferred");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("enqueue_with_eviction", |b| {
        let deferred = filled(1_000, 1_000);
        b.iter(|| {
            let record = FemtoLogRecord::new("bench", FemtoLevel::WARNING, "overflow");
            black_box(deferred.handle(record)).ok();
        });
    });

    group.bench_function("logger_to_deferred", |b| {
        let registry = LoggerRegistry::new();
        let root = registry.root();
        root.set_level(FemtoLevel::GARBAGE);
        root.add_handler(Arc::new(FemtoDeferredHandler::with_stream(
            std::io::sink(),
            10_000,
        )));
        let logger = registry.get_logger("bench.logger").expect("valid name");
        b.iter(|| black_box(logger.info("hello")));
    });

    group.bench_function("sync_10k_into_one_handler", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let deferred = filled(10_000, 10_000);
                let target: Vec<Arc<dyn FemtoHandlerTrait>> =
                    vec![Arc::new(CollectingHandler::with_level(FemtoLevel::ALL))];
                let start = Instant::now();
                deferred.sync(&target);
                total += start.elapsed();
            }
            total
        });
    });

    group.bench_function("flush_1k_to_sink", |b| {
        b.iter_batched(
            || filled(1_000, 1_000),
            |deferred| black_box(deferred.flush()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, deferred_benchmarks);
criterion_main!(benches);
