//! Engine-count guard and counters.

use bulkload_backend::{
    Backend, BackendConfig, Context, EngineCountGuard, EngineCountSnapshot, EngineCounters,
    InMemoryBackend,
};
use bulkload_testkit::{init_test_tracing, memory_facade_with, SAMPLE_TABLE_NAME};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct RecordingGuard {
    seen: Mutex<Vec<EngineCountSnapshot>>,
}

impl EngineCountGuard for RecordingGuard {
    fn check(&self, counts: EngineCountSnapshot) {
        self.seen.lock().push(counts);
    }
}

#[test]
fn guard_sees_counts_after_each_open() {
    init_test_tracing();
    let guard = Arc::new(RecordingGuard::default());
    let backend = Backend::new(InMemoryBackend::new()).with_guard(guard.clone());
    let ctx = Context::background();

    let a = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, 0).unwrap();
    a.close(&ctx).unwrap();
    let _b = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, 1).unwrap();

    let seen = guard.seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            EngineCountSnapshot { opened: 1, closed: 0 },
            EngineCountSnapshot { opened: 2, closed: 1 },
        ]
    );
}

#[test]
fn limit_allows_sequential_engines() {
    init_test_tracing();
    let backend = memory_facade_with(BackendConfig::new().with_engine_count_limit(1));
    let ctx = Context::background();

    for engine_id in 0..5 {
        let engine = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, engine_id).unwrap();
        engine.close(&ctx).unwrap();
    }
    assert_eq!(backend.counters().opened(), 5);
}

#[test]
#[should_panic(expected = "forcing failure due to engine count limit: 3 - 0 > 2")]
fn limit_aborts_on_leaked_engines() {
    init_test_tracing();
    let backend = memory_facade_with(BackendConfig::new().with_engine_count_limit(2));
    let ctx = Context::background();

    let mut engines = Vec::new();
    for engine_id in 0..3 {
        engines.push(backend.open_engine(&ctx, SAMPLE_TABLE_NAME, engine_id).unwrap());
    }
}

#[test]
#[should_panic(expected = "forcing failure due to engine count limit: 3 - 1 > 1")]
fn repeated_close_does_not_hide_leaks() {
    init_test_tracing();
    let backend = memory_facade_with(BackendConfig::new().with_engine_count_limit(1));
    let ctx = Context::background();

    let first = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, 0).unwrap();
    first.close(&ctx).unwrap();
    first.close(&ctx).unwrap();
    assert_eq!(backend.counters().closed(), 1);

    let _leaked = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, 1).unwrap();
    let _over = backend.open_engine(&ctx, SAMPLE_TABLE_NAME, 2).unwrap();
}

#[test]
fn facades_can_share_counters() {
    let counters = Arc::new(EngineCounters::new());
    let a = Backend::new(InMemoryBackend::new()).with_counters(Arc::clone(&counters));
    let b = Backend::new(InMemoryBackend::new()).with_counters(Arc::clone(&counters));
    let ctx = Context::background();

    a.open_engine(&ctx, SAMPLE_TABLE_NAME, 0).unwrap();
    b.open_engine(&ctx, SAMPLE_TABLE_NAME, 0).unwrap();
    assert_eq!(counters.opened(), 2);
}

#[test]
fn counters_are_consistent_under_concurrency() {
    init_test_tracing();
    let backend = memory_facade_with(BackendConfig::new().with_engine_count_limit(64));
    let ctx = Context::background();

    std::thread::scope(|s| {
        for worker in 0..8 {
            let (backend, ctx) = (backend.clone(), ctx.clone());
            s.spawn(move || {
                let table = format!("`db`.`t{worker}`");
                for engine_id in 0..16 {
                    let engine = backend.open_engine(&ctx, &table, engine_id).unwrap();
                    engine.close(&ctx).unwrap();
                }
            });
        }
    });

    let counts = backend.counters().snapshot();
    assert_eq!(counts.opened, 128);
    assert_eq!(counts.closed, 128);
}
