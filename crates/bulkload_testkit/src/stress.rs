//! Stress helpers for the engine lifecycle.
//!
//! These helpers drive many engines through the full sequence from several
//! threads sharing one facade.

use crate::fixtures::{encode_batch, sample_rows, sample_table};
use bulkload_backend::{AbstractBackend, Backend, BackendResult, Context, EngineCountSnapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a concurrent lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Engines the workers attempted.
    pub engines: usize,
    /// Engines that went through import and cleanup.
    pub cleaned_up: usize,
    /// Engines that failed at some step.
    pub failed: usize,
    /// Facade counters once every worker returned.
    pub counts: EngineCountSnapshot,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl LifecycleReport {
    /// Whether every engine finished and none is left open.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cleaned_up == self.engines && self.counts.in_flight() == 0
    }
}

/// Configuration for lifecycle stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Engines opened by each worker.
    pub engines_per_thread: usize,
    /// Rows written into each engine.
    pub rows_per_engine: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            engines_per_thread: 8,
            rows_per_engine: 64,
        }
    }
}

fn drive_engine<B: AbstractBackend>(
    backend: &Backend<B>,
    ctx: &Context,
    table_name: &str,
    engine_id: i32,
    rows: &B::Rows,
) -> BackendResult<()> {
    let engine = backend.open_engine(ctx, table_name, engine_id)?;
    engine.write_rows(ctx, &[], rows)?;
    let closed = engine.close(ctx)?;
    closed.import(ctx)?;
    closed.cleanup(ctx)
}

/// Runs the full lifecycle for every engine of every worker concurrently.
///
/// Each worker loads its own table so that engine identities never collide.
pub fn stress_concurrent_lifecycle<B: AbstractBackend>(
    backend: &Backend<B>,
    config: &StressConfig,
) -> LifecycleReport {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let ctx = Context::background();
    let table = sample_table();

    let start = Instant::now();
    thread::scope(|s| {
        for worker in 0..config.threads {
            let (backend, ctx, table) = (backend.clone(), ctx.clone(), &table);
            let (successful, failed) = (&successful, &failed);
            s.spawn(move || {
                let batch = encode_batch(&backend, table, &sample_rows(config.rows_per_engine));
                let table_name = format!("`stress`.`worker_{worker}`");
                for engine_id in 0..config.engines_per_thread {
                    match drive_engine(&backend, &ctx, &table_name, engine_id as i32, &batch.data) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(err) => {
                            tracing::warn!(%err, worker, engine_id, "engine lifecycle failed");
                            failed.fetch_add(1, Ordering::Relaxed)
                        }
                    };
                }
            });
        }
    });
    let elapsed = start.elapsed();

    let cleaned_up = successful.load(Ordering::Relaxed);
    let failed = failed.load(Ordering::Relaxed);
    LifecycleReport {
        engines: cleaned_up + failed,
        cleaned_up,
        failed,
        counts: backend.counters().snapshot(),
        elapsed,
    }
}
