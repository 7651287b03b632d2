//! Test fixtures and backend helpers.
//!
//! Provides convenience functions for setting up a facade over the in-memory
//! backend and for producing encoded chunks from plain rows.

use bulkload_backend::{
    AbstractBackend, Backend, BackendConfig, Context, Datum, Encoder, InMemoryBackend, KvChecksum,
    Row, SessionOptions, TableInfo,
};
use std::sync::Once;
use std::time::Duration;
use tracing::Span;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter is read from `RUST_LOG` and defaults to `warn`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Table used by most tests: `id` primary key, `name`, `score` and an index
/// on `name`.
pub fn sample_table() -> TableInfo {
    TableInfo::new(42, "users", &["id", "name", "score"])
        .with_pk_is_handle(true)
        .with_index(1, "idx_name", vec![1])
}

/// Qualified name of [`sample_table`] as used for engine tags.
pub const SAMPLE_TABLE_NAME: &str = "`test`.`users`";

/// Generates `count` rows matching [`sample_table`].
pub fn sample_rows(count: usize) -> Vec<Vec<Datum>> {
    (0..count)
        .map(|i| {
            vec![
                Datum::Int(i as i64 + 1),
                Datum::String(format!("user-{i:05}")),
                Datum::Float((i % 100) as f64 / 4.0),
            ]
        })
        .collect()
}

/// Encoded output of a batch of rows.
#[derive(Debug)]
pub struct EncodedBatch<R> {
    /// Record pairs.
    pub data: R,
    /// Checksum of the record pairs.
    pub data_checksum: KvChecksum,
    /// Index pairs.
    pub indices: R,
    /// Checksum of the index pairs.
    pub index_checksum: KvChecksum,
}

/// Encodes `rows` for `table` using the backend's own encoder.
///
/// Row ids start at 1. Panics if any row fails to encode.
pub fn encode_batch<B: AbstractBackend>(
    backend: &Backend<B>,
    table: &TableInfo,
    rows: &[Vec<Datum>],
) -> EncodedBatch<B::Rows> {
    let mut encoder = backend.new_encoder(table, &SessionOptions::default());
    let mut batch = EncodedBatch {
        data: backend.make_empty_rows(),
        data_checksum: KvChecksum::new(),
        indices: backend.make_empty_rows(),
        index_checksum: KvChecksum::new(),
    };
    for (i, row) in rows.iter().enumerate() {
        encoder
            .encode(&Span::none(), row, i as i64 + 1, &[])
            .expect("failed to encode row")
            .classify_and_append(
                &mut batch.data,
                &mut batch.data_checksum,
                &mut batch.indices,
                &mut batch.index_checksum,
            );
    }
    encoder.close();
    batch
}

/// Creates a facade over a fresh in-memory backend.
pub fn memory_facade() -> Backend<InMemoryBackend> {
    Backend::new(InMemoryBackend::new())
}

/// Creates a facade over a fresh in-memory backend with `config`.
pub fn memory_facade_with(config: BackendConfig) -> Backend<InMemoryBackend> {
    Backend::with_config(InMemoryBackend::new(), config)
}

/// Runs a test with a fresh in-memory facade and a background context.
///
/// # Example
///
/// ```rust,ignore
/// use bulkload_testkit::with_memory_backend;
///
/// #[test]
/// fn my_test() {
///     with_memory_backend(|backend, ctx| {
///         let engine = backend.open_engine(ctx, "t", 0).unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_memory_backend<F, R>(f: F) -> R
where
    F: FnOnce(&Backend<InMemoryBackend>, &Context) -> R,
{
    init_test_tracing();
    let backend = memory_facade();
    let ctx = Context::background();
    let result = f(&backend, &ctx);
    backend.close();
    result
}

/// A context that is cancelled from another thread after `delay`.
pub fn cancel_after(delay: Duration) -> Context {
    let ctx = Context::background();
    let handle = ctx.clone();
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        handle.cancel();
    });
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_backend::Rows;

    #[test]
    fn sample_rows_match_table() {
        let table = sample_table();
        table.validate().unwrap();
        for row in sample_rows(5) {
            assert_eq!(row.len(), table.columns.len());
        }
    }

    #[test]
    fn encode_batch_splits_data_and_indices() {
        let backend = memory_facade();
        let batch = encode_batch(&backend, &sample_table(), &sample_rows(8));
        assert_eq!(batch.data.len(), 8);
        assert_eq!(batch.indices.len(), 8);
        assert_eq!(batch.data_checksum.sum_kvs(), 8);
        assert_ne!(batch.data_checksum, batch.index_checksum);
    }

    #[test]
    fn with_memory_backend_closes_backend() {
        let inner = with_memory_backend(|backend, _| std::sync::Arc::clone(backend.inner()));
        assert!(inner.is_closed());
    }

    #[test]
    fn cancel_after_fires() {
        let ctx = cancel_after(Duration::from_millis(5));
        assert!(ctx.sleep(Duration::from_secs(10)).is_err());
        assert!(ctx.is_done());
    }
}
