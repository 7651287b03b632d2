//! Backend capability trait definition.

use crate::context::Context;
use crate::encode::{Encoder, Row, Rows, SessionOptions};
use crate::error::BackendResult;
use crate::identity::EngineUuid;
use crate::schema::TableInfo;
use std::time::Duration;

/// Local disk footprint of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFileSize {
    /// Engine identity.
    pub uuid: EngineUuid,
    /// Bytes occupied on local disk.
    pub size: i64,
    /// Whether the engine is currently being imported.
    pub is_importing: bool,
}

impl EngineFileSize {
    /// Creates a size record.
    pub const fn new(uuid: EngineUuid, size: i64, is_importing: bool) -> Self {
        Self {
            uuid,
            size,
            is_importing,
        }
    }
}

/// The capability surface every storage technology implements.
///
/// Implementations must be `Send + Sync`: a single instance is shared by all
/// table-loading workers and any method may be called from any thread. The
/// backend owns the physical engines (files, remote sessions) and whatever
/// per-engine state it keeps must be synchronized internally.
///
/// Every fallible operation may fail with a backend-specific error; the
/// lifecycle layer decides whether to retry through
/// [`BackendError::is_retryable`](crate::BackendError::is_retryable).
///
/// # Implementors
///
/// - [`crate::InMemoryBackend`] - For testing
pub trait AbstractBackend: Send + Sync {
    /// Collection of encoded rows accepted by [`AbstractBackend::write_rows`].
    type Rows: Rows;
    /// A single encoded row.
    type Row: Row<Rows = Self::Rows>;
    /// Row encoder produced by [`AbstractBackend::new_encoder`].
    type Encoder: Encoder<Row = Self::Row>;

    /// Closes the connection to the backend.
    fn close(&self);

    /// Creates an empty collection of encoded rows.
    fn make_empty_rows(&self) -> Self::Rows;

    /// Delay between two import attempts.
    fn retry_import_delay(&self) -> Duration;

    /// Maximum chunk size in bytes accepted by one `write_rows` call.
    fn max_chunk_size(&self) -> usize;

    /// Whether checksum and analyze should run after import.
    fn should_post_process(&self) -> bool;

    /// Creates an encoder for rows of `table`.
    fn new_encoder(&self, table: &TableInfo, options: &SessionOptions) -> Self::Encoder;

    /// Materializes the engine so it can accept writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    fn open_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()>;

    /// Writes one chunk of rows into an open engine.
    ///
    /// Each call must be all-or-nothing: a failed call leaves no part of
    /// `rows` in the engine, so the chunk can be retried as a whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the engine is not open.
    fn write_rows(
        &self,
        ctx: &Context,
        uuid: EngineUuid,
        table_name: &str,
        column_names: &[String],
        commit_ts: u64,
        rows: &Self::Rows,
    ) -> BackendResult<()>;

    /// Seals the engine so that it can be imported.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be closed.
    fn close_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()>;

    /// Imports the engine content into the target.
    ///
    /// Must be idempotent: the retry loop may call it again after a transient
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the import fails.
    fn import_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()>;

    /// Deletes the intermediate data of the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails.
    fn cleanup_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()>;

    /// Checks that the backend satisfies the version requirements.
    ///
    /// # Errors
    ///
    /// Returns an error describing the unmet requirement.
    fn check_requirements(&self, ctx: &Context) -> BackendResult<()>;

    /// Obtains the models of all tables in `schema_name`.
    ///
    /// The returned models need not be precise, but must satisfy
    /// [`TableInfo::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    fn fetch_remote_table_models(
        &self,
        ctx: &Context,
        schema_name: &str,
    ) -> BackendResult<Vec<TableInfo>>;

    /// Makes every write accepted so far durable, so that killing the process
    /// and resuming from checkpoint recovers exactly that content.
    ///
    /// Only relevant for backends that keep engines locally; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing fails.
    fn flush_engine(&self, uuid: EngineUuid) -> BackendResult<()>;

    /// Flushes all open engines. Expensive; meant for disk quota handling.
    ///
    /// # Errors
    ///
    /// Returns an error if any engine fails to flush.
    fn flush_all_engines(&self) -> BackendResult<()>;

    /// Local disk usage of every engine. Empty if content lives remotely.
    fn engine_file_sizes(&self) -> Vec<EngineFileSize>;

    /// Clears all content of an open engine, keeping it open.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reset.
    fn reset_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()>;
}
