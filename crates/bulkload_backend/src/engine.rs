//! Opened and closed engine handles.
//!
//! Usual workflow:
//!
//! 1. Create a [`Backend`](crate::Backend) for the whole process.
//! 2. For each table, split the data files into batches of roughly equal
//!    size, and for each batch:
//!    - obtain an [`OpenedEngine`] via `Backend::open_engine`,
//!    - deliver every chunk with [`OpenedEngine::write_rows`],
//!    - seal it into a [`ClosedEngine`] with [`OpenedEngine::close`],
//!    - [`ClosedEngine::import`] the data, then [`ClosedEngine::cleanup`].
//! 3. Call `Backend::close`.

use crate::backend::AbstractBackend;
use crate::context::Context;
use crate::encode::Rows;
use crate::error::{BackendError, BackendResult};
use crate::identity::EngineUuid;
use crate::logging::EngineLogger;
use crate::stats::EngineCounters;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Accepting writes.
    Opened,
    /// Sealed, waiting to be imported.
    Closed,
    /// Content committed to the target.
    Imported,
    /// Intermediate data deleted.
    CleanedUp,
}

impl EngineState {
    /// Returns true if rows may be written.
    pub fn can_write(&self) -> bool {
        matches!(self, EngineState::Opened)
    }

    /// Returns true if the engine may be imported through the normal
    /// sequence. Re-importing an imported engine is allowed since imports
    /// are idempotent.
    pub fn can_import(&self) -> bool {
        matches!(self, EngineState::Closed | EngineState::Imported)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Opened => "opened",
            EngineState::Closed => "closed",
            EngineState::Imported => "imported",
            EngineState::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

/// State shared by both phases of an engine.
pub(crate) struct EngineCore<B: AbstractBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) logger: EngineLogger,
    pub(crate) uuid: EngineUuid,
    pub(crate) max_retry_times: u32,
}

impl<B: AbstractBackend> Clone for EngineCore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            logger: self.logger.clone(),
            uuid: self.uuid,
            max_retry_times: self.max_retry_times,
        }
    }
}

impl<B: AbstractBackend> EngineCore<B> {
    pub(crate) fn new(
        backend: Arc<B>,
        logger: EngineLogger,
        uuid: EngineUuid,
        max_retry_times: u32,
    ) -> Self {
        Self {
            backend,
            logger,
            uuid,
            max_retry_times: max_retry_times.max(1),
        }
    }

    /// Closes the engine without touching the counters.
    pub(crate) fn unsafe_close(&self, ctx: &Context) -> BackendResult<ClosedEngine<B>> {
        let task = self.logger.begin(Level::INFO, "engine close");
        let result = ctx
            .check()
            .and_then(|()| self.backend.close_engine(ctx, self.uuid));
        task.end(Level::ERROR, &result);
        result?;
        Ok(ClosedEngine { core: self.clone() })
    }
}

/// An opened engine, accepting data through [`OpenedEngine::write_rows`].
///
/// This type is thread safe: an instance can be shared and any method called
/// from anywhere.
pub struct OpenedEngine<B: AbstractBackend> {
    core: EngineCore<B>,
    counters: Arc<EngineCounters>,
    closed: AtomicBool,
    table_name: String,
    ts: u64,
}

impl<B: AbstractBackend> OpenedEngine<B> {
    pub(crate) fn new(
        core: EngineCore<B>,
        counters: Arc<EngineCounters>,
        table_name: String,
        ts: u64,
    ) -> Self {
        Self {
            core,
            counters,
            closed: AtomicBool::new(false),
            table_name,
            ts,
        }
    }

    /// The engine identity.
    pub fn uuid(&self) -> EngineUuid {
        self.core.uuid
    }

    /// The table this engine belongs to.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Commit timestamp attached to every write, fixed at open time.
    pub fn commit_ts(&self) -> u64 {
        self.ts
    }

    /// The engine's logger.
    pub fn logger(&self) -> &EngineLogger {
        &self.core.logger
    }

    /// Writes a collection of encoded rows into the engine.
    ///
    /// The rows are split into chunks of at most the backend's maximum chunk
    /// size and written one after another, in order. A chunk failing with a
    /// retryable error is written again, up to the configured number of
    /// attempts; any other error is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or
    /// [`BackendError::RetryExhausted`] naming the table when a chunk kept
    /// failing.
    pub fn write_rows(
        &self,
        ctx: &Context,
        column_names: &[String],
        rows: &B::Rows,
    ) -> BackendResult<()> {
        let backend = &self.core.backend;
        let max_retry_times = self.core.max_retry_times;

        for chunk in rows.split_into_chunks(backend.max_chunk_size()) {
            let mut attempt = 0;
            loop {
                attempt += 1;
                ctx.check()?;
                let err = match backend.write_rows(
                    ctx,
                    self.core.uuid,
                    &self.table_name,
                    column_names,
                    self.ts,
                    &chunk,
                ) {
                    Ok(()) => break,
                    Err(err) => err,
                };
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt >= max_retry_times {
                    return Err(BackendError::RetryExhausted {
                        target: self.table_name.clone(),
                        operation: "write rows",
                        attempts: max_retry_times,
                        source: Box::new(err),
                    });
                }
                let _entered = self.core.logger.span().enter();
                tracing::debug!(retry_cnt = attempt, error = %err, "write rows failed, retrying chunk");
            }
        }

        Ok(())
    }

    /// Flushes the data written so far. Only meaningful for local backends.
    ///
    /// # Errors
    ///
    /// Returns the backend's flush error.
    pub fn flush(&self) -> BackendResult<()> {
        self.core.backend.flush_engine(self.core.uuid)
    }

    /// Closes the engine to prepare it for importing.
    ///
    /// On failure the engine stays open and this handle remains usable.
    /// Closing again through the same handle reaches the backend but is
    /// counted only once.
    ///
    /// # Errors
    ///
    /// Returns the backend's close error.
    pub fn close(&self, ctx: &Context) -> BackendResult<ClosedEngine<B>> {
        let closed = self.core.unsafe_close(ctx)?;
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.counters.record_close();
        }
        Ok(closed)
    }
}

impl<B: AbstractBackend> fmt::Debug for OpenedEngine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedEngine")
            .field("tag", &self.core.logger.tag())
            .field("uuid", &self.core.uuid)
            .field("table_name", &self.table_name)
            .field("ts", &self.ts)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// A closed engine, ready to be imported into the target.
///
/// This type is thread safe: an instance can be shared and any method called
/// from anywhere.
pub struct ClosedEngine<B: AbstractBackend> {
    core: EngineCore<B>,
}

impl<B: AbstractBackend> ClosedEngine<B> {
    pub(crate) fn from_core(core: EngineCore<B>) -> Self {
        Self { core }
    }

    /// The engine identity.
    pub fn uuid(&self) -> EngineUuid {
        self.core.uuid
    }

    /// The engine's logger.
    pub fn logger(&self) -> &EngineLogger {
        &self.core.logger
    }

    /// Imports the data written to the engine into the target.
    ///
    /// Retryable failures are retried up to the configured number of attempts,
    /// sleeping the backend's retry delay in between. The sleep is cut short if
    /// `ctx` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or
    /// [`BackendError::RetryExhausted`] naming the engine when every attempt
    /// failed.
    pub fn import(&self, ctx: &Context) -> BackendResult<()> {
        let backend = &self.core.backend;
        let max_retry_times = self.core.max_retry_times;

        let mut retry_cnt = 0;
        loop {
            ctx.check()?;
            let task = self
                .core
                .logger
                .begin_attempt(Level::INFO, "import", Some(retry_cnt));
            let err = match backend.import_engine(ctx, self.core.uuid) {
                Ok(()) => {
                    task.done();
                    return Ok(());
                }
                Err(err) => err,
            };
            if !err.is_retryable() {
                let result = Err(err);
                task.end(Level::ERROR, &result);
                return result;
            }
            task.warn("import spuriously failed, going to retry again", &err);

            retry_cnt += 1;
            if retry_cnt >= max_retry_times {
                return Err(BackendError::RetryExhausted {
                    target: self.core.uuid.to_string(),
                    operation: "import",
                    attempts: max_retry_times,
                    source: Box::new(err),
                });
            }
            ctx.sleep(backend.retry_import_delay())?;
        }
    }

    /// Deletes the intermediate data from the target.
    ///
    /// Failures are logged as warnings and returned; the caller decides how
    /// severe they are.
    ///
    /// # Errors
    ///
    /// Returns the backend's cleanup error.
    pub fn cleanup(&self, ctx: &Context) -> BackendResult<()> {
        let task = self.core.logger.begin(Level::INFO, "cleanup");
        let result = ctx
            .check()
            .and_then(|()| self.core.backend.cleanup_engine(ctx, self.core.uuid));
        task.end(Level::WARN, &result);
        result
    }
}

impl<B: AbstractBackend> fmt::Debug for ClosedEngine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedEngine")
            .field("tag", &self.core.logger.tag())
            .field("uuid", &self.core.uuid)
            .finish()
    }
}
