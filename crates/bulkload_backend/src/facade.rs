//! The delivery target: one facade over one backend.

use crate::backend::AbstractBackend;
use crate::config::BackendConfig;
use crate::context::Context;
use crate::encode::SessionOptions;
use crate::engine::{EngineCore, OpenedEngine};
use crate::error::BackendResult;
use crate::guard::{EngineCountGuard, EngineCountLimit, NoopGuard};
use crate::identity::{current_commit_ts, make_uuid};
use crate::logging::EngineLogger;
use crate::quota::{check_disk_quota, DiskQuotaReport};
use crate::recovery::EngineRecovery;
use crate::schema::TableInfo;
use crate::stats::EngineCounters;
use std::fmt;
use std::sync::Arc;

/// The delivery target of a load.
///
/// Wraps exactly one [`AbstractBackend`] for the whole process. Cloning is
/// cheap and every clone shares the backend, the counters and the guard, so a
/// single facade can be handed to any number of table-loading workers.
pub struct Backend<B: AbstractBackend> {
    inner: Arc<B>,
    config: BackendConfig,
    counters: Arc<EngineCounters>,
    guard: Arc<dyn EngineCountGuard>,
}

impl<B: AbstractBackend> Clone for Backend<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<B: AbstractBackend> Backend<B> {
    /// Creates a facade with the default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, BackendConfig::default())
    }

    /// Creates a facade with the given configuration.
    pub fn with_config(backend: B, config: BackendConfig) -> Self {
        Self::from_arc(Arc::new(backend), config)
    }

    /// Creates a facade over a backend that is already shared.
    pub fn from_arc(backend: Arc<B>, config: BackendConfig) -> Self {
        let guard: Arc<dyn EngineCountGuard> = match config.engine_count_limit {
            Some(limit) => Arc::new(EngineCountLimit::new(limit)),
            None => Arc::new(NoopGuard),
        };
        Self {
            inner: backend,
            config,
            counters: Arc::new(EngineCounters::new()),
            guard,
        }
    }

    /// Uses `counters` instead of the facade's own.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<EngineCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Replaces the engine-count guard.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<dyn EngineCountGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    /// The facade configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// The opened/closed engine counters.
    pub fn counters(&self) -> &Arc<EngineCounters> {
        &self.counters
    }

    /// Closes the connection to the backend.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Creates an empty collection of encoded rows.
    pub fn make_empty_rows(&self) -> B::Rows {
        self.inner.make_empty_rows()
    }

    /// Creates an encoder for rows of `table`.
    pub fn new_encoder(&self, table: &TableInfo, options: &SessionOptions) -> B::Encoder {
        self.inner.new_encoder(table, options)
    }

    /// Whether checksum and analyze should run after import.
    pub fn should_post_process(&self) -> bool {
        self.inner.should_post_process()
    }

    /// Checks the backend's version requirements.
    ///
    /// # Errors
    ///
    /// Returns the backend's error describing the unmet requirement.
    pub fn check_requirements(&self, ctx: &Context) -> BackendResult<()> {
        self.inner.check_requirements(ctx)
    }

    /// Obtains the models of all tables in `schema_name`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the schema cannot be read.
    pub fn fetch_remote_table_models(
        &self,
        ctx: &Context,
        schema_name: &str,
    ) -> BackendResult<Vec<TableInfo>> {
        self.inner.fetch_remote_table_models(ctx, schema_name)
    }

    /// Flushes every open engine. Expensive; use only before resolving a disk
    /// quota violation.
    ///
    /// # Errors
    ///
    /// Returns the backend's flush error.
    pub fn flush_all(&self) -> BackendResult<()> {
        self.inner.flush_all_engines()
    }

    /// Checks whether the local engines fit in `quota` bytes.
    ///
    /// Returns the engines that should be imported early to bring the total
    /// size back under the quota. See [`check_disk_quota`] for the ranking.
    pub fn check_disk_quota(&self, quota: i64) -> DiskQuotaReport {
        check_disk_quota(self.inner.engine_file_sizes(), quota)
    }

    /// Opens the engine identified by `table_name` and `engine_id`.
    ///
    /// Opening is not retried; backend errors are returned as is.
    ///
    /// # Errors
    ///
    /// Returns the backend's open error.
    ///
    /// # Panics
    ///
    /// Panics if the configured engine-count guard fires.
    pub fn open_engine(
        &self,
        ctx: &Context,
        table_name: &str,
        engine_id: i32,
    ) -> BackendResult<OpenedEngine<B>> {
        let (tag, uuid) = make_uuid(table_name, engine_id);
        let logger = EngineLogger::new(tag, uuid);

        ctx.check()?;
        self.inner.open_engine(ctx, uuid)?;
        self.counters.record_open();
        logger.info("open engine");

        self.guard.check(self.counters.snapshot());

        let core = EngineCore::new(
            Arc::clone(&self.inner),
            logger,
            uuid,
            self.config.max_retry_times(),
        );
        Ok(OpenedEngine::new(
            core,
            Arc::clone(&self.counters),
            table_name.to_string(),
            current_commit_ts(),
        ))
    }

    /// Operations that skip the normal open → write → close → import
    /// sequence, for checkpoint resumption and disk quota enforcement.
    pub fn recovery(&self) -> EngineRecovery<'_, B> {
        EngineRecovery::new(self)
    }
}

impl<B: AbstractBackend> fmt::Debug for Backend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .field("counters", &self.counters.snapshot())
            .field("guard", &self.guard)
            .finish()
    }
}
