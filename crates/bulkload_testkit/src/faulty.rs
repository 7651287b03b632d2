//! Fault-injecting backend wrapper.
//!
//! [`FaultyBackend`] delegates to any [`AbstractBackend`], records every call
//! it receives and fails calls on demand, so tests can assert exactly how the
//! lifecycle layer retries, gives up or skips steps.

use bulkload_backend::{
    AbstractBackend, BackendError, BackendResult, Context, EngineFileSize, EngineUuid,
    SessionOptions, TableInfo,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A backend operation that can be observed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `open_engine`
    Open,
    /// `write_rows`
    WriteRows,
    /// `close_engine`
    Close,
    /// `import_engine`
    Import,
    /// `cleanup_engine`
    Cleanup,
    /// `reset_engine`
    Reset,
    /// `flush_engine` and `flush_all_engines`
    Flush,
    /// `check_requirements`
    CheckRequirements,
    /// `fetch_remote_table_models`
    FetchSchema,
}

/// The kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A transport error that may succeed on retry.
    Retryable,
    /// The server reported it is busy.
    Busy,
    /// An error that must not be retried.
    Fatal,
}

impl Fault {
    fn to_error(self, op: BackendOp) -> BackendError {
        match self {
            Fault::Retryable => BackendError::transport_retryable(format!("injected {op:?} timeout")),
            Fault::Busy => BackendError::ServerBusy(format!("injected {op:?} busy")),
            Fault::Fatal => BackendError::Rejected(format!("injected {op:?} failure")),
        }
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// The operation.
    pub op: BackendOp,
    /// The engine the call was about, if any.
    pub uuid: Option<EngineUuid>,
    /// When the call was received.
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Faults {
    scripted: HashMap<BackendOp, VecDeque<Fault>>,
    persistent: HashMap<BackendOp, Fault>,
    at: HashMap<(BackendOp, usize), Fault>,
    seen: HashMap<BackendOp, usize>,
}

/// A backend wrapper that records calls and injects failures.
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
    retry_import_delay: Option<Duration>,
}

impl<B: AbstractBackend> FaultyBackend<B> {
    /// Wraps `inner` without any faults.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
            retry_import_delay: None,
        }
    }

    /// Overrides the wrapped backend's import retry delay.
    #[must_use]
    pub fn with_retry_import_delay(mut self, delay: Duration) -> Self {
        self.retry_import_delay = Some(delay);
        self
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Fails the next `times` calls of `op` with `fault`.
    pub fn fail_next(&self, op: BackendOp, fault: Fault, times: usize) {
        let mut faults = self.faults.lock();
        let queue = faults.scripted.entry(op).or_default();
        queue.extend(std::iter::repeat(fault).take(times));
    }

    /// Fails only the `nth` call of `op` from now on, counting from 1.
    ///
    /// Calls before it go through, so a fault can land in the middle of a
    /// chunked write.
    pub fn fail_at(&self, op: BackendOp, nth: usize, fault: Fault) {
        let mut faults = self.faults.lock();
        let target = faults.seen.get(&op).copied().unwrap_or(0) + nth.max(1);
        faults.at.insert((op, target), fault);
    }

    /// Fails every call of `op` with `fault` until cleared.
    pub fn fail_always(&self, op: BackendOp, fault: Fault) {
        self.faults.lock().persistent.insert(op, fault);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.scripted.clear();
        faults.persistent.clear();
        faults.at.clear();
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// The operations received so far, in order.
    pub fn ops(&self) -> Vec<BackendOp> {
        self.calls.lock().iter().map(|c| c.op).collect()
    }

    /// Number of calls of `op` received so far.
    pub fn count(&self, op: BackendOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn intercept(&self, op: BackendOp, uuid: Option<EngineUuid>) -> BackendResult<()> {
        self.calls.lock().push(Call {
            op,
            uuid,
            at: Instant::now(),
        });

        let mut faults = self.faults.lock();
        let seen = {
            let seen = faults.seen.entry(op).or_default();
            *seen += 1;
            *seen
        };
        let fault = faults
            .at
            .remove(&(op, seen))
            .or_else(|| faults.scripted.get_mut(&op).and_then(VecDeque::pop_front))
            .or_else(|| faults.persistent.get(&op).copied());
        match fault {
            Some(fault) => {
                tracing::debug!(?op, ?fault, "injecting fault");
                Err(fault.to_error(op))
            }
            None => Ok(()),
        }
    }
}

impl<B: AbstractBackend> AbstractBackend for FaultyBackend<B> {
    type Rows = B::Rows;
    type Row = B::Row;
    type Encoder = B::Encoder;

    fn close(&self) {
        self.inner.close();
    }

    fn make_empty_rows(&self) -> Self::Rows {
        self.inner.make_empty_rows()
    }

    fn retry_import_delay(&self) -> Duration {
        self.retry_import_delay
            .unwrap_or_else(|| self.inner.retry_import_delay())
    }

    fn max_chunk_size(&self) -> usize {
        self.inner.max_chunk_size()
    }

    fn should_post_process(&self) -> bool {
        self.inner.should_post_process()
    }

    fn new_encoder(&self, table: &TableInfo, options: &SessionOptions) -> Self::Encoder {
        self.inner.new_encoder(table, options)
    }

    fn open_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Open, Some(uuid))?;
        self.inner.open_engine(ctx, uuid)
    }

    fn write_rows(
        &self,
        ctx: &Context,
        uuid: EngineUuid,
        table_name: &str,
        column_names: &[String],
        commit_ts: u64,
        rows: &Self::Rows,
    ) -> BackendResult<()> {
        self.intercept(BackendOp::WriteRows, Some(uuid))?;
        self.inner
            .write_rows(ctx, uuid, table_name, column_names, commit_ts, rows)
    }

    fn close_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Close, Some(uuid))?;
        self.inner.close_engine(ctx, uuid)
    }

    fn import_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Import, Some(uuid))?;
        self.inner.import_engine(ctx, uuid)
    }

    fn cleanup_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Cleanup, Some(uuid))?;
        self.inner.cleanup_engine(ctx, uuid)
    }

    fn check_requirements(&self, ctx: &Context) -> BackendResult<()> {
        self.intercept(BackendOp::CheckRequirements, None)?;
        self.inner.check_requirements(ctx)
    }

    fn fetch_remote_table_models(
        &self,
        ctx: &Context,
        schema_name: &str,
    ) -> BackendResult<Vec<TableInfo>> {
        self.intercept(BackendOp::FetchSchema, None)?;
        self.inner.fetch_remote_table_models(ctx, schema_name)
    }

    fn flush_engine(&self, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Flush, Some(uuid))?;
        self.inner.flush_engine(uuid)
    }

    fn flush_all_engines(&self) -> BackendResult<()> {
        self.intercept(BackendOp::Flush, None)?;
        self.inner.flush_all_engines()
    }

    fn engine_file_sizes(&self) -> Vec<EngineFileSize> {
        self.inner.engine_file_sizes()
    }

    fn reset_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.intercept(BackendOp::Reset, Some(uuid))?;
        self.inner.reset_engine(ctx, uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_backend::{make_uuid, InMemoryBackend};

    #[test]
    fn scripted_faults_are_consumed_in_order() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        let ctx = Context::background();
        let (_, uuid) = make_uuid("t", 0);
        backend.fail_next(BackendOp::Open, Fault::Retryable, 1);
        backend.fail_next(BackendOp::Open, Fault::Fatal, 1);

        assert!(backend.open_engine(&ctx, uuid).unwrap_err().is_retryable());
        assert!(!backend.open_engine(&ctx, uuid).unwrap_err().is_retryable());
        backend.open_engine(&ctx, uuid).unwrap();
        assert_eq!(backend.count(BackendOp::Open), 3);
    }

    #[test]
    fn positional_fault_hits_one_call() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        let ctx = Context::background();
        backend.check_requirements(&ctx).unwrap();
        backend.fail_at(BackendOp::CheckRequirements, 2, Fault::Fatal);

        backend.check_requirements(&ctx).unwrap();
        assert!(backend.check_requirements(&ctx).is_err());
        backend.check_requirements(&ctx).unwrap();
        assert_eq!(backend.count(BackendOp::CheckRequirements), 4);
    }

    #[test]
    fn persistent_faults_until_cleared() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        let ctx = Context::background();
        backend.fail_always(BackendOp::CheckRequirements, Fault::Busy);
        assert!(backend.check_requirements(&ctx).is_err());
        assert!(backend.check_requirements(&ctx).is_err());
        backend.clear_faults();
        backend.check_requirements(&ctx).unwrap();
    }

    #[test]
    fn calls_carry_engine_identity() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        let ctx = Context::background();
        let (_, uuid) = make_uuid("t", 4);
        backend.open_engine(&ctx, uuid).unwrap();
        backend.close_engine(&ctx, uuid).unwrap();

        assert_eq!(backend.ops(), vec![BackendOp::Open, BackendOp::Close]);
        assert!(backend.calls().iter().all(|c| c.uuid == Some(uuid)));
        backend.clear_calls();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn delay_override() {
        let backend = FaultyBackend::new(InMemoryBackend::new().with_retry_import_delay(Duration::from_secs(2)));
        assert_eq!(backend.retry_import_delay(), Duration::from_secs(2));
        let backend = backend.with_retry_import_delay(Duration::from_millis(1));
        assert_eq!(backend.retry_import_delay(), Duration::from_millis(1));
    }
}
