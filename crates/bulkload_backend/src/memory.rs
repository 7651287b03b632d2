//! In-memory backend for testing.

use crate::backend::{AbstractBackend, EngineFileSize};
use crate::checksum::KvChecksum;
use crate::context::Context;
use crate::encode::{Datum, Encoder, KvPair, Row, Rows, SessionOptions};
use crate::engine::EngineState;
use crate::error::{BackendError, BackendResult};
use crate::identity::EngineUuid;
use crate::schema::TableInfo;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

/// Default maximum chunk size of the in-memory backend.
pub const DEFAULT_MEMORY_CHUNK_SIZE: usize = 16 * 1024;

/// A collection of KV pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRows(Vec<KvPair>);

impl MemoryRows {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection from pairs.
    pub fn from_pairs(pairs: Vec<KvPair>) -> Self {
        Self(pairs)
    }

    /// Appends one pair.
    pub fn push(&mut self, pair: KvPair) {
        self.0.push(pair);
    }

    /// The pairs in insertion order.
    pub fn pairs(&self) -> &[KvPair] {
        &self.0
    }

    /// Consumes the collection.
    pub fn into_pairs(self) -> Vec<KvPair> {
        self.0
    }

    /// Total key and value bytes.
    pub fn byte_size(&self) -> usize {
        self.0.iter().map(KvPair::size).sum()
    }
}

impl Rows for MemoryRows {
    fn split_into_chunks(&self, split_size: usize) -> Vec<Self> {
        if self.0.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::with_capacity(1);
        let mut start = 0;
        let mut cum_size = 0;
        for (i, pair) in self.0.iter().enumerate() {
            let size = pair.size();
            if start < i && cum_size + size > split_size {
                chunks.push(Self(self.0[start..i].to_vec()));
                start = i;
                cum_size = 0;
            }
            cum_size += size;
        }
        chunks.push(Self(self.0[start..].to_vec()));
        chunks
    }

    fn clear(mut self) -> Self {
        self.0.clear();
        self
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// One encoded row: a data pair plus one pair per secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    data: KvPair,
    indices: Vec<KvPair>,
}

impl MemoryRow {
    /// The record pair.
    pub fn data(&self) -> &KvPair {
        &self.data
    }

    /// The index pairs.
    pub fn indices(&self) -> &[KvPair] {
        &self.indices
    }
}

impl Row for MemoryRow {
    type Rows = MemoryRows;

    fn classify_and_append(
        self,
        data: &mut MemoryRows,
        data_checksum: &mut KvChecksum,
        indices: &mut MemoryRows,
        index_checksum: &mut KvChecksum,
    ) {
        data_checksum.update_one(&self.data.key, &self.data.val);
        data.push(self.data);
        for pair in self.indices {
            index_checksum.update_one(&pair.key, &pair.val);
            indices.push(pair);
        }
    }
}

fn encode_comparable_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
}

/// Key of the record with handle `handle` in table `table_id`.
pub fn record_key(table_id: i64, handle: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(19);
    key.push(b't');
    encode_comparable_i64(&mut key, table_id);
    key.extend_from_slice(b"_r");
    encode_comparable_i64(&mut key, handle);
    key
}

/// Prefix shared by all record keys of a table.
pub fn record_prefix(table_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(11);
    key.push(b't');
    encode_comparable_i64(&mut key, table_id);
    key.extend_from_slice(b"_r");
    key
}

/// Prefix shared by all keys of one index.
pub fn index_prefix(table_id: i64, index_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(19);
    key.push(b't');
    encode_comparable_i64(&mut key, table_id);
    key.extend_from_slice(b"_i");
    encode_comparable_i64(&mut key, index_id);
    key
}

fn to_cbor<T: serde::Serialize>(value: &T) -> BackendResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Encoder producing [`MemoryRow`]s with CBOR-encoded values.
#[derive(Debug, Clone)]
pub struct MemoryEncoder {
    table: TableInfo,
    options: SessionOptions,
    closed: bool,
}

impl MemoryEncoder {
    /// Creates an encoder for `table`.
    pub fn new(table: TableInfo, options: SessionOptions) -> Self {
        Self {
            table,
            options,
            closed: false,
        }
    }

    /// The session options the encoder was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn mismatch(&self, message: String) -> BackendError {
        BackendError::SchemaMismatch {
            table: self.table.name.clone(),
            message,
        }
    }

    fn permute(&self, row: &[Datum], column_permutation: &[i32]) -> BackendResult<Vec<Datum>> {
        let columns = self.table.columns.len();
        if column_permutation.is_empty() {
            if row.len() != columns {
                return Err(self.mismatch(format!(
                    "row has {} values, table has {} columns",
                    row.len(),
                    columns
                )));
            }
            return Ok(row.to_vec());
        }

        (0..columns)
            .map(|i| match column_permutation.get(i).copied().unwrap_or(-1) {
                pos if pos < 0 => Ok(Datum::Null),
                pos => row.get(pos as usize).cloned().ok_or_else(|| {
                    self.mismatch(format!(
                        "column {} maps to value {} but row has {} values",
                        self.table.columns[i].name,
                        pos,
                        row.len()
                    ))
                }),
            })
            .collect()
    }
}

impl Encoder for MemoryEncoder {
    type Row = MemoryRow;

    fn encode(
        &mut self,
        span: &Span,
        row: &[Datum],
        row_id: i64,
        column_permutation: &[i32],
    ) -> BackendResult<MemoryRow> {
        if self.closed {
            return Err(BackendError::Encode("encoder is closed".into()));
        }
        let values = self.permute(row, column_permutation)?;

        let handle = match (self.table.pk_is_handle, values.first()) {
            (true, Some(Datum::Int(v))) => *v,
            (true, Some(Datum::Uint(v))) => i64::try_from(*v).map_err(|_| {
                self.mismatch(format!("primary key {v} does not fit a row handle"))
            })?,
            (true, Some(other)) => {
                let _entered = span.enter();
                tracing::warn!(value = ?other, "primary key is not an integer");
                return Err(self.mismatch("integer primary key expected".into()));
            }
            _ => row_id,
        };

        let data = KvPair::new(record_key(self.table.id, handle), to_cbor(&values)?);

        let mut indices = Vec::with_capacity(self.table.indices.len());
        for index in &self.table.indices {
            let indexed = index
                .columns
                .iter()
                .map(|&c| {
                    values.get(c).ok_or_else(|| {
                        self.mismatch(format!("index {} refers to column offset {}", index.name, c))
                    })
                })
                .collect::<BackendResult<Vec<&Datum>>>()?;
            let mut key = index_prefix(self.table.id, index.id);
            key.extend_from_slice(&to_cbor(&indexed)?);
            encode_comparable_i64(&mut key, handle);
            indices.push(KvPair::new(key, handle.to_be_bytes().to_vec()));
        }

        Ok(MemoryRow { data, indices })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug)]
struct MemoryEngine {
    state: EngineState,
    pending: Vec<KvPair>,
    flushed: usize,
    importing: bool,
    commit_ts: Option<u64>,
}

impl MemoryEngine {
    fn new(state: EngineState) -> Self {
        Self {
            state,
            pending: Vec::new(),
            flushed: 0,
            importing: false,
            commit_ts: None,
        }
    }

    fn size(&self) -> i64 {
        self.pending.iter().map(KvPair::size).sum::<usize>() as i64
    }
}

fn invalid_state(uuid: EngineUuid, state: EngineState, operation: &'static str) -> BackendError {
    BackendError::InvalidEngineState {
        uuid,
        state: state.to_string(),
        operation,
    }
}

/// Callback run while an import is in flight, after the engine is marked as
/// importing and before its pairs reach the target.
pub type ImportHook = Arc<dyn Fn(&InMemoryBackend, EngineUuid) + Send + Sync>;

/// A backend keeping engines and the import target in memory.
///
/// This backend is suitable for:
/// - Unit and integration tests of the engine lifecycle
/// - Dry runs that only need to exercise encoding and chunking
///
/// Imports copy the engine content into a sorted KV map standing in for the
/// target cluster. Putting the same pair twice is harmless, which makes
/// imports idempotent.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
pub struct InMemoryBackend {
    engines: RwLock<HashMap<EngineUuid, MemoryEngine>>,
    target: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    schemas: RwLock<HashMap<String, Vec<TableInfo>>>,
    max_chunk_size: usize,
    retry_import_delay: Duration,
    post_process: bool,
    import_hook: Option<ImportHook>,
    closed: AtomicBool,
}

impl fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("engines", &self.engines.read().len())
            .field("imported", &self.target.read().len())
            .field("max_chunk_size", &self.max_chunk_size)
            .field("retry_import_delay", &self.retry_import_delay)
            .field("post_process", &self.post_process)
            .field("import_hook", &self.import_hook.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            target: RwLock::new(BTreeMap::new()),
            schemas: RwLock::new(HashMap::new()),
            max_chunk_size: DEFAULT_MEMORY_CHUNK_SIZE,
            retry_import_delay: Duration::ZERO,
            post_process: true,
            import_hook: None,
            closed: AtomicBool::new(false),
        }
    }
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum chunk size.
    #[must_use]
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Sets the delay between import attempts.
    #[must_use]
    pub fn with_retry_import_delay(mut self, delay: Duration) -> Self {
        self.retry_import_delay = delay;
        self
    }

    /// Sets whether post-processing should run after import.
    #[must_use]
    pub fn with_post_process(mut self, post_process: bool) -> Self {
        self.post_process = post_process;
        self
    }

    /// Installs a callback observing every import while it is in flight.
    #[must_use]
    pub fn with_import_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InMemoryBackend, EngineUuid) + Send + Sync + 'static,
    {
        self.import_hook = Some(Arc::new(hook));
        self
    }

    /// Registers a table served by `fetch_remote_table_models`.
    pub fn register_table(&self, schema: &str, table: TableInfo) {
        self.schemas
            .write()
            .entry(schema.to_string())
            .or_default()
            .push(table);
    }

    /// Current lifecycle state of an engine.
    pub fn engine_state(&self, uuid: EngineUuid) -> Option<EngineState> {
        self.engines.read().get(&uuid).map(|e| e.state)
    }

    /// Pairs written to an engine and not yet reset or cleaned up.
    pub fn pending_pairs(&self, uuid: EngineUuid) -> Vec<KvPair> {
        self.engines
            .read()
            .get(&uuid)
            .map(|e| e.pending.clone())
            .unwrap_or_default()
    }

    /// Number of pairs of an engine covered by the last flush.
    pub fn flushed_pairs(&self, uuid: EngineUuid) -> usize {
        self.engines.read().get(&uuid).map_or(0, |e| e.flushed)
    }

    /// Commit timestamp of the last write to an engine.
    pub fn commit_ts(&self, uuid: EngineUuid) -> Option<u64> {
        self.engines.read().get(&uuid).and_then(|e| e.commit_ts)
    }

    /// Marks an engine as being imported, as seen by `engine_file_sizes`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::EngineNotFound`] for an unknown engine.
    pub fn set_importing(&self, uuid: EngineUuid, importing: bool) -> BackendResult<()> {
        let mut engines = self.engines.write();
        let engine = engines
            .get_mut(&uuid)
            .ok_or(BackendError::EngineNotFound(uuid))?;
        engine.importing = importing;
        Ok(())
    }

    /// All pairs imported into the target, in key order.
    pub fn imported_pairs(&self) -> Vec<KvPair> {
        self.target
            .read()
            .iter()
            .map(|(k, v)| KvPair::new(k.clone(), v.clone()))
            .collect()
    }

    /// Imported pairs whose key starts with `prefix`.
    pub fn imported_with_prefix(&self, prefix: &[u8]) -> Vec<KvPair> {
        self.target
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair::new(k.clone(), v.clone()))
            .collect()
    }

    /// Returns true once `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self, ctx: &Context) -> BackendResult<()> {
        if self.is_closed() {
            return Err(BackendError::Rejected("backend is closed".into()));
        }
        ctx.check()
    }
}

impl AbstractBackend for InMemoryBackend {
    type Rows = MemoryRows;
    type Row = MemoryRow;
    type Encoder = MemoryEncoder;

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn make_empty_rows(&self) -> MemoryRows {
        MemoryRows::new()
    }

    fn retry_import_delay(&self) -> Duration {
        self.retry_import_delay
    }

    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    fn should_post_process(&self) -> bool {
        self.post_process
    }

    fn new_encoder(&self, table: &TableInfo, options: &SessionOptions) -> MemoryEncoder {
        MemoryEncoder::new(table.clone(), options.clone())
    }

    fn open_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.check_open(ctx)?;
        let mut engines = self.engines.write();
        match engines.get_mut(&uuid) {
            None => {
                engines.insert(uuid, MemoryEngine::new(EngineState::Opened));
                Ok(())
            }
            Some(engine) => match engine.state {
                EngineState::Opened => Ok(()),
                EngineState::CleanedUp => {
                    *engine = MemoryEngine::new(EngineState::Opened);
                    Ok(())
                }
                state => Err(invalid_state(uuid, state, "open")),
            },
        }
    }

    fn write_rows(
        &self,
        ctx: &Context,
        uuid: EngineUuid,
        _table_name: &str,
        _column_names: &[String],
        commit_ts: u64,
        rows: &MemoryRows,
    ) -> BackendResult<()> {
        self.check_open(ctx)?;
        let mut engines = self.engines.write();
        let engine = engines
            .get_mut(&uuid)
            .ok_or(BackendError::EngineNotFound(uuid))?;
        if !engine.state.can_write() {
            return Err(invalid_state(uuid, engine.state, "write rows"));
        }
        engine.pending.extend_from_slice(rows.pairs());
        engine.commit_ts = Some(commit_ts);
        Ok(())
    }

    fn close_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.check_open(ctx)?;
        let mut engines = self.engines.write();
        let engine = engines
            .entry(uuid)
            .or_insert_with(|| MemoryEngine::new(EngineState::Closed));
        match engine.state {
            EngineState::Opened => {
                engine.state = EngineState::Closed;
                Ok(())
            }
            EngineState::Closed | EngineState::Imported => Ok(()),
            EngineState::CleanedUp => Err(invalid_state(uuid, engine.state, "close")),
        }
    }

    fn import_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.check_open(ctx)?;
        let pending = {
            let mut engines = self.engines.write();
            let engine = engines
                .get_mut(&uuid)
                .ok_or(BackendError::EngineNotFound(uuid))?;
            if engine.state == EngineState::CleanedUp {
                return Err(invalid_state(uuid, engine.state, "import"));
            }
            engine.importing = true;
            engine.pending.clone()
        };

        // The engine lock is released so size reports see the import in flight.
        if let Some(hook) = &self.import_hook {
            hook(self, uuid);
        }
        {
            let mut target = self.target.write();
            for pair in pending {
                target.insert(pair.key, pair.val);
            }
        }

        if let Some(engine) = self.engines.write().get_mut(&uuid) {
            engine.importing = false;
            // An opened engine is being force-imported and stays writable.
            if engine.state.can_import() {
                engine.state = EngineState::Imported;
            }
        }
        Ok(())
    }

    fn cleanup_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        ctx.check()?;
        if let Some(engine) = self.engines.write().get_mut(&uuid) {
            engine.state = EngineState::CleanedUp;
            engine.pending = Vec::new();
            engine.flushed = 0;
            engine.importing = false;
        }
        Ok(())
    }

    fn check_requirements(&self, ctx: &Context) -> BackendResult<()> {
        self.check_open(ctx)
    }

    fn fetch_remote_table_models(
        &self,
        ctx: &Context,
        schema_name: &str,
    ) -> BackendResult<Vec<TableInfo>> {
        self.check_open(ctx)?;
        self.schemas
            .read()
            .get(schema_name)
            .cloned()
            .ok_or_else(|| BackendError::RemoteSchema {
                schema: schema_name.to_string(),
                message: "unknown schema".into(),
            })
    }

    fn flush_engine(&self, uuid: EngineUuid) -> BackendResult<()> {
        let mut engines = self.engines.write();
        let engine = engines
            .get_mut(&uuid)
            .ok_or(BackendError::EngineNotFound(uuid))?;
        engine.flushed = engine.pending.len();
        Ok(())
    }

    fn flush_all_engines(&self) -> BackendResult<()> {
        for engine in self.engines.write().values_mut() {
            engine.flushed = engine.pending.len();
        }
        Ok(())
    }

    fn engine_file_sizes(&self) -> Vec<EngineFileSize> {
        self.engines
            .read()
            .iter()
            .filter(|(_, e)| e.state != EngineState::CleanedUp)
            .map(|(uuid, e)| EngineFileSize::new(*uuid, e.size(), e.importing))
            .collect()
    }

    fn reset_engine(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        self.check_open(ctx)?;
        let mut engines = self.engines.write();
        let engine = engines
            .get_mut(&uuid)
            .ok_or(BackendError::EngineNotFound(uuid))?;
        if engine.state == EngineState::CleanedUp {
            return Err(invalid_state(uuid, engine.state, "reset"));
        }
        engine.pending.clear();
        engine.flushed = 0;
        engine.state = EngineState::Opened;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::make_uuid;

    fn pair(key: &str, val_len: usize) -> KvPair {
        KvPair::new(key.as_bytes().to_vec(), vec![0u8; val_len])
    }

    fn ctx() -> Context {
        Context::background()
    }

    #[test]
    fn split_empty_rows() {
        assert!(MemoryRows::new().split_into_chunks(10).is_empty());
    }

    #[test]
    fn split_respects_bound() {
        // Each pair is 1 + 4 = 5 bytes.
        let rows = MemoryRows::from_pairs((0..5).map(|i| pair(&i.to_string(), 4)).collect());
        let chunks = rows.split_into_chunks(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 2);
        assert_eq!(chunks[2].len(), 1);

        let rejoined: Vec<_> = chunks.into_iter().flat_map(MemoryRows::into_pairs).collect();
        assert_eq!(rejoined, rows.into_pairs());
    }

    #[test]
    fn split_keeps_oversized_pair_alone() {
        let rows = MemoryRows::from_pairs(vec![pair("a", 1), pair("b", 100), pair("c", 1)]);
        let chunks = rows.split_into_chunks(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].pairs()[0].key, b"b");
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut rows = MemoryRows(Vec::with_capacity(64));
        rows.push(pair("a", 1));
        let cap = rows.0.capacity();
        let rows = rows.clear();
        assert!(rows.is_empty());
        assert_eq!(rows.0.capacity(), cap);
    }

    #[test]
    fn encoder_splits_data_and_index() {
        let table = TableInfo::new(7, "orders", &["id", "name"]).with_index(1, "idx_name", vec![1]);
        let mut encoder = MemoryEncoder::new(table, SessionOptions::default());
        let row = encoder
            .encode(
                &Span::none(),
                &[Datum::Int(1), Datum::String("apple".into())],
                100,
                &[],
            )
            .unwrap();
        assert_eq!(row.data().key, record_key(7, 100));
        assert_eq!(row.indices().len(), 1);
        assert!(row.indices()[0].key.starts_with(&index_prefix(7, 1)));

        let (mut data, mut indices) = (MemoryRows::new(), MemoryRows::new());
        let (mut data_sum, mut index_sum) = (KvChecksum::new(), KvChecksum::new());
        row.classify_and_append(&mut data, &mut data_sum, &mut indices, &mut index_sum);
        assert_eq!(data.len(), 1);
        assert_eq!(indices.len(), 1);
        assert_eq!(data_sum.sum_kvs(), 1);
        assert_eq!(index_sum.sum_kvs(), 1);
        assert_eq!(data_sum.sum_size(), data.byte_size() as u64);
    }

    #[test]
    fn encoder_applies_permutation() {
        let table = TableInfo::new(1, "t", &["a", "b", "c"]);
        let mut encoder = MemoryEncoder::new(table, SessionOptions::default());
        let row = encoder
            .encode(&Span::none(), &[Datum::Int(3), Datum::Int(1)], 1, &[1, -1, 0])
            .unwrap();
        let values: Vec<Datum> = ciborium::de::from_reader(row.data().val.as_slice()).unwrap();
        assert_eq!(values, vec![Datum::Int(1), Datum::Null, Datum::Int(3)]);
    }

    #[test]
    fn encoder_rejects_mismatched_rows() {
        let table = TableInfo::new(1, "t", &["a", "b"]);
        let mut encoder = MemoryEncoder::new(table, SessionOptions::default());
        let err = encoder
            .encode(&Span::none(), &[Datum::Int(1)], 1, &[])
            .unwrap_err();
        assert!(matches!(err, BackendError::SchemaMismatch { .. }));
        assert!(!err.is_retryable());

        let err = encoder
            .encode(&Span::none(), &[Datum::Int(1)], 1, &[0, 4])
            .unwrap_err();
        assert!(matches!(err, BackendError::SchemaMismatch { .. }));
    }

    #[test]
    fn encoder_uses_integer_pk_as_handle() {
        let table = TableInfo::new(1, "t", &["id", "v"]).with_pk_is_handle(true);
        let mut encoder = MemoryEncoder::new(table, SessionOptions::default());
        let row = encoder
            .encode(&Span::none(), &[Datum::Int(42), Datum::Null], 9, &[])
            .unwrap();
        assert_eq!(row.data().key, record_key(1, 42));
    }

    #[test]
    fn encoder_rejects_unsigned_pk_overflow() {
        let table = TableInfo::new(1, "t", &["id"]).with_pk_is_handle(true);
        let mut encoder = MemoryEncoder::new(table, SessionOptions::default());
        let row = encoder
            .encode(&Span::none(), &[Datum::Uint(i64::MAX as u64)], 1, &[])
            .unwrap();
        assert_eq!(row.data().key, record_key(1, i64::MAX));

        let err = encoder
            .encode(&Span::none(), &[Datum::Uint(i64::MAX as u64 + 1)], 1, &[])
            .unwrap_err();
        assert!(matches!(err, BackendError::SchemaMismatch { .. }));
    }

    #[test]
    fn closed_encoder_fails() {
        let mut encoder = MemoryEncoder::new(TableInfo::new(1, "t", &["a"]), SessionOptions::default());
        encoder.close();
        assert!(encoder.encode(&Span::none(), &[Datum::Null], 1, &[]).is_err());
    }

    #[test]
    fn record_keys_sort_by_handle() {
        assert!(record_key(1, -5) < record_key(1, 0));
        assert!(record_key(1, 0) < record_key(1, 7));
        assert!(record_key(1, 7).starts_with(&record_prefix(1)));
    }

    #[test]
    fn engine_state_machine() {
        let backend = InMemoryBackend::new();
        let (_, uuid) = make_uuid("t", 0);
        let rows = MemoryRows::from_pairs(vec![pair("k", 3)]);

        backend.open_engine(&ctx(), uuid).unwrap();
        backend.write_rows(&ctx(), uuid, "t", &[], 5, &rows).unwrap();
        assert_eq!(backend.commit_ts(uuid), Some(5));
        backend.close_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), Some(EngineState::Closed));

        let err = backend.write_rows(&ctx(), uuid, "t", &[], 5, &rows).unwrap_err();
        assert!(matches!(err, BackendError::InvalidEngineState { .. }));

        backend.import_engine(&ctx(), uuid).unwrap();
        backend.import_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), Some(EngineState::Imported));
        assert_eq!(backend.imported_pairs(), rows.pairs());

        backend.cleanup_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), Some(EngineState::CleanedUp));
        assert!(backend.engine_file_sizes().is_empty());
        assert_eq!(backend.imported_pairs().len(), 1);
    }

    #[test]
    fn import_in_flight_is_reported_as_importing() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let backend = InMemoryBackend::new().with_import_hook(move |backend, uuid| {
            recorder.lock().push((uuid, backend.engine_file_sizes()));
        });
        let (_, uuid) = make_uuid("t", 0);
        backend.open_engine(&ctx(), uuid).unwrap();
        backend
            .write_rows(&ctx(), uuid, "t", &[], 1, &MemoryRows::from_pairs(vec![pair("k", 4)]))
            .unwrap();
        backend.close_engine(&ctx(), uuid).unwrap();
        backend.import_engine(&ctx(), uuid).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, uuid);
        assert_eq!(seen[0].1, vec![EngineFileSize::new(uuid, 5, true)]);
        assert_eq!(
            backend.engine_file_sizes(),
            vec![EngineFileSize::new(uuid, 5, false)]
        );
        assert_eq!(backend.engine_state(uuid), Some(EngineState::Imported));
    }

    #[test]
    fn close_unknown_engine_materializes_it() {
        let backend = InMemoryBackend::new();
        let (_, uuid) = make_uuid("t", 3);
        backend.close_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), Some(EngineState::Closed));
    }

    #[test]
    fn cleanup_unknown_engine_is_ok() {
        let backend = InMemoryBackend::new();
        let (_, uuid) = make_uuid("t", 3);
        backend.cleanup_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), None);
    }

    #[test]
    fn import_open_engine_keeps_it_open() {
        let backend = InMemoryBackend::new();
        let (_, uuid) = make_uuid("t", 0);
        backend.open_engine(&ctx(), uuid).unwrap();
        backend
            .write_rows(&ctx(), uuid, "t", &[], 1, &MemoryRows::from_pairs(vec![pair("k", 1)]))
            .unwrap();
        backend.import_engine(&ctx(), uuid).unwrap();
        backend.reset_engine(&ctx(), uuid).unwrap();
        assert_eq!(backend.engine_state(uuid), Some(EngineState::Opened));
        assert!(backend.pending_pairs(uuid).is_empty());
        assert_eq!(backend.imported_pairs().len(), 1);
    }

    #[test]
    fn sizes_and_flush() {
        let backend = InMemoryBackend::new();
        let (_, a) = make_uuid("t", 0);
        let (_, b) = make_uuid("t", 1);
        backend.open_engine(&ctx(), a).unwrap();
        backend.open_engine(&ctx(), b).unwrap();
        backend
            .write_rows(&ctx(), a, "t", &[], 1, &MemoryRows::from_pairs(vec![pair("k", 9)]))
            .unwrap();
        backend.set_importing(b, true).unwrap();

        let mut sizes = backend.engine_file_sizes();
        sizes.sort_by_key(|s| s.size);
        assert_eq!(sizes[0], EngineFileSize::new(b, 0, true));
        assert_eq!(sizes[1], EngineFileSize::new(a, 10, false));

        assert_eq!(backend.flushed_pairs(a), 0);
        backend.flush_all_engines().unwrap();
        assert_eq!(backend.flushed_pairs(a), 1);
        assert!(matches!(
            backend.flush_engine(make_uuid("t", 9).1),
            Err(BackendError::EngineNotFound(_))
        ));
    }

    #[test]
    fn closed_backend_rejects_work() {
        let backend = InMemoryBackend::new();
        AbstractBackend::close(&backend);
        assert!(backend.is_closed());
        assert!(backend.check_requirements(&ctx()).is_err());
        assert!(backend.open_engine(&ctx(), make_uuid("t", 0).1).is_err());
    }

    #[test]
    fn cancelled_context_is_honored() {
        let backend = InMemoryBackend::new();
        let ctx = Context::background();
        ctx.cancel();
        let err = backend.open_engine(&ctx, make_uuid("t", 0).1).unwrap_err();
        assert!(matches!(err, BackendError::Cancelled));
    }

    #[test]
    fn remote_models() {
        let backend = InMemoryBackend::new();
        backend.register_table("shop", TableInfo::new(1, "orders", &["id"]));
        let tables = backend.fetch_remote_table_models(&ctx(), "shop").unwrap();
        assert_eq!(tables.len(), 1);
        assert!(backend.fetch_remote_table_models(&ctx(), "nope").is_err());
    }
}
