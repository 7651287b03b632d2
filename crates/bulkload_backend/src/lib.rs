//! # Bulkload Backend
//!
//! Engine lifecycle and disk-quota admission for a bulk data loader.
//!
//! Rows are encoded into key-value pairs, buffered in *engines* and finally
//! imported into the target cluster. This crate owns the lifecycle of those
//! engines and is agnostic of where they live: every delivery mechanism is an
//! implementation of [`AbstractBackend`].
//!
//! ## Design Principles
//!
//! - One [`Backend`] facade per process, shared by every table worker
//! - Engine identity is derived deterministically from table and engine id
//! - Handles are typed by phase: [`OpenedEngine`] accepts writes, only a
//!   [`ClosedEngine`] can be imported
//! - Transient failures are retried a bounded number of times; everything
//!   else fails fast
//! - Operations outside the normal sequence live behind
//!   [`Backend::recovery`]
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and dry runs
//!
//! ## Example
//!
//! ```rust
//! use bulkload_backend::{Backend, Context, Datum, InMemoryBackend, Row, TableInfo};
//! use bulkload_backend::{KvChecksum, SessionOptions, Encoder};
//!
//! let backend = Backend::new(InMemoryBackend::new());
//! let ctx = Context::background();
//! let table = TableInfo::new(1, "users", &["id", "name"]);
//!
//! let mut encoder = backend.new_encoder(&table, &SessionOptions::default());
//! let row = encoder
//!     .encode(&tracing::Span::none(), &[Datum::Int(1), Datum::String("ada".into())], 1, &[])
//!     .unwrap();
//!
//! let (mut data, mut indices) = (backend.make_empty_rows(), backend.make_empty_rows());
//! let (mut data_sum, mut index_sum) = (KvChecksum::new(), KvChecksum::new());
//! row.classify_and_append(&mut data, &mut data_sum, &mut indices, &mut index_sum);
//!
//! let engine = backend.open_engine(&ctx, "`db`.`users`", 0).unwrap();
//! engine.write_rows(&ctx, &[], &data).unwrap();
//! let closed = engine.close(&ctx).unwrap();
//! closed.import(&ctx).unwrap();
//! closed.cleanup(&ctx).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod checksum;
mod config;
mod context;
mod encode;
mod engine;
mod error;
mod facade;
mod guard;
mod identity;
mod logging;
mod memory;
mod quota;
mod recovery;
mod schema;
mod stats;

pub use backend::{AbstractBackend, EngineFileSize};
pub use checksum::KvChecksum;
pub use config::{BackendConfig, DEFAULT_MAX_RETRY_TIMES};
pub use context::Context;
pub use encode::{Datum, Encoder, KvPair, Row, Rows, SessionOptions};
pub use engine::{ClosedEngine, EngineState, OpenedEngine};
pub use error::{BackendError, BackendResult};
pub use facade::Backend;
pub use guard::{EngineCountGuard, EngineCountLimit, NoopGuard};
pub use identity::{compose_ts, extract_physical, make_tag, make_uuid, EngineUuid, ENGINE_NAMESPACE};
pub use logging::{EngineLogger, Task};
pub use memory::{
    index_prefix, record_key, record_prefix, ImportHook, InMemoryBackend, MemoryEncoder, MemoryRow,
    MemoryRows, DEFAULT_MEMORY_CHUNK_SIZE,
};
pub use quota::{check_disk_quota, DiskQuotaReport};
pub use recovery::{EngineRecovery, IMPORT_AND_RESET_TAG};
pub use schema::{
    fetch_remote_table_models_from, ColumnInfo, IndexInfo, SchemaClient, SchemaState, TableInfo,
};
pub use stats::{EngineCountSnapshot, EngineCounters};
