//! Contracts between the row encoder and the storage backend.
//!
//! The lifecycle layer never looks inside encoded rows. It only needs to split
//! a collection into bounded chunks and to reuse buffers, which is what the
//! [`Rows`] trait provides. Each backend chooses its own [`Row`] and [`Rows`]
//! representation through the associated types of
//! [`AbstractBackend`](crate::AbstractBackend).

use crate::checksum::KvChecksum;
use crate::error::BackendResult;
use serde::{Deserialize, Serialize};
use tracing::Span;

/// A single SQL value as produced by the file parsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating-point number.
    Float(f64),
    /// Text.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Datum {
    /// Returns true for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

/// A raw key/value pair as stored by KV-oriented backends.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KvPair {
    /// Encoded key.
    pub key: Vec<u8>,
    /// Encoded value.
    pub val: Vec<u8>,
}

impl KvPair {
    /// Creates a pair.
    pub fn new(key: impl Into<Vec<u8>>, val: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }

    /// Byte size used for chunking and checksums.
    pub fn size(&self) -> usize {
        self.key.len() + self.val.len()
    }
}

/// Session variables that influence encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// SQL mode of the target session.
    pub sql_mode: String,
    /// Unix timestamp (seconds) used for `NOW()` and friends.
    pub timestamp: i64,
    /// Row format version of the target cluster.
    pub row_format_version: String,
}

impl SessionOptions {
    /// Creates options with the default SQL mode.
    pub fn new(timestamp: i64) -> Self {
        Self {
            sql_mode: "ONLY_FULL_GROUP_BY,STRICT_TRANS_TABLES,NO_ENGINE_SUBSTITUTION".into(),
            timestamp,
            row_format_version: "1".into(),
        }
    }

    /// Sets the SQL mode.
    pub fn with_sql_mode(mut self, sql_mode: impl Into<String>) -> Self {
        self.sql_mode = sql_mode.into();
        self
    }

    /// Sets the row format version.
    pub fn with_row_format_version(mut self, version: impl Into<String>) -> Self {
        self.row_format_version = version.into();
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Encodes rows of SQL values for one table into a backend-specific form.
pub trait Encoder: Send {
    /// The encoded row type.
    type Row: Row;

    /// Encodes one row.
    ///
    /// `column_permutation[i]` is the position in `row` of the table's `i`-th
    /// column, or `-1` if the input does not provide that column.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be converted to the column type.
    fn encode(
        &mut self,
        span: &Span,
        row: &[Datum],
        row_id: i64,
        column_permutation: &[i32],
    ) -> BackendResult<Self::Row>;

    /// Releases resources held by the encoder.
    fn close(&mut self) {}
}

/// A single encoded row.
pub trait Row: Send {
    /// Collection type the parts of this row are appended to.
    type Rows: Rows;

    /// Separates the data-like and index-like parts of the row, appending each
    /// to its buffer and folding it into the matching checksum.
    ///
    /// Must be called exactly once per encoded row; this is the only place
    /// checksums are accumulated.
    fn classify_and_append(
        self,
        data: &mut Self::Rows,
        data_checksum: &mut KvChecksum,
        indices: &mut Self::Rows,
        index_checksum: &mut KvChecksum,
    );
}

/// A collection of encoded rows.
pub trait Rows: Send + Sync + Sized {
    /// Splits the rows into consecutive parts, each of total byte size at most
    /// `split_size` unless a single row alone is larger. The meaning of "byte
    /// size" matches the one used by [`Row::classify_and_append`].
    fn split_into_chunks(&self, split_size: usize) -> Vec<Self>;

    /// Returns an empty collection, possibly reusing this one's capacity.
    /// Typical use is `rows = rows.clear()`.
    #[must_use]
    fn clear(self) -> Self;

    /// Number of entries in the collection.
    fn len(&self) -> usize;

    /// Returns true if the collection holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
