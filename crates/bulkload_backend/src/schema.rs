//! Remote table metadata.

use crate::context::Context;
use crate::error::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};

/// Visibility state of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaState {
    /// Not visible to anyone.
    None,
    /// Being dropped, only deletes are applied.
    DeleteOnly,
    /// Being added, only writes are applied.
    WriteOnly,
    /// Being reorganized.
    WriteReorganization,
    /// Fully visible.
    Public,
}

impl Default for SchemaState {
    fn default() -> Self {
        SchemaState::None
    }
}

/// A column of a remote table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Zero-based position among the table's columns.
    pub offset: usize,
    /// Visibility state.
    #[serde(default)]
    pub state: SchemaState,
}

/// A secondary index of a remote table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index ID, unique within the table.
    pub id: i64,
    /// Index name.
    pub name: String,
    /// Offsets of the indexed columns.
    pub columns: Vec<usize>,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
}

/// Metadata of a remote table, as much as needed to rebuild its layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Numeric table ID.
    pub id: i64,
    /// Table name.
    pub name: String,
    /// Visibility state.
    #[serde(default)]
    pub state: SchemaState,
    /// Columns in offset order.
    pub columns: Vec<ColumnInfo>,
    /// Secondary indices.
    #[serde(default)]
    pub indices: Vec<IndexInfo>,
    /// Whether the primary key is the row handle, in which case no hidden
    /// row ID column is generated.
    #[serde(default)]
    pub pk_is_handle: bool,
}

impl TableInfo {
    /// Creates a public table with public columns named in order.
    pub fn new(id: i64, name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            id,
            name: name.into(),
            state: SchemaState::Public,
            columns: columns
                .iter()
                .enumerate()
                .map(|(offset, name)| ColumnInfo {
                    name: (*name).to_string(),
                    offset,
                    state: SchemaState::Public,
                })
                .collect(),
            indices: Vec::new(),
            pk_is_handle: false,
        }
    }

    /// Adds a secondary index over the given column offsets.
    pub fn with_index(mut self, id: i64, name: impl Into<String>, columns: Vec<usize>) -> Self {
        self.indices.push(IndexInfo {
            id,
            name: name.into(),
            columns,
            unique: false,
        });
        self
    }

    /// Marks the primary key as the row handle.
    pub fn with_pk_is_handle(mut self, pk_is_handle: bool) -> Self {
        self.pk_is_handle = pk_is_handle;
        self
    }

    /// Checks the fields the loader relies on: the table and all of its
    /// columns are public and column offsets are `0, 1, 2, ...`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidTableInfo`] describing the first problem.
    pub fn validate(&self) -> BackendResult<()> {
        let invalid = |message: String| BackendError::InvalidTableInfo {
            table: self.name.clone(),
            message,
        };

        if self.name.is_empty() {
            return Err(invalid("table name is empty".into()));
        }
        if self.state != SchemaState::Public {
            return Err(invalid(format!("table state is {:?}", self.state)));
        }
        for (expected, column) in self.columns.iter().enumerate() {
            if column.state != SchemaState::Public {
                return Err(invalid(format!(
                    "column {} state is {:?}",
                    column.name, column.state
                )));
            }
            if column.offset != expected {
                return Err(invalid(format!(
                    "column {} has offset {}, expected {}",
                    column.name, column.offset, expected
                )));
            }
        }
        for index in &self.indices {
            if let Some(bad) = index.columns.iter().find(|&&c| c >= self.columns.len()) {
                return Err(invalid(format!(
                    "index {} refers to column offset {}",
                    index.name, bad
                )));
            }
        }
        Ok(())
    }
}

/// Minimal client for a remote status endpoint that serves JSON.
///
/// Implement this to plug in an actual HTTP(S) library.
pub trait SchemaClient: Send + Sync {
    /// Performs a GET request and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the context is done.
    fn get(&self, ctx: &Context, path: &str) -> BackendResult<Vec<u8>>;
}

/// Fetches the models of all tables in `schema` from `/schema/{schema}`.
///
/// # Errors
///
/// Returns [`BackendError::RemoteSchema`] if the request or decoding fails;
/// cancellation is passed through unchanged.
pub fn fetch_remote_table_models_from<C: SchemaClient + ?Sized>(
    client: &C,
    ctx: &Context,
    schema: &str,
) -> BackendResult<Vec<TableInfo>> {
    let annotate = |message: String| BackendError::RemoteSchema {
        schema: schema.to_string(),
        message,
    };

    let body = client
        .get(ctx, &format!("/schema/{schema}"))
        .map_err(|err| {
            if err.is_cancellation() {
                err
            } else {
                annotate(err.to_string())
            }
        })?;
    serde_json::from_slice(&body).map_err(|err| annotate(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticClient {
        path: &'static str,
        body: &'static str,
    }

    impl SchemaClient for StaticClient {
        fn get(&self, ctx: &Context, path: &str) -> BackendResult<Vec<u8>> {
            ctx.check()?;
            if path == self.path {
                Ok(self.body.as_bytes().to_vec())
            } else {
                Err(BackendError::transport_fatal(format!("404 {path}")))
            }
        }
    }

    #[test]
    fn new_table_is_valid() {
        let table = TableInfo::new(42, "orders", &["id", "amount"]).with_index(1, "idx_amount", vec![1]);
        table.validate().unwrap();
        assert_eq!(table.columns[1].offset, 1);
    }

    #[test]
    fn validate_rejects_bad_offsets() {
        let mut table = TableInfo::new(1, "t", &["a", "b"]);
        table.columns[1].offset = 5;
        assert!(matches!(
            table.validate(),
            Err(BackendError::InvalidTableInfo { .. })
        ));
    }

    #[test]
    fn validate_rejects_non_public() {
        let mut table = TableInfo::new(1, "t", &["a"]);
        table.state = SchemaState::WriteOnly;
        assert!(table.validate().is_err());

        let mut table = TableInfo::new(1, "t", &["a"]);
        table.columns[0].state = SchemaState::DeleteOnly;
        assert!(table.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_index() {
        let table = TableInfo::new(1, "t", &["a"]).with_index(1, "idx", vec![3]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn fetch_decodes_tables() {
        let client = StaticClient {
            path: "/schema/shop",
            body: r#"[{"id":7,"name":"orders","state":"public","pk_is_handle":true,
                      "columns":[{"name":"id","offset":0,"state":"public"}]}]"#,
        };
        let tables = fetch_remote_table_models_from(&client, &Context::background(), "shop").unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].id, 7);
        assert!(tables[0].pk_is_handle);
        assert!(tables[0].indices.is_empty());
        tables[0].validate().unwrap();
    }

    #[test]
    fn fetch_annotates_failures() {
        let client = StaticClient {
            path: "/schema/shop",
            body: "not json",
        };
        let err = fetch_remote_table_models_from(&client, &Context::background(), "shop").unwrap_err();
        assert!(err.to_string().starts_with("cannot read schema 'shop' from remote"));

        let err = fetch_remote_table_models_from(&client, &Context::background(), "other").unwrap_err();
        assert!(matches!(err, BackendError::RemoteSchema { ref schema, .. } if schema == "other"));
    }

    #[test]
    fn fetch_passes_cancellation_through() {
        let client = StaticClient {
            path: "/schema/shop",
            body: "[]",
        };
        let ctx = Context::background();
        ctx.cancel();
        let err = fetch_remote_table_models_from(&client, &ctx, "shop").unwrap_err();
        assert!(matches!(err, BackendError::Cancelled));
    }
}
