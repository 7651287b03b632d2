//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random rows, engine identities and
//! disk-usage snapshots.

use bulkload_backend::{make_uuid, Datum, EngineFileSize, KvPair};
use proptest::prelude::*;

/// Strategy for generating qualified table names like `` `db`.`t1` ``.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9_]{0,15}", "[a-z][a-z0-9_]{0,15}")
        .prop_map(|(schema, table)| format!("`{schema}`.`{table}`"))
}

/// Strategy for generating engine ids, including the index engine id `-1`.
pub fn engine_id_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![Just(-1), 0i32..1_000, any::<i32>()]
}

/// Strategy for generating a single value.
pub fn datum_strategy() -> impl Strategy<Value = Datum> {
    prop_oneof![
        Just(Datum::Null),
        any::<i64>().prop_map(Datum::Int),
        any::<u64>().prop_map(Datum::Uint),
        (-1.0e9f64..1.0e9).prop_map(Datum::Float),
        "[ -~]{0,32}".prop_map(Datum::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Datum::Bytes),
    ]
}

/// Strategy for generating rows of `columns` values where the first column
/// is always a distinct integer id.
pub fn rows_strategy(columns: usize, max_rows: usize) -> impl Strategy<Value = Vec<Vec<Datum>>> {
    prop::collection::vec(
        prop::collection::vec(datum_strategy(), columns.saturating_sub(1)),
        0..=max_rows,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, rest)| {
                let mut row = Vec::with_capacity(rest.len() + 1);
                row.push(Datum::Int(i as i64 + 1));
                row.extend(rest);
                row
            })
            .collect()
    })
}

/// Strategy for generating raw KV pairs.
pub fn kv_pairs_strategy(max_pairs: usize) -> impl Strategy<Value = Vec<KvPair>> {
    prop::collection::vec(
        (
            prop::collection::vec(any::<u8>(), 1..32),
            prop::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(|(key, val)| KvPair::new(key, val)),
        0..=max_pairs,
    )
}

/// Strategy for generating engine disk usage snapshots with distinct
/// identities.
pub fn engine_sizes_strategy(max_engines: usize) -> impl Strategy<Value = Vec<EngineFileSize>> {
    prop::collection::vec((0i64..1 << 30, any::<bool>()), 0..=max_engines).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (size, importing))| {
                let (_, uuid) = make_uuid("`gen`.`sizes`", i as i32);
                EngineFileSize::new(uuid, size, importing)
            })
            .collect()
    })
}
