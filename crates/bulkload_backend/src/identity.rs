//! Engine identity.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Namespace under which engine identities are derived.
pub const ENGINE_NAMESPACE: Uuid = Uuid::from_bytes([
    0xd6, 0x8d, 0x6a, 0xbe, 0xc5, 0x9e, 0x45, 0xd6, 0xad, 0xe8, 0xe2, 0xb0, 0xce, 0xb7, 0xbe, 0xdf,
]);

/// Number of bits reserved for the logical part of a hybrid timestamp.
const LOGICAL_BITS: u32 = 18;

/// Stable identifier of an engine.
///
/// Identities are name-based (UUIDv5) so the same `(table, engine id)` pair
/// always maps to the same engine, across restarts and checkpoint resumption.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineUuid(Uuid);

impl EngineUuid {
    /// Wraps an existing UUID, e.g. one read back from a checkpoint.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for EngineUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineUuid({})", self.0)
    }
}

impl fmt::Display for EngineUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EngineUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EngineUuid> for Uuid {
    fn from(id: EngineUuid) -> Self {
        id.0
    }
}

/// Builds the human-readable tag of an engine, `"{table}:{engine_id}"`.
pub fn make_tag(table_name: &str, engine_id: i32) -> String {
    format!("{table_name}:{engine_id}")
}

/// Derives the tag and identity of an engine.
///
/// This is a pure function of its inputs.
pub fn make_uuid(table_name: &str, engine_id: i32) -> (String, EngineUuid) {
    let tag = make_tag(table_name, engine_id);
    let uuid = Uuid::new_v5(&ENGINE_NAMESPACE, tag.as_bytes());
    (tag, EngineUuid(uuid))
}

/// Composes a hybrid timestamp from a physical time in milliseconds and a
/// logical counter.
pub const fn compose_ts(physical_ms: u64, logical: u64) -> u64 {
    (physical_ms << LOGICAL_BITS) + logical
}

/// Returns the physical part, in milliseconds, of a hybrid timestamp.
pub const fn extract_physical(ts: u64) -> u64 {
    ts >> LOGICAL_BITS
}

/// Hybrid timestamp for the current wall-clock second.
pub(crate) fn current_commit_ts() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    compose_ts(secs * 1000, 0)
}
