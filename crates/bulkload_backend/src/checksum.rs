//! Running checksums over encoded KV pairs.

use sha2::{Digest, Sha256};
use std::fmt;

/// Order-independent checksum of a set of KV pairs.
///
/// Each pair is hashed on its own and the digests are XOR-folded, so the
/// accumulated value does not depend on the order rows were encoded in, and
/// two accumulators over disjoint parts can be merged with [`KvChecksum::add`].
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct KvChecksum {
    bytes: u64,
    kvs: u64,
    checksum: u64,
}

impl KvChecksum {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an accumulator from previously recorded totals.
    #[must_use]
    pub const fn from_parts(checksum: u64, kvs: u64, bytes: u64) -> Self {
        Self {
            bytes,
            kvs,
            checksum,
        }
    }

    /// Folds one KV pair into the accumulator.
    pub fn update_one(&mut self, key: &[u8], value: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update(value);
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);

        self.checksum ^= u64::from_le_bytes(head);
        self.kvs += 1;
        self.bytes += (key.len() + value.len()) as u64;
    }

    /// Merges another accumulator into this one.
    pub fn add(&mut self, other: &KvChecksum) {
        self.checksum ^= other.checksum;
        self.kvs += other.kvs;
        self.bytes += other.bytes;
    }

    /// The folded checksum value.
    pub fn sum(&self) -> u64 {
        self.checksum
    }

    /// Number of KV pairs folded in.
    pub fn sum_kvs(&self) -> u64 {
        self.kvs
    }

    /// Total key and value bytes folded in.
    pub fn sum_size(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Debug for KvChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvChecksum")
            .field("checksum", &format_args!("{:#018x}", self.checksum))
            .field("kvs", &self.kvs)
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_checksum() {
        let c = KvChecksum::new();
        assert_eq!(c.sum(), 0);
        assert_eq!(c.sum_kvs(), 0);
        assert_eq!(c.sum_size(), 0);
    }

    #[test]
    fn order_does_not_matter() {
        let mut a = KvChecksum::new();
        a.update_one(b"k1", b"v1");
        a.update_one(b"k2", b"v2");

        let mut b = KvChecksum::new();
        b.update_one(b"k2", b"v2");
        b.update_one(b"k1", b"v1");

        assert_eq!(a, b);
        assert_eq!(a.sum_kvs(), 2);
        assert_eq!(a.sum_size(), 8);
    }

    #[test]
    fn key_value_boundary_matters() {
        let mut a = KvChecksum::new();
        a.update_one(b"ab", b"c");
        let mut b = KvChecksum::new();
        b.update_one(b"a", b"bc");
        assert_ne!(a.sum(), b.sum());
    }

    #[test]
    fn add_merges_partitions() {
        let mut whole = KvChecksum::new();
        whole.update_one(b"t1_r1", b"row");
        whole.update_one(b"t1_i1", b"idx");

        let mut data = KvChecksum::new();
        data.update_one(b"t1_r1", b"row");
        let mut index = KvChecksum::new();
        index.update_one(b"t1_i1", b"idx");

        data.add(&index);
        assert_eq!(data, whole);
    }
}
