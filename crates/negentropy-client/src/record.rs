//! Records and the sorted store the reconciliation engine walks.

use crate::error::Error;

/// A single `(timestamp, id)` entry. `id` is always exactly 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u64,
    pub id: [u8; 32],
}

impl Record {
    pub fn new(timestamp: u64, id: [u8; 32]) -> Self {
        Self { timestamp, id }
    }

    /// Build a record from a 64-character lowercase-hex id.
    pub fn from_hex(timestamp: u64, id_hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(id_hex)?;
        let id: [u8; 32] = bytes.as_slice().try_into()?;
        Ok(Self { timestamp, id })
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// An immutable, sorted sequence of records.
///
/// Built once from the caller's local set at reconciliation start and never
/// mutated by the engine afterward. The caller is responsible for
/// deduplicating before construction; duplicates are treated as distinct
/// entries rather than rejected.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Sort `records` and seal them into a store.
    pub fn new(mut records: Vec<Record>) -> Self {
        records.sort();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    /// Smallest index `i` such that `records[i]` is not below `bound`
    /// (i.e. the first index at or past `bound`'s frontier).
    pub fn upper_bound_index(&self, bound: &crate::bound::Bound) -> usize {
        // partition_point finds the first element for which the predicate is
        // false, i.e. the first record that is *not* below `bound`.
        self.records.partition_point(|r| bound.record_is_below(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_timestamp_then_id() {
        let store = RecordStore::new(vec![
            Record::new(200, [0x03; 32]),
            Record::new(100, [0x02; 32]),
            Record::new(100, [0x01; 32]),
        ]);

        let records = store.as_slice();
        assert_eq!(records[0].timestamp, 100);
        assert_eq!(records[1].timestamp, 100);
        assert_eq!(records[2].timestamp, 200);
        assert!(records[0].id < records[1].id);
    }

    #[test]
    fn from_hex_rejects_short_ids() {
        assert!(matches!(
            Record::from_hex(0, "abcdef"),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn from_hex_roundtrips() {
        let hex_id = "c69b".to_string() + &"0".repeat(56) + "2d2c";
        let record = Record::from_hex(1762612866, &hex_id).unwrap();
        assert_eq!(record.id_hex(), hex_id);
    }
}
