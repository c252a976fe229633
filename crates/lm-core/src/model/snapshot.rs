use ahash::AHashSet;

use super::{Record, RecordId};

/// The complete result set of a subscription at one change notification
///
/// Record order is a display hint only. Consecutive snapshots are compared by
/// their set of ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    sequence: u64,
    records: Vec<Record>,
}

impl Snapshot {
    pub fn new(sequence: u64, records: Vec<Record>) -> Self {
        Self { sequence, records }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids present in this snapshot
    pub fn ids(&self) -> AHashSet<RecordId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Latest occurrence wins when an id appears more than once
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().rev().find(|r| &r.id == id)
    }
}
