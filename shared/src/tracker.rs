use std::collections::HashSet;

use crate::record::AttackRecord;

/// Remembers every record id already handed to the choreographer.
///
/// The set only grows, so a record that shows up again in a later poll is
/// never animated twice.
#[derive(Debug, Default)]
pub struct IngestionTracker {
    processed: HashSet<String>,
}

impl IngestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the records not seen before, in input order, marking them seen
    /// in the same step.
    pub fn admit(&mut self, records: &[AttackRecord]) -> Vec<AttackRecord> {
        records
            .iter()
            .filter(|record| self.processed.insert(record.id.clone()))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
