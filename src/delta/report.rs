//! Per-run delta counts

use serde::Serialize;
use std::collections::BTreeMap;

/// Number of new records per entity for one run
///
/// Ordered by entity id. Not persisted; it is rebuilt on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeltaReport {
    counts: BTreeMap<String, usize>,
}

impl DeltaReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the count for an entity
    pub fn insert(&mut self, entity: impl Into<String>, new_records: usize) {
        self.counts.insert(entity.into(), new_records);
    }

    /// Count for an entity, if it was part of the run
    pub fn get(&self, entity: &str) -> Option<usize> {
        self.counts.get(entity).copied()
    }

    /// Total new records across all entities
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of entities in the report
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no entity was processed
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(entity, count)` in entity order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for DeltaReport {
    fn from_iter<T: IntoIterator<Item = (S, usize)>>(iter: T) -> Self {
        Self {
            counts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
