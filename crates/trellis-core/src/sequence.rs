//! Unique ID allocation from relational sequences.

use tracing::trace;

use crate::store::schema::{UNIQUE_EDGE_ID_SEQUENCE, UNIQUE_NODE_ID_SEQUENCE};
use crate::store::{RelationalStore, StoreError};

/// Hands out strictly increasing IDs. Nothing is cached, so a value consumed
/// by a failed operation is simply skipped.
#[derive(Clone, Copy)]
pub struct SequenceAllocator<'a> {
    store: &'a dyn RelationalStore,
}

impl<'a> SequenceAllocator<'a> {
    pub fn new(store: &'a dyn RelationalStore) -> Self {
        Self { store }
    }

    pub fn next(&self, sequence: &str) -> Result<i64, StoreError> {
        let value = self.store.next_sequence_value(sequence)?;
        trace!("Allocated {} from {}", value, sequence);
        Ok(value)
    }

    pub fn next_node_id(&self) -> Result<i64, StoreError> {
        self.next(UNIQUE_NODE_ID_SEQUENCE)
    }

    pub fn next_edge_id(&self) -> Result<i64, StoreError> {
        self.next(UNIQUE_EDGE_ID_SEQUENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_back_to_back_allocations_increase() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = SequenceAllocator::new(&store);

        let a = ids.next_node_id().unwrap();
        let b = ids.next_node_id().unwrap();
        assert!(b > a);

        let e1 = ids.next_edge_id().unwrap();
        let e2 = ids.next_edge_id().unwrap();
        assert!(e2 > e1);
    }

    #[test]
    fn test_unknown_sequence_propagates() {
        let store = SqliteStore::in_memory().unwrap();
        let err = SequenceAllocator::new(&store).next("no_such_seq").unwrap_err();
        assert!(matches!(err, StoreError::UnknownSequence(_)));
    }
}
