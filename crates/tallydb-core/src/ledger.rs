use crate::record::RecordId;
use std::collections::BTreeSet;

///
/// DeletionLedger
///
/// Identities scheduled for deletion in the current transaction. Owners
/// listed here are never recomputed and are detached before the secondary
/// commit.
///

#[derive(Debug, Default)]
pub struct DeletionLedger {
    ids: BTreeSet<RecordId>,
}

impl DeletionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the identity was not already recorded.
    pub fn record(&mut self, id: RecordId) -> bool {
        self.ids.insert(id)
    }

    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordId> {
        self.ids.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_identity_once() {
        let mut ledger = DeletionLedger::new();

        assert!(ledger.record(RecordId::new("Invoice", 1u64)));
        assert!(!ledger.record(RecordId::new("Invoice", 1u64)));
        assert!(ledger.contains(&RecordId::new("Invoice", 1u64)));
        assert!(!ledger.contains(&RecordId::new("ProformaInvoice", 1u64)));
        assert_eq!(ledger.len(), 1);

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
