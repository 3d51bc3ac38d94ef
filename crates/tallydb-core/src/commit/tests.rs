use super::*;
use crate::{
    error::{ErrorClass, ErrorOrigin},
    executor::SkipReason,
    memory::MemoryStore,
    model::{AggregateFunction, EntityTag},
    port::{BulkUpdatePort, FieldWrite, QueryPort, TransactionPort},
    predicate::Predicate,
    record::Record,
    test_fixtures::{INVOICE, invoice, invoice_registry},
    value::Value,
};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

///
/// RejectingStore
///
/// Memory store whose secondary transaction always fails.
///

struct RejectingStore(MemoryStore);

impl QueryPort for RejectingStore {
    fn aggregate(
        &self,
        entity: &EntityTag,
        function: AggregateFunction,
        field: Option<&str>,
        filter: &Predicate,
    ) -> Result<Value, InternalError> {
        self.0.aggregate(entity, function, field, filter)
    }
}

impl BulkUpdatePort for RejectingStore {
    fn bulk_update(
        &mut self,
        entity: &EntityTag,
        filter: &Predicate,
        field: &str,
        value: &Value,
    ) -> Result<u64, InternalError> {
        self.0.bulk_update(entity, filter, field, value)
    }
}

impl TransactionPort for RejectingStore {
    fn load(&self, id: &RecordId) -> Result<Option<Record>, InternalError> {
        self.0.load(id)
    }

    fn detach(&mut self, id: &RecordId) {
        self.0.detach(id);
    }

    fn commit_secondary(&mut self, _: &[FieldWrite]) -> Result<(), InternalError> {
        Err(InternalError::commit_internal("deadlock detected"))
    }
}

fn outcome_for(owner: &RecordId, value: Value) -> AggregateOutcome {
    AggregateOutcome {
        entries: vec![EntryReport {
            owner: owner.clone(),
            field: "total".to_string(),
            state: RecomputeState::Applied { changed: true },
        }],
        writes: vec![FieldWrite {
            owner: owner.clone(),
            field: "total".to_string(),
            value,
        }],
        modified: BTreeSet::from([owner.clone()]),
    }
}

#[test]
fn changed_owners_are_written_once() {
    let registry = invoice_registry();
    let mut store = MemoryStore::for_registry(&registry);
    store.seed(invoice(1));
    let owner = RecordId::new(INVOICE, 1u64);

    let report = secondary_commit(
        &mut store,
        &DeletionLedger::new(),
        outcome_for(&owner, Value::Decimal(Decimal::from(12))),
    );

    assert!(matches!(report.commit, CommitOutcome::Committed { writes: 1 }));
    assert!(report.is_clean());
    assert_eq!(
        store.get(&owner).unwrap().get("total"),
        &Value::Decimal(Decimal::from(12))
    );
}

#[test]
fn nothing_modified_skips_the_commit() {
    let registry = invoice_registry();
    let mut store = MemoryStore::for_registry(&registry);
    let owner = RecordId::new(INVOICE, 1u64);
    let outcome = AggregateOutcome {
        entries: vec![EntryReport {
            owner,
            field: "total".to_string(),
            state: RecomputeState::Skipped(SkipReason::OwnerMissing),
        }],
        ..AggregateOutcome::default()
    };

    let report = secondary_commit(&mut store, &DeletionLedger::new(), outcome);

    assert!(matches!(report.commit, CommitOutcome::Skipped));
    assert_eq!(report.entries.len(), 1);
    assert!(store.secondary_log().is_empty());
}

#[test]
fn deleted_records_are_detached_before_writing() {
    let registry = invoice_registry();
    let mut store = MemoryStore::for_registry(&registry);
    store.seed(invoice(1));
    let owner = RecordId::new(INVOICE, 1u64);
    let mut ledger = DeletionLedger::new();
    ledger.record(owner.clone());

    secondary_commit(
        &mut store,
        &ledger,
        outcome_for(&owner, Value::Decimal(Decimal::ONE)),
    );

    assert!(store.is_detached(&owner));
    assert!(store.secondary_log().is_empty());
    assert!(store.get(&owner).unwrap().get("total").is_null());
}

#[test]
fn commit_failure_is_reported_not_raised() {
    let registry = invoice_registry();
    let mut store = RejectingStore(MemoryStore::for_registry(&registry));
    let owner = RecordId::new(INVOICE, 1u64);

    let report = secondary_commit(
        &mut store,
        &DeletionLedger::new(),
        outcome_for(&owner, Value::Decimal(Decimal::ONE)),
    );

    let CommitOutcome::Failed(err) = &report.commit else {
        panic!("expected a failed commit, got {:?}", report.commit);
    };
    assert_eq!(err.class, ErrorClass::Internal);
    assert_eq!(err.origin, ErrorOrigin::Commit);
    assert!(!report.is_clean());
    // entry states are kept even when the write is lost
    assert!(report.state_of(&owner, "total").is_some_and(RecomputeState::is_applied));
}

#[test]
fn empty_report_is_clean() {
    let report = RecomputeReport::empty();

    assert!(report.is_clean());
    assert!(report.state_of(&RecordId::new(INVOICE, 1u64), "total").is_none());
}
