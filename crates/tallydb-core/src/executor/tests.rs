use super::*;
use crate::{
    error::{ErrorClass, ErrorOrigin},
    ledger::DeletionLedger,
    memory::MemoryStore,
    model::{AggregateFunction, AggregateRule, EntityModel, EntityTag, FieldKind},
    port::{BulkUpdatePort, QueryPort, TransactionPort},
    predicate::Predicate,
    queue::WorkQueue,
    record::Record,
    registry::RuleRegistry,
    test_fixtures::{INVOICE, LINE_ITEM, invoice, invoice_registry, line_item},
    value::Value,
};
use rust_decimal::Decimal;
use std::sync::Arc;

///
/// FlakyStore
///
/// Delegates to a memory store, failing chosen aggregate functions or every
/// load.
///

struct FlakyStore {
    inner: MemoryStore,
    failing: Option<AggregateFunction>,
    fail_loads: bool,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: None,
            fail_loads: false,
        }
    }
}

impl QueryPort for FlakyStore {
    fn aggregate(
        &self,
        entity: &EntityTag,
        function: AggregateFunction,
        field: Option<&str>,
        filter: &Predicate,
    ) -> Result<Value, InternalError> {
        if self.failing == Some(function) {
            return Err(InternalError::query_internal("aggregate unavailable"));
        }

        self.inner.aggregate(entity, function, field, filter)
    }
}

impl BulkUpdatePort for FlakyStore {
    fn bulk_update(
        &mut self,
        entity: &EntityTag,
        filter: &Predicate,
        field: &str,
        value: &Value,
    ) -> Result<u64, InternalError> {
        self.inner.bulk_update(entity, filter, field, value)
    }
}

impl TransactionPort for FlakyStore {
    fn load(&self, id: &RecordId) -> Result<Option<Record>, InternalError> {
        if self.fail_loads {
            return Err(InternalError::store_internal("connection reset"));
        }

        self.inner.load(id)
    }

    fn detach(&mut self, id: &RecordId) {
        self.inner.detach(id);
    }

    fn commit_secondary(&mut self, writes: &[FieldWrite]) -> Result<(), InternalError> {
        self.inner.commit_secondary(writes)
    }
}

fn queue_all(registry: &RuleRegistry, owner: &RecordId) -> WorkQueue {
    let mut queue = WorkQueue::new();
    for rule in registry.aggregates_for(&owner.entity) {
        queue.enqueue(owner.clone(), Arc::clone(rule));
    }

    queue
}

fn seeded_store(registry: &RuleRegistry) -> MemoryStore {
    let mut store = MemoryStore::for_registry(registry);
    store.seed(invoice(1));
    store.seed(line_item(1, 1, 10, "active"));
    store.seed(line_item(2, 1, 30, "active"));

    store
}

fn state<'a>(outcome: &'a AggregateOutcome, field: &str) -> &'a RecomputeState {
    &outcome
        .entries
        .iter()
        .find(|entry| entry.field == field)
        .expect("entry drained")
        .state
}

///
/// STATE MACHINE
///

#[test]
fn lifecycle_accepts_documented_transitions() {
    let computing = RecomputeState::Queued
        .advance(RecomputeState::Computing)
        .unwrap();
    let applied = computing
        .advance(RecomputeState::Applied { changed: true })
        .unwrap();
    assert!(applied.is_terminal());
    assert!(applied.is_applied());

    let skipped = RecomputeState::Queued
        .advance(RecomputeState::Skipped(SkipReason::OwnerDeleted))
        .unwrap();
    assert_eq!(skipped.skip_reason(), Some(SkipReason::OwnerDeleted));
}

#[test]
fn lifecycle_rejects_skipping_computation() {
    let err = RecomputeState::Queued
        .advance(RecomputeState::Applied { changed: false })
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert_eq!(err.origin, ErrorOrigin::Executor);
}

#[test]
fn lifecycle_rejects_leaving_a_terminal_state() {
    let applied = RecomputeState::Applied { changed: true };

    assert!(applied.advance(RecomputeState::Computing).is_err());
}

///
/// RECOMPUTE
///

#[test]
fn recompute_applies_in_priority_order_and_collects_writes() {
    let registry = invoice_registry();
    let store = seeded_store(&registry);
    let owner = RecordId::new(INVOICE, 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    let fields: Vec<_> = outcome.writes.iter().map(|w| w.field.as_str()).collect();
    assert_eq!(
        fields,
        [
            "total",
            "average",
            "largest",
            "above_average",
            "line_count",
            "local_total"
        ]
    );
    assert_eq!(outcome.modified.len(), 1);
    assert!(outcome.entries.iter().all(|entry| entry.state.is_applied()));
    // between 20 and 30 inclusive
    assert_eq!(
        outcome.writes[3].value,
        Value::Uint(1),
        "above_average sees fresh average and largest"
    );
}

#[test]
fn recompute_leaves_store_untouched() {
    let registry = invoice_registry();
    let store = seeded_store(&registry);
    let owner = RecordId::new(INVOICE, 1u64);

    recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    assert!(store.get(&owner).unwrap().get("total").is_null());
}

#[test]
fn null_result_falls_back_to_default() {
    let registry = invoice_registry();
    let mut store = MemoryStore::for_registry(&registry);
    store.seed(invoice(1).with("total", Decimal::from(99)));
    let owner = RecordId::new(INVOICE, 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    let total = outcome
        .writes
        .iter()
        .find(|write| write.field == "total")
        .unwrap();
    assert_eq!(total.value, Value::Decimal(Decimal::ZERO));
    // no default declared, nothing stored: unchanged
    assert!(matches!(
        state(&outcome, "average"),
        RecomputeState::Applied { changed: false }
    ));
}

#[test]
fn count_results_are_unsigned() {
    let registry = RuleRegistry::build([
        EntityModel::new("Team", "id")
            .field("id", FieldKind::Uint)
            .field("members", FieldKind::Uint)
            .aggregate(AggregateRule::count("members", "Player", "team_id")),
        EntityModel::new("Player", "id")
            .field("id", FieldKind::Uint)
            .belongs_to("team_id", FieldKind::Uint, "Team"),
    ])
    .unwrap();
    let mut store = MemoryStore::for_registry(&registry);
    store.seed(Record::new("Team", 1u64));
    store.seed(Record::new("Player", 1u64).with("team_id", 1u64));
    store.seed(Record::new("Player", 2u64).with("team_id", 1u64));
    let owner = RecordId::new("Team", 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    assert_eq!(outcome.writes[0].value, Value::Uint(2));
}

#[test]
fn failing_descriptor_does_not_stop_siblings() {
    let registry = invoice_registry();
    let mut store = FlakyStore::new(seeded_store(&registry));
    store.failing = Some(AggregateFunction::Max);
    let owner = RecordId::new(INVOICE, 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    assert!(state(&outcome, "largest").is_failed());
    assert!(state(&outcome, "total").is_applied());
    assert!(state(&outcome, "line_count").is_applied());
    assert!(outcome.writes.iter().all(|write| write.field != "largest"));
    assert_eq!(outcome.entries.len(), 6);
}

#[test]
fn owner_load_failure_fails_each_entry() {
    let registry = invoice_registry();
    let mut store = FlakyStore::new(seeded_store(&registry));
    store.fail_loads = true;
    let owner = RecordId::new(INVOICE, 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    assert_eq!(outcome.entries.len(), 6);
    assert!(outcome.entries.iter().all(|entry| entry.state.is_failed()));
    assert!(outcome.writes.is_empty());
}

#[test]
fn ledgered_and_missing_owners_are_skipped() {
    let registry = invoice_registry();
    let store = seeded_store(&registry);
    let deleted = RecordId::new(INVOICE, 1u64);
    let missing = RecordId::new(INVOICE, 2u64);
    let mut ledger = DeletionLedger::new();
    ledger.record(deleted.clone());

    let mut queue = queue_all(&registry, &deleted);
    for rule in registry.aggregates_for(&EntityTag::from(INVOICE)) {
        queue.enqueue(missing.clone(), Arc::clone(rule));
    }
    let outcome = recompute(&store, &ledger, queue.drain());

    for entry in &outcome.entries {
        let expected = if entry.owner == deleted {
            SkipReason::OwnerDeleted
        } else {
            SkipReason::OwnerMissing
        };
        assert_eq!(entry.state.skip_reason(), Some(expected));
    }
    assert!(outcome.modified.is_empty());
}

#[test]
fn member_filter_reads_only_the_owners_members() {
    let registry = invoice_registry();
    let mut store = seeded_store(&registry);
    store.seed(invoice(2));
    store.seed(Record::new(LINE_ITEM, 9u64).with("invoice_id", 2u64).with("amount", Decimal::from(500)));
    let owner = RecordId::new(INVOICE, 1u64);

    let outcome = recompute(&store, &DeletionLedger::new(), queue_all(&registry, &owner).drain());

    let line_count = outcome
        .writes
        .iter()
        .find(|write| write.field == "line_count")
        .unwrap();
    assert_eq!(line_count.value, Value::Uint(2));
}
