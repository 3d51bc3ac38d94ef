//! In-memory reference host.
//!
//! A complete `Persistence` implementation over a `BTreeMap`, plus a
//! transaction that dispatches lifecycle events the way an ORM event
//! pipeline would. Used by the engine's own tests and as a template for
//! real hosts.

mod transaction;


use crate::{
    error::InternalError,
    model::{AggregateFunction, EntityTag},
    port::{BulkUpdatePort, FieldWrite, QueryPort, TransactionPort},
    predicate::Predicate,
    record::{Record, RecordId},
    registry::{Catalog, RuleRegistry},
    value::{NumericFold, Value},
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};
use tracing::debug;

pub use transaction::MemoryTransaction;

///
/// MemoryStore
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Catalog,
    rows: BTreeMap<RecordId, Record>,
    detached: BTreeSet<RecordId>,
    secondary_log: Vec<FieldWrite>,
    /// Prior images of rows touched by the open transaction.
    undo: Option<Vec<(RecordId, Option<Record>)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_registry(registry: &RuleRegistry) -> Self {
        Self::new(registry.catalog().clone())
    }

    /// Store a record without dispatching any lifecycle event.
    pub fn seed(&mut self, record: Record) {
        let record = self.normalize(record);
        self.write_row(record);
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.rows.get(id)
    }

    /// Rows of `entity` and its subtypes.
    pub fn rows<'a>(&'a self, entity: &'a EntityTag) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows
            .values()
            .filter(move |row| self.catalog.is_a(&row.entity, entity))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every write applied through `commit_secondary`, in order.
    #[must_use]
    pub fn secondary_log(&self) -> &[FieldWrite] {
        &self.secondary_log
    }

    #[must_use]
    pub fn is_detached(&self, id: &RecordId) -> bool {
        self.detached.contains(id)
    }

    /// Open a transaction whose events are dispatched to `listener`.
    pub fn begin<'a, L>(&'a mut self, listener: &'a mut L) -> MemoryTransaction<'a, L>
    where
        L: crate::port::LifecycleListener + ?Sized,
    {
        MemoryTransaction::new(self, listener)
    }

    // Mirror the primary key into `fields` so filters can read it.
    fn normalize(&self, mut record: Record) -> Record {
        if let Some(pk) = self.catalog.primary_key(&record.entity) {
            record.fields.insert(pk.to_string(), record.key.to_value());
        }

        record
    }

    fn remember(&mut self, id: &RecordId) {
        if let Some(undo) = self.undo.as_mut() {
            undo.push((id.clone(), self.rows.get(id).cloned()));
        }
    }

    fn write_row(&mut self, record: Record) {
        let id = record.id();
        self.remember(&id);
        self.rows.insert(id, record);
    }

    fn remove_row(&mut self, id: &RecordId) -> Option<Record> {
        self.remember(id);
        self.rows.remove(id)
    }

    fn begin_undo(&mut self) {
        self.detached.clear();
        self.undo = Some(Vec::new());
    }

    fn discard_undo(&mut self) {
        self.undo = None;
    }

    fn rollback_undo(&mut self) {
        if let Some(undo) = self.undo.take() {
            for (id, prior) in undo.into_iter().rev() {
                match prior {
                    Some(row) => self.rows.insert(id, row),
                    None => self.rows.remove(&id),
                };
            }
        }
    }

    fn matching<'a>(
        &'a self,
        entity: &'a EntityTag,
        filter: &'a Predicate,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(entity).filter(move |row| filter.matches(row))
    }
}

impl QueryPort for MemoryStore {
    fn aggregate(
        &self,
        entity: &EntityTag,
        function: AggregateFunction,
        field: Option<&str>,
        filter: &Predicate,
    ) -> Result<Value, InternalError> {
        let rows = self.matching(entity, filter);

        let Some(field) = field else {
            return match function {
                AggregateFunction::Count => Ok(Value::Uint(rows.count() as u64)),
                _ => Err(InternalError::query_unsupported(format!(
                    "{function} over {entity} requires a field"
                ))),
            };
        };
        let values = rows.map(|row| row.get(field)).filter(|v| !v.is_null());

        match function {
            AggregateFunction::Count => Ok(Value::Uint(values.count() as u64)),
            AggregateFunction::Sum | AggregateFunction::Avg => {
                let mut fold = NumericFold::new();
                for value in values {
                    fold.push(value)?;
                }
                if function == AggregateFunction::Sum {
                    Ok(fold.sum())
                } else {
                    Ok(fold.avg()?)
                }
            }
            AggregateFunction::Min => extreme(values, Ordering::Less),
            AggregateFunction::Max => extreme(values, Ordering::Greater),
        }
    }
}

// Smallest (`Less`) or largest (`Greater`) value; mixed incomparable
// values are a query error.
fn extreme<'a>(
    values: impl Iterator<Item = &'a Value>,
    wanted: Ordering,
) -> Result<Value, InternalError> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            None => Some(value),
            Some(current) => match Value::semantic_cmp(value, current) {
                Some(ord) if ord == wanted => Some(value),
                Some(_) => Some(current),
                None => {
                    return Err(InternalError::query_unsupported(format!(
                        "cannot order {value} against {current}"
                    )));
                }
            },
        };
    }

    Ok(best.cloned().unwrap_or_default())
}

impl BulkUpdatePort for MemoryStore {
    fn bulk_update(
        &mut self,
        entity: &EntityTag,
        filter: &Predicate,
        field: &str,
        value: &Value,
    ) -> Result<u64, InternalError> {
        let targets: Vec<RecordId> = self.matching(entity, filter).map(Record::id).collect();

        for id in &targets {
            if let Some(mut row) = self.rows.get(id).cloned() {
                row.set(field, value.clone());
                self.write_row(row);
            }
        }

        Ok(targets.len() as u64)
    }
}

impl TransactionPort for MemoryStore {
    fn load(&self, id: &RecordId) -> Result<Option<Record>, InternalError> {
        Ok(self.rows.get(id).cloned())
    }

    fn detach(&mut self, id: &RecordId) {
        self.detached.insert(id.clone());
    }

    fn commit_secondary(&mut self, writes: &[FieldWrite]) -> Result<(), InternalError> {
        for write in writes {
            if self.detached.contains(&write.owner) {
                debug!(owner = %write.owner, field = %write.field, "write to detached record dropped");
                continue;
            }
            let Some(row) = self.rows.get_mut(&write.owner) else {
                debug!(owner = %write.owner, field = %write.field, "write to missing record dropped");
                continue;
            };
            row.set(write.field.clone(), write.value.clone());
            self.secondary_log.push(write.clone());
        }

        Ok(())
    }
}
