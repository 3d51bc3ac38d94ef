//! Change Observer.
//!
//! Classifies lifecycle events against the rule registry. Aggregate rules
//! become work-queue intents; exclusivity rules run immediately through the
//! exclusive executor path.


use crate::{
    error::InternalError,
    executor::exclusive::{self, Trigger},
    key::Key,
    ledger::DeletionLedger,
    port::Persistence,
    queue::WorkQueue,
    record::{Changeset, Record, RecordId},
    registry::{MemberDependency, RuleRegistry},
    value::Value,
};
use std::sync::Arc;
use tracing::debug;

///
/// ChangeObserver
///

#[derive(Clone, Copy, Debug)]
pub struct ChangeObserver<'r> {
    registry: &'r RuleRegistry,
}

impl<'r> ChangeObserver<'r> {
    #[must_use]
    pub const fn new(registry: &'r RuleRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub const fn registry(&self) -> &'r RuleRegistry {
        self.registry
    }

    /// A record was inserted.
    pub fn on_insert(
        &self,
        port: &mut dyn Persistence,
        queue: &mut WorkQueue,
        record: &mut Record,
    ) -> Result<(), InternalError> {
        for rule in self.registry.exclusives_for(&record.entity) {
            exclusive::after_write(port, rule, record, Trigger::Insert)?;
        }

        for dep in self.registry.member_dependencies(&record.entity) {
            Self::enqueue_owner(queue, dep, record.get(&dep.association));
        }

        Ok(())
    }

    /// A record was updated; `changes` holds both sides of every changed field.
    pub fn on_update(
        &self,
        port: &mut dyn Persistence,
        queue: &mut WorkQueue,
        record: &mut Record,
        changes: &Changeset,
    ) -> Result<(), InternalError> {
        if changes.is_empty() {
            return Ok(());
        }
        if let Some(entity) = self.registry.entity(&record.entity)
            && changes.contains(&entity.primary_key)
        {
            return Err(InternalError::observer_invariant(format!(
                "primary key of {} changed in update",
                record.id()
            )));
        }

        for rule in self.registry.exclusives_for(&record.entity) {
            exclusive::after_write(port, rule, record, Trigger::Update(changes))?;
        }

        // member side: the old owner loses the member when the key moves
        for dep in self.registry.member_dependencies(&record.entity) {
            if !dep.rule.reads_any(changes) {
                continue;
            }
            if let Some(previous) = changes.old(&dep.association) {
                Self::enqueue_owner(queue, dep, previous);
            }
            Self::enqueue_owner(queue, dep, record.get(&dep.association));
        }

        // owner side
        let id = record.id();
        for rule in self.registry.owner_rules_touched(&record.entity, changes) {
            queue.enqueue(id.clone(), Arc::clone(rule));
        }

        Ok(())
    }

    /// A record is about to be deleted.
    pub fn on_delete(
        &self,
        port: &mut dyn Persistence,
        queue: &mut WorkQueue,
        ledger: &mut DeletionLedger,
        record: &Record,
    ) -> Result<(), InternalError> {
        ledger.record(record.id());

        for rule in self.registry.exclusives_for(&record.entity) {
            exclusive::before_delete(port, rule, record)?;
        }

        for dep in self.registry.member_dependencies(&record.entity) {
            Self::enqueue_owner(queue, dep, record.get(&dep.association));
        }

        Ok(())
    }

    fn enqueue_owner(queue: &mut WorkQueue, dep: &MemberDependency, value: &Value) {
        match Key::try_from_value(value) {
            Some(key) => {
                queue.enqueue(RecordId::new(dep.owner.clone(), key), Arc::clone(&dep.rule));
            }
            None => debug!(
                owner = %dep.owner,
                association = %dep.association,
                value = %value,
                "association does not resolve to an owner; skipping"
            ),
        }
    }
}
