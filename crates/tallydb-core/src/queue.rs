//! Work Queue.
//!
//! Per-transaction intents collected by the observer and drained once the
//! primary write is durable. At most one entry exists per `(owner, field)`.

use crate::{
    obs::sink::{self, MetricsEvent},
    record::RecordId,
    registry::ResolvedAggregate,
};
use std::{collections::BTreeMap, mem, sync::Arc};
use tracing::{debug, trace};

///
/// RecomputeDescriptor
///

#[derive(Clone, Debug)]
pub struct RecomputeDescriptor {
    pub owner: RecordId,
    pub rule: Arc<ResolvedAggregate>,
}

impl RecomputeDescriptor {
    #[must_use]
    pub fn field(&self) -> &str {
        &self.rule.field
    }
}

///
/// Enqueued
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Enqueued {
    New,
    /// An entry for the same `(owner, field)` existed and was overwritten.
    Replaced,
}

///
/// OwnerBatch
///
/// One owner's descriptors in execution order.
///

#[derive(Debug)]
pub struct OwnerBatch {
    pub owner: RecordId,
    pub descriptors: Vec<RecomputeDescriptor>,
}

///
/// WorkQueue
///

#[derive(Debug, Default)]
pub struct WorkQueue {
    entries: BTreeMap<RecordId, BTreeMap<String, RecomputeDescriptor>>,
}

impl WorkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `rule` for `owner`. The last-enqueued rule for a field wins.
    pub fn enqueue(&mut self, owner: RecordId, rule: Arc<ResolvedAggregate>) -> Enqueued {
        let field = rule.field.clone();
        let entity = owner.entity.as_str().to_string();
        let descriptor = RecomputeDescriptor {
            owner: owner.clone(),
            rule,
        };

        let replaced = self
            .entries
            .entry(owner)
            .or_default()
            .insert(field.clone(), descriptor)
            .is_some();

        if replaced {
            debug!(entity = %entity, field = %field, "recompute already queued");
            sink::record(MetricsEvent::Deduplicated { entity: &entity });
            Enqueued::Replaced
        } else {
            trace!(entity = %entity, field = %field, "recompute queued");
            sink::record(MetricsEvent::Enqueued { entity: &entity });
            Enqueued::New
        }
    }

    #[must_use]
    pub fn contains(&self, owner: &RecordId, field: &str) -> bool {
        self.entries
            .get(owner)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Total number of queued `(owner, field)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Take every entry, grouped by owner, each group ordered by priority
    /// descending then field name. The queue is empty afterwards.
    pub fn drain(&mut self) -> Vec<OwnerBatch> {
        mem::take(&mut self.entries)
            .into_iter()
            .map(|(owner, fields)| {
                let mut descriptors: Vec<_> = fields.into_values().collect();
                descriptors.sort_by(|a, b| {
                    b.rule
                        .priority
                        .cmp(&a.rule.priority)
                        .then_with(|| a.rule.field.cmp(&b.rule.field))
                });

                OwnerBatch { owner, descriptors }
            })
            .collect()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::EntityTag,
        test_fixtures::{INVOICE, invoice_registry},
    };
    use proptest::prelude::*;

    fn rules() -> Vec<Arc<ResolvedAggregate>> {
        invoice_registry()
            .aggregates_for(&EntityTag::from(INVOICE))
            .to_vec()
    }

    #[test]
    fn enqueue_overwrites_same_owner_and_field() {
        let rules = rules();
        let mut queue = WorkQueue::new();
        let owner = RecordId::new(INVOICE, 1u64);

        assert_eq!(queue.enqueue(owner.clone(), Arc::clone(&rules[0])), Enqueued::New);
        assert_eq!(
            queue.enqueue(owner.clone(), Arc::clone(&rules[0])),
            Enqueued::Replaced
        );
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&owner, &rules[0].field));
    }

    #[test]
    fn drain_orders_by_priority_then_field_and_clears() {
        let rules = rules();
        let mut queue = WorkQueue::new();
        let owner = RecordId::new(INVOICE, 1u64);
        for rule in rules.iter().rev() {
            queue.enqueue(owner.clone(), Arc::clone(rule));
        }
        queue.enqueue(RecordId::new(INVOICE, 2u64), Arc::clone(&rules[3]));

        let batches = queue.drain();

        assert!(queue.is_empty());
        assert_eq!(batches.len(), 2);
        let fields: Vec<_> = batches[0]
            .descriptors
            .iter()
            .map(RecomputeDescriptor::field)
            .collect();
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
        assert_eq!(batches[1].owner, RecordId::new(INVOICE, 2u64));
    }

    proptest! {
        // However many times owners and fields are enqueued, the drained
        // queue holds exactly one entry per distinct pair.
        #[test]
        fn drain_yields_one_entry_per_owner_field(
            events in proptest::collection::vec((0u64..5, 0usize..6), 0..64)
        ) {
            let rules = rules();
            let mut queue = WorkQueue::new();
            let mut expected = std::collections::BTreeSet::new();

            for (key, rule) in &events {
                let owner = RecordId::new(INVOICE, *key);
                queue.enqueue(owner, Arc::clone(&rules[*rule]));
                expected.insert((*key, rules[*rule].field.clone()));
            }

            let drained: Vec<_> = queue
                .drain()
                .into_iter()
                .flat_map(|batch| batch.descriptors)
                .collect();

            prop_assert_eq!(drained.len(), expected.len());
            prop_assert!(queue.is_empty());
        }
    }
}
