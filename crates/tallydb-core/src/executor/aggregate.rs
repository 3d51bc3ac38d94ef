use crate::{
    error::InternalError,
    executor::{AggregateOutcome, EntryReport, RecomputeState, SkipReason},
    ledger::DeletionLedger,
    model::AggregateFunction,
    obs::sink::{self, MetricsEvent},
    port::{FieldWrite, Persistence},
    queue::{OwnerBatch, RecomputeDescriptor},
    record::Record,
    registry::ResolvedAggregate,
    value::{Value, ValueError},
};
use tracing::{debug, warn};

/// Recompute every drained descriptor.
///
/// Owners are processed one batch at a time; within a batch descriptors run
/// in priority order and see the values written by earlier ones. A failing
/// descriptor is isolated: it is reported and its siblings continue.
pub(crate) fn recompute(
    port: &dyn Persistence,
    ledger: &DeletionLedger,
    batches: Vec<OwnerBatch>,
) -> AggregateOutcome {
    let mut outcome = AggregateOutcome::default();

    for batch in batches {
        if ledger.contains(&batch.owner) {
            skip_batch(&mut outcome, batch, SkipReason::OwnerDeleted);
            continue;
        }

        let owner = match port.load(&batch.owner) {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                skip_batch(&mut outcome, batch, SkipReason::OwnerMissing);
                continue;
            }
            Err(err) => {
                fail_batch(&mut outcome, batch, &err);
                continue;
            }
        };

        recompute_owner(port, &mut outcome, owner, batch.descriptors);
    }

    outcome
}

fn recompute_owner(
    port: &dyn Persistence,
    outcome: &mut AggregateOutcome,
    mut owner: Record,
    descriptors: Vec<RecomputeDescriptor>,
) {
    let id = owner.id();
    let entity = id.entity.as_str();

    for descriptor in descriptors {
        let field = descriptor.rule.field.clone();
        let state = RecomputeState::Queued.advance(RecomputeState::Computing);

        let next = match compute(port, &owner, &descriptor.rule) {
            Ok(value) => {
                let changed = *owner.get(&field) != value;
                if changed {
                    owner.set(field.clone(), value.clone());
                    outcome.writes.push(FieldWrite {
                        owner: id.clone(),
                        field: field.clone(),
                        value,
                    });
                    outcome.modified.insert(id.clone());
                }
                sink::record(MetricsEvent::Recomputed { entity, changed });

                RecomputeState::Applied { changed }
            }
            Err(err) => {
                warn!(
                    entity,
                    key = %id.key,
                    field = %field,
                    error = %err.display_with_class(),
                    "derived field recompute failed"
                );
                sink::record(MetricsEvent::RecomputeFailed { entity });

                RecomputeState::Failed(err)
            }
        };

        let state = state
            .and_then(|state| state.advance(next))
            .unwrap_or_else(RecomputeState::Failed);
        outcome.entries.push(EntryReport {
            owner: id.clone(),
            field,
            state,
        });
    }
}

/// Run one aggregate for `owner` and apply the rule's default and
/// count normalization.
fn compute(
    port: &dyn Persistence,
    owner: &Record,
    rule: &ResolvedAggregate,
) -> Result<Value, InternalError> {
    let filter = rule.member_filter(owner)?;
    let raw = port.aggregate(
        &rule.member,
        rule.function,
        rule.member_field.as_deref(),
        &filter,
    )?;

    if raw.is_null() {
        return Ok(rule.default.clone());
    }

    match rule.function {
        AggregateFunction::Count => raw.as_count().map(Value::Uint).ok_or_else(|| {
            ValueError::CountNotInteger {
                value: raw.to_string(),
            }
            .into()
        }),
        _ => Ok(raw),
    }
}

fn skip_batch(outcome: &mut AggregateOutcome, batch: OwnerBatch, reason: SkipReason) {
    debug!(owner = %batch.owner, %reason, "skipping derived field recompute");

    for descriptor in batch.descriptors {
        sink::record(MetricsEvent::Skipped {
            entity: batch.owner.entity.as_str(),
            reason,
        });
        let state = RecomputeState::Queued
            .advance(RecomputeState::Skipped(reason))
            .unwrap_or_else(RecomputeState::Failed);
        outcome.entries.push(EntryReport {
            owner: batch.owner.clone(),
            field: descriptor.rule.field.clone(),
            state,
        });
    }
}

fn fail_batch(outcome: &mut AggregateOutcome, batch: OwnerBatch, err: &InternalError) {
    warn!(
        owner = %batch.owner,
        error = %err.display_with_class(),
        "owner load failed; derived fields left unchanged"
    );

    for descriptor in batch.descriptors {
        sink::record(MetricsEvent::RecomputeFailed {
            entity: batch.owner.entity.as_str(),
        });
        outcome.entries.push(EntryReport {
            owner: batch.owner.clone(),
            field: descriptor.rule.field.clone(),
            state: RecomputeState::Failed(err.summary_clone()),
        });
    }
}
