//! Exclusivity path.
//!
//! Runs synchronously inside the primary write's hooks. Cancel-others always
//! precedes ensure-holder. Bulk updates bypass lifecycle dispatch, so nothing
//! here can re-enter the observer.

use crate::{
    error::InternalError,
    key::Key,
    model::AggregateFunction,
    obs::sink::{self, MetricsEvent},
    port::Persistence,
    predicate::Predicate,
    record::{Changeset, Record},
    registry::ResolvedExclusive,
    value::ValueError,
};
use tracing::debug;

///
/// Trigger
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum Trigger<'a> {
    Insert,
    Update(&'a Changeset),
}

/// Apply a rule after `record` was inserted or updated. May set the flag on
/// `record` in memory when the group would otherwise have no holder, or clear
/// it when the record stops being an eligible holder and a successor exists.
pub(crate) fn after_write(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    record: &mut Record,
    trigger: Trigger<'_>,
) -> Result<(), InternalError> {
    let before = match trigger {
        Trigger::Insert => None,
        Trigger::Update(changes) => Some(previous_image(record, changes)),
    };

    if let (Trigger::Update(changes), Some(before)) = (trigger, &before) {
        hand_over(port, rule, record, changes, before)?;
    }

    if !rule.in_scope(record) {
        return Ok(());
    }

    if rule.holds(record) && should_cancel(rule, trigger, before.as_ref()) {
        cancel_others(port, rule, record)?;
    }

    // a claimed flag may still collide with a holder outside the ensure scope
    if rule.ensure_holder && rule.in_ensure_scope(record) && ensure_holder(port, rule, record)? {
        cancel_others(port, rule, record)?;
    }

    Ok(())
}

/// Apply a rule before `record` is deleted: a departing holder hands the
/// flag to the group member with the smallest primary key.
pub(crate) fn before_delete(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    record: &Record,
) -> Result<(), InternalError> {
    if rule.ensure_holder && rule.in_scope(record) && rule.holds(record) {
        elect_successor(port, rule, record)?;
    }

    Ok(())
}

// A holder that leaves its group elects a successor there. A holder that
// stays in the group but leaves the ensure scope yields the flag, provided
// some eligible member takes it over.
fn hand_over(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    record: &mut Record,
    changes: &Changeset,
    before: &Record,
) -> Result<(), InternalError> {
    if !rule.ensure_holder || !rule.in_scope(before) || !rule.holds(before) {
        return Ok(());
    }

    if group_moved(rule, changes) || !rule.in_scope(record) {
        elect_successor(port, rule, before)?;
    } else if rule.holds(record)
        && rule.in_ensure_scope(before)
        && !rule.in_ensure_scope(record)
        && elect_successor(port, rule, before)?
    {
        record.set(rule.field.clone(), rule.fallback.clone());
    }

    Ok(())
}

// With `cancel_on_set`, only a record that newly holds the flag within its
// group cancels the others: the flag was set, the group changed, or the
// record entered the filtered scope.
fn should_cancel(
    rule: &ResolvedExclusive,
    trigger: Trigger<'_>,
    before: Option<&Record>,
) -> bool {
    if !rule.cancel_on_set {
        return true;
    }

    match (trigger, before) {
        (Trigger::Update(changes), Some(before)) => {
            changes.contains(&rule.field)
                || group_moved(rule, changes)
                || !rule.in_scope(before)
        }
        _ => true,
    }
}

fn group_moved(rule: &ResolvedExclusive, changes: &Changeset) -> bool {
    rule.group_by.iter().any(|field| changes.contains(field))
}

// Rebuild the image the record had before `changes` were applied.
fn previous_image(record: &Record, changes: &Changeset) -> Record {
    let mut before = record.clone();
    for field in changes.fields() {
        if let Some(old) = changes.old(field) {
            before.set(field, old.clone());
        }
    }

    before
}

// group equality ∧ static filters, evaluated against `record`'s values
fn group_filter(rule: &ResolvedExclusive, record: &Record) -> Vec<Predicate> {
    rule.group_by
        .iter()
        .map(|field| Predicate::eq(field.as_str(), record.get(field).clone()))
        .chain(
            rule.filters
                .iter()
                .map(|(field, value)| Predicate::eq(field.as_str(), value.clone())),
        )
        .collect()
}

fn excluding(rule: &ResolvedExclusive, record: &Record) -> Predicate {
    Predicate::ne(rule.primary_key.as_str(), record.key.to_value())
}

fn holder_filter(rule: &ResolvedExclusive) -> Predicate {
    Predicate::eq(rule.field.as_str(), rule.exclusive.clone())
}

fn cancel_others(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    record: &Record,
) -> Result<(), InternalError> {
    let mut clauses = group_filter(rule, record);
    clauses.push(holder_filter(rule));
    clauses.push(excluding(rule, record));
    let filter = Predicate::conjoin(clauses);

    let affected = port.bulk_update(&rule.scope, &filter, &rule.field, &rule.fallback)?;
    if affected > 0 {
        debug!(
            entity = %rule.scope,
            field = %rule.field,
            holder = %record.id(),
            affected,
            "cancelled other holders"
        );
    }
    sink::record(MetricsEvent::ExclusiveCancel {
        entity: rule.scope.as_str(),
        affected,
    });

    Ok(())
}

// Returns true when `record` claimed the flag.
fn ensure_holder(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    record: &mut Record,
) -> Result<bool, InternalError> {
    if rule.holds(record) {
        return Ok(false);
    }

    let mut clauses = group_filter(rule, record);
    clauses.extend(
        rule.ensure_filters
            .iter()
            .map(|(field, value)| Predicate::eq(field.as_str(), value.clone())),
    );
    clauses.push(holder_filter(rule));
    clauses.push(excluding(rule, record));

    let others = count(port, rule, &Predicate::conjoin(clauses))?;
    if others == 0 {
        debug!(
            entity = %rule.scope,
            field = %rule.field,
            holder = %record.id(),
            "group has no holder; claiming flag"
        );
        record.set(rule.field.clone(), rule.exclusive.clone());
    }

    Ok(others == 0)
}

// Hand the flag to the smallest remaining key in `image`'s group, unless
// another holder already exists there. Returns true when the group ends up
// with a holder other than `image`.
fn elect_successor(
    port: &mut dyn Persistence,
    rule: &ResolvedExclusive,
    image: &Record,
) -> Result<bool, InternalError> {
    let mut group = group_filter(rule, image);
    group.extend(
        rule.ensure_filters
            .iter()
            .map(|(field, value)| Predicate::eq(field.as_str(), value.clone())),
    );
    group.push(excluding(rule, image));

    let mut holders = group.clone();
    holders.push(holder_filter(rule));
    if count(port, rule, &Predicate::conjoin(holders))? > 0 {
        return Ok(true);
    }

    let smallest = port.aggregate(
        &rule.scope,
        AggregateFunction::Min,
        Some(&rule.primary_key),
        &Predicate::conjoin(group),
    )?;
    let Some(successor) = Key::try_from_value(&smallest) else {
        // empty group
        return Ok(false);
    };

    let filter = Predicate::eq(rule.primary_key.as_str(), successor.to_value());
    port.bulk_update(&rule.scope, &filter, &rule.field, &rule.exclusive)?;
    debug!(
        entity = %rule.scope,
        field = %rule.field,
        successor = %successor,
        "elected successor holder"
    );
    sink::record(MetricsEvent::ExclusiveElect {
        entity: rule.scope.as_str(),
    });

    Ok(true)
}

fn count(
    port: &dyn Persistence,
    rule: &ResolvedExclusive,
    filter: &Predicate,
) -> Result<u64, InternalError> {
    let value = port.aggregate(&rule.scope, AggregateFunction::Count, None, filter)?;
    if value.is_null() {
        return Ok(0);
    }

    value.as_count().ok_or_else(|| {
        ValueError::CountNotInteger {
            value: value.to_string(),
        }
        .into()
    })
}
