use serde::{Deserialize, Serialize};
use std::{cell::RefCell, cmp::Ordering, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for recompute and exclusivity activity.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            entities: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Work queue
    pub enqueued: u64,
    pub deduplicated: u64,

    // Aggregate recompute
    pub recomputed: u64,
    pub recompute_changed: u64,
    pub recompute_failed: u64,
    pub skipped_deleted: u64,
    pub skipped_missing: u64,

    // Exclusivity
    pub exclusive_cancels: u64,
    pub exclusive_rows_cancelled: u64,
    pub exclusive_elections: u64,

    // Secondary commit
    pub secondary_commits: u64,
    pub secondary_writes: u64,
    pub secondary_commit_failures: u64,

    // System-origin events ignored by the observer
    pub recursion_guards: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub enqueued: u64,
    pub recomputed: u64,
    pub recompute_failed: u64,
    pub skipped: u64,
    pub exclusive_rows_cancelled: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

#[allow(clippy::cast_sign_loss)]
fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Borrow one entity's counters mutably, creating them on first use.
pub(crate) fn entity_mut<'a>(m: &'a mut EventState, entity: &str) -> &'a mut EntityCounters {
    m.entities.entry(entity.to_string()).or_default()
}

/// Reset all counters and restart the window.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `window_start_ms`.
    pub counters: Option<EventState>,
    /// Per-entity counters, noisiest failures first.
    pub entity_counters: Vec<EntitySummary>,
}

///
/// EntitySummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntitySummary {
    pub entity: String,
    pub enqueued: u64,
    pub recomputed: u64,
    pub recompute_failed: u64,
    pub skipped: u64,
    pub exclusive_rows_cancelled: u64,
    pub failure_rate: f64,
}

/// Build a report, or an empty one when the window started after
/// `window_start_ms`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if window_start_ms.is_some_and(|start| start > snap.window_start_ms) {
        return EventReport::default();
    }

    let mut entity_counters: Vec<EntitySummary> = snap
        .entities
        .iter()
        .map(|(entity, c)| {
            let attempts = c.recomputed + c.recompute_failed;
            let failure_rate = if attempts > 0 {
                c.recompute_failed as f64 / attempts as f64
            } else {
                0.0
            };

            EntitySummary {
                entity: entity.clone(),
                enqueued: c.enqueued,
                recomputed: c.recomputed,
                recompute_failed: c.recompute_failed,
                skipped: c.skipped,
                exclusive_rows_cancelled: c.exclusive_rows_cancelled,
                failure_rate,
            }
        })
        .collect();

    entity_counters.sort_by(|a, b| {
        b.failure_rate
            .partial_cmp(&a.failure_rate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.enqueued.cmp(&a.enqueued))
            .then_with(|| a.entity.cmp(&b.entity))
    });

    EventReport {
        counters: Some(snap),
        entity_counters,
    }
}

///
/// TESTS
///

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.enqueued = 3;
            m.ops.secondary_writes = 2;
            m.entities.insert(
                "alpha".to_string(),
                EntityCounters {
                    recomputed: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.enqueued, 0);
            assert_eq!(m.ops.secondary_writes, 0);
            assert!(m.entities.is_empty());
        });
    }

    #[test]
    fn report_sorts_entities_by_failure_rate() {
        reset_all();
        with_state_mut(|m| {
            m.entities.insert(
                "alpha".to_string(),
                EntityCounters {
                    recomputed: 3,
                    recompute_failed: 1,
                    enqueued: 4,
                    ..Default::default()
                },
            );
            m.entities.insert(
                "beta".to_string(),
                EntityCounters {
                    recomputed: 1,
                    recompute_failed: 1,
                    enqueued: 2,
                    ..Default::default()
                },
            );
            m.entities.insert(
                "gamma".to_string(),
                EntityCounters {
                    recomputed: 6,
                    recompute_failed: 2,
                    enqueued: 8,
                    ..Default::default()
                },
            );
        });

        let report = report_window_start(None);
        let entities: Vec<_> = report
            .entity_counters
            .iter()
            .map(|e| e.entity.as_str())
            .collect();

        // failure rate desc, then enqueued desc, then name asc
        assert_eq!(entities, ["beta", "gamma", "alpha"]);
        assert_eq!(report.entity_counters[0].failure_rate, 0.5);
        assert_eq!(report.entity_counters[1].failure_rate, 0.25);
    }

    #[test]
    fn report_round_trips_through_json() {
        reset_all();
        with_state_mut(|m| {
            m.ops.secondary_commits = 2;
            entity_mut(m, "Invoice").enqueued = 5;
        });

        let report = report_window_start(None);
        let json = serde_json::to_string(&report).unwrap();
        let back: EventReport = serde_json::from_str(&json).unwrap();

        assert_eq!(back.counters.unwrap().ops.secondary_commits, 2);
        assert_eq!(back.entity_counters[0].entity, "Invoice");
    }

    #[test]
    fn later_window_start_yields_empty_report() {
        reset_all();
        let start = with_state(|m| m.window_start_ms);

        let report = report_window_start(Some(start + 60_000));

        assert!(report.counters.is_none());
    }
}
