//! Metrics sink boundary.
//!
//! Engine logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the global metrics state.
use crate::{executor::SkipReason, obs::metrics};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Enqueued {
        entity: &'a str,
    },
    Deduplicated {
        entity: &'a str,
    },
    Skipped {
        entity: &'a str,
        reason: SkipReason,
    },
    Recomputed {
        entity: &'a str,
        changed: bool,
    },
    RecomputeFailed {
        entity: &'a str,
    },
    ExclusiveCancel {
        entity: &'a str,
        affected: u64,
    },
    ExclusiveElect {
        entity: &'a str,
    },
    SecondaryCommit {
        writes: u64,
    },
    SecondaryCommitFailed,
    RecursionGuard {
        entity: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::Enqueued { entity } => metrics::with_state_mut(|m| {
                m.ops.enqueued = m.ops.enqueued.saturating_add(1);
                let entry = metrics::entity_mut(m, entity);
                entry.enqueued = entry.enqueued.saturating_add(1);
            }),

            MetricsEvent::Deduplicated { .. } => metrics::with_state_mut(|m| {
                m.ops.deduplicated = m.ops.deduplicated.saturating_add(1);
            }),

            MetricsEvent::Skipped { entity, reason } => metrics::with_state_mut(|m| {
                match reason {
                    SkipReason::OwnerDeleted => {
                        m.ops.skipped_deleted = m.ops.skipped_deleted.saturating_add(1);
                    }
                    SkipReason::OwnerMissing => {
                        m.ops.skipped_missing = m.ops.skipped_missing.saturating_add(1);
                    }
                }
                let entry = metrics::entity_mut(m, entity);
                entry.skipped = entry.skipped.saturating_add(1);
            }),

            MetricsEvent::Recomputed { entity, changed } => metrics::with_state_mut(|m| {
                m.ops.recomputed = m.ops.recomputed.saturating_add(1);
                if changed {
                    m.ops.recompute_changed = m.ops.recompute_changed.saturating_add(1);
                }
                let entry = metrics::entity_mut(m, entity);
                entry.recomputed = entry.recomputed.saturating_add(1);
            }),

            MetricsEvent::RecomputeFailed { entity } => metrics::with_state_mut(|m| {
                m.ops.recompute_failed = m.ops.recompute_failed.saturating_add(1);
                let entry = metrics::entity_mut(m, entity);
                entry.recompute_failed = entry.recompute_failed.saturating_add(1);
            }),

            MetricsEvent::ExclusiveCancel { entity, affected } => metrics::with_state_mut(|m| {
                m.ops.exclusive_cancels = m.ops.exclusive_cancels.saturating_add(1);
                m.ops.exclusive_rows_cancelled =
                    m.ops.exclusive_rows_cancelled.saturating_add(affected);
                let entry = metrics::entity_mut(m, entity);
                entry.exclusive_rows_cancelled =
                    entry.exclusive_rows_cancelled.saturating_add(affected);
            }),

            MetricsEvent::ExclusiveElect { .. } => metrics::with_state_mut(|m| {
                m.ops.exclusive_elections = m.ops.exclusive_elections.saturating_add(1);
            }),

            MetricsEvent::SecondaryCommit { writes } => metrics::with_state_mut(|m| {
                m.ops.secondary_commits = m.ops.secondary_commits.saturating_add(1);
                m.ops.secondary_writes = m.ops.secondary_writes.saturating_add(writes);
            }),

            MetricsEvent::SecondaryCommitFailed => metrics::with_state_mut(|m| {
                m.ops.secondary_commit_failures =
                    m.ops.secondary_commit_failures.saturating_add(1);
            }),

            MetricsEvent::RecursionGuard { .. } => metrics::with_state_mut(|m| {
                m.ops.recursion_guards = m.ops.recursion_guards.saturating_add(1);
            }),
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // Preconditions:
        // - `ptr` was produced from a valid `&dyn MetricsSink` in `with_metrics_sink`.
        // - `with_metrics_sink` always restores the previous pointer before returning,
        //   including unwind paths via `Guard::drop`.
        // - `record` is synchronous and never stores `ptr` beyond this call.
        //
        // Aliasing:
        // - Only a shared reference is materialized, matching the shared borrow
        //   used to install the override.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_METRICS_SINK.record(event);
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // - `sink_ptr` is installed only for this dynamic scope.
    // - `Guard` always restores the previous slot on all exits, including panic.
    // - `record` only dereferences synchronously and never persists `sink_ptr`.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}
