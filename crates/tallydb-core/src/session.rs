//! Transaction scope.
//!
//! Binds one observer, work queue and deletion ledger to a single primary
//! transaction. Hosts register the scope as their lifecycle listener and
//! read the recompute report once the transaction has committed.

use crate::{
    commit::{self, RecomputeReport},
    error::InternalError,
    executor,
    ledger::DeletionLedger,
    obs::sink::{self, MetricsEvent},
    observer::ChangeObserver,
    port::{LifecycleListener, Persistence, WriteOrigin},
    queue::WorkQueue,
    record::{Changeset, Record},
    registry::RuleRegistry,
};
use tracing::{debug, trace};

///
/// TransactionScope
///

#[derive(Debug)]
pub struct TransactionScope<'r> {
    observer: ChangeObserver<'r>,
    queue: WorkQueue,
    ledger: DeletionLedger,
    report: Option<RecomputeReport>,
}

impl<'r> TransactionScope<'r> {
    #[must_use]
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            observer: ChangeObserver::new(registry),
            queue: WorkQueue::new(),
            ledger: DeletionLedger::new(),
            report: None,
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    #[must_use]
    pub const fn ledger(&self) -> &DeletionLedger {
        &self.ledger
    }

    /// Report of the last post-commit drain, if one ran since the last take.
    pub const fn take_report(&mut self) -> Option<RecomputeReport> {
        self.report.take()
    }

    /// Drain the queue, recompute, and apply the secondary commit. The queue
    /// and the ledger are empty afterwards whatever the outcome.
    pub fn flush(&mut self, port: &mut dyn Persistence) -> RecomputeReport {
        let batches = self.queue.drain();
        let outcome = executor::recompute(&*port, &self.ledger, batches);
        let report = commit::secondary_commit(port, &self.ledger, outcome);
        self.ledger.clear();

        report
    }

    /// Forget every collected intent without running it.
    pub fn discard(&mut self) {
        if !self.queue.is_empty() || !self.ledger.is_empty() {
            debug!(
                queued = self.queue.len(),
                deleted = self.ledger.len(),
                "transaction rolled back; discarding recompute intents"
            );
        }
        self.queue.clear();
        self.ledger.clear();
    }

    fn ignore_system(record: &Record, origin: WriteOrigin) -> bool {
        if origin.is_system() {
            trace!(record = %record.id(), "system write ignored by observer");
            sink::record(MetricsEvent::RecursionGuard {
                entity: record.entity.as_str(),
            });
        }

        origin.is_system()
    }
}

impl LifecycleListener for TransactionScope<'_> {
    fn after_insert(
        &mut self,
        port: &mut dyn Persistence,
        record: &mut Record,
        origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        if Self::ignore_system(record, origin) {
            return Ok(());
        }

        self.observer.on_insert(port, &mut self.queue, record)
    }

    fn after_update(
        &mut self,
        port: &mut dyn Persistence,
        record: &mut Record,
        changeset: &Changeset,
        origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        if Self::ignore_system(record, origin) {
            return Ok(());
        }

        self.observer
            .on_update(port, &mut self.queue, record, changeset)
    }

    fn before_delete(
        &mut self,
        port: &mut dyn Persistence,
        record: &Record,
        origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        if Self::ignore_system(record, origin) {
            return Ok(());
        }

        self.observer
            .on_delete(port, &mut self.queue, &mut self.ledger, record)
    }

    fn after_commit(&mut self, port: &mut dyn Persistence) {
        let report = if self.queue.is_empty() && self.ledger.is_empty() {
            RecomputeReport::empty()
        } else {
            self.flush(port)
        };
        self.report = Some(report);
    }

    fn after_rollback(&mut self) {
        self.discard();
    }
}
