//! Secondary Commit.
//!
//! Applies recompute results in one bounded follow-up write after the
//! primary transaction is durable. Records deleted by the primary write are
//! detached first. Failures are logged and reported; they never undo the
//! primary write.

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    executor::{AggregateOutcome, EntryReport, RecomputeState},
    ledger::DeletionLedger,
    obs::sink::{self, MetricsEvent},
    port::Persistence,
    record::RecordId,
};
use tracing::{debug, error};

///
/// CommitOutcome
///

#[derive(Debug)]
pub enum CommitOutcome {
    /// Nothing changed; no secondary write was issued.
    Skipped,
    Committed { writes: usize },
    Failed(InternalError),
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

///
/// RecomputeReport
///
/// Final state of every drained entry plus the commit outcome.
///

#[derive(Debug)]
pub struct RecomputeReport {
    pub entries: Vec<EntryReport>,
    pub commit: CommitOutcome,
}

impl RecomputeReport {
    /// Report for a transaction that queued nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            commit: CommitOutcome::Skipped,
        }
    }

    /// Final state of one `(owner, field)` entry, if it was drained.
    #[must_use]
    pub fn state_of(&self, owner: &RecordId, field: &str) -> Option<&RecomputeState> {
        self.entries
            .iter()
            .find(|entry| &entry.owner == owner && entry.field == field)
            .map(|entry| &entry.state)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|entry| entry.state.is_failed())
    }

    /// Returns true when no entry failed and the commit did not fail.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none() && !matches!(self.commit, CommitOutcome::Failed(_))
    }
}

/// Detach deleted records, then write every changed derived field in one
/// secondary transaction.
pub(crate) fn secondary_commit(
    port: &mut dyn Persistence,
    ledger: &DeletionLedger,
    outcome: AggregateOutcome,
) -> RecomputeReport {
    for id in ledger.iter() {
        port.detach(id);
    }

    let AggregateOutcome {
        entries,
        writes,
        modified,
    } = outcome;

    if modified.is_empty() {
        debug!(entries = entries.len(), "no derived field changed; secondary commit skipped");
        return RecomputeReport {
            entries,
            commit: CommitOutcome::Skipped,
        };
    }

    let commit = match port.commit_secondary(&writes) {
        Ok(()) => {
            debug!(owners = modified.len(), writes = writes.len(), "secondary commit applied");
            sink::record(MetricsEvent::SecondaryCommit {
                writes: writes.len() as u64,
            });
            CommitOutcome::Committed {
                writes: writes.len(),
            }
        }
        Err(err) => {
            error!(
                owners = modified.len(),
                error = %err.display_with_class(),
                "secondary commit failed; derived fields are stale until the next recompute"
            );
            sink::record(MetricsEvent::SecondaryCommitFailed);
            CommitOutcome::Failed(err)
        }
    };

    RecomputeReport { entries, commit }
}
