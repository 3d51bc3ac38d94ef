//! Recompute Executor.
//!
//! Two paths share this module:
//! - aggregate: drains the work queue after the primary write is durable and
//!   recomputes each owner's derived fields through the query port
//! - exclusive: runs inside the primary write's hooks and keeps flag groups
//!   consistent through the bulk-update port

mod aggregate;
pub(crate) mod exclusive;

#[cfg(test)]
mod tests;

use crate::{error::InternalError, port::FieldWrite, record::RecordId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

pub(crate) use aggregate::recompute;

///
/// SkipReason
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SkipReason {
    /// The owner is scheduled for deletion in this transaction.
    OwnerDeleted,
    /// The owner could not be loaded (already gone, or a different concrete type).
    OwnerMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OwnerDeleted => "owner_deleted",
            Self::OwnerMissing => "owner_missing",
        };
        write!(f, "{label}")
    }
}

///
/// RecomputeState
///
/// Lifecycle of one `(owner, field)` entry:
///
/// Queued    → Computing | Skipped
/// Computing → Applied | Skipped | Failed
///
/// Every drained entry ends in a terminal state.
///

#[derive(Debug)]
pub enum RecomputeState {
    Queued,
    Computing,
    Applied { changed: bool },
    Skipped(SkipReason),
    Failed(InternalError),
}

impl RecomputeState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Skipped(_) | Self::Failed(_))
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub(crate) fn advance(self, next: Self) -> Result<Self, InternalError> {
        let allowed = matches!(
            (&self, &next),
            (Self::Queued, Self::Computing | Self::Skipped(_))
                | (
                    Self::Computing,
                    Self::Applied { .. } | Self::Skipped(_) | Self::Failed(_)
                )
        );

        if allowed {
            Ok(next)
        } else {
            Err(InternalError::executor_invariant(format!(
                "invalid recompute transition {} -> {}",
                self.label(),
                next.label()
            )))
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Computing => "computing",
            Self::Applied { .. } => "applied",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

///
/// EntryReport
///

#[derive(Debug)]
pub struct EntryReport {
    pub owner: RecordId,
    pub field: String,
    pub state: RecomputeState,
}

///
/// AggregateOutcome
///
/// Aggregate-path output handed to the secondary commit.
///

#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub entries: Vec<EntryReport>,
    /// Derived-field writes, in drain order.
    pub writes: Vec<FieldWrite>,
    /// Owners with at least one changed derived field.
    pub modified: BTreeSet<RecordId>,
}
