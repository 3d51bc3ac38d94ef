//! Core runtime for TallyDB: descriptor table, rule resolution, change
//! observation, recompute and exclusivity maintenance, plus the ports a host
//! persistence layer implements.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod commit;
pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod obs;
pub mod observer;
pub mod port;
pub mod predicate;
pub mod queue;
pub mod record;
pub mod registry;
pub mod session;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Vocabulary for declaring rules and wiring a host. Executors, the queue
/// and the ledger stay behind the transaction scope.
///

pub mod prelude {
    pub use crate::{
        commit::{CommitOutcome, RecomputeReport},
        error::InternalError,
        executor::{RecomputeState, SkipReason},
        key::Key,
        model::{AggregateFunction, AggregateRule, EntityModel, EntityTag, ExclusiveRule, FieldKind},
        port::{LifecycleListener, Persistence, WriteOrigin},
        predicate::{Criteria, Operand},
        record::{Changeset, Record, RecordId},
        registry::RuleRegistry,
        session::TransactionScope,
        value::Value,
    };
}
