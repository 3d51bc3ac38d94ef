//! Host persistence seams.
//!
//! The engine never talks to storage directly. Hosts implement the three
//! facility traits below (blanket-combined into [`Persistence`]) and drive a
//! [`LifecycleListener`] from their event pipeline.

use crate::{
    error::InternalError,
    model::{AggregateFunction, EntityTag},
    predicate::Predicate,
    record::{Changeset, Record, RecordId},
    value::Value,
};
use serde::{Deserialize, Serialize};

///
/// WriteOrigin
///
/// Who issued a write. System writes are the engine's own secondary-commit
/// output and must never be observed again.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum WriteOrigin {
    Application,
    System,
}

impl WriteOrigin {
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Self::System)
    }
}

///
/// FieldWrite
///
/// One derived-field assignment applied by the secondary commit.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldWrite {
    pub owner: RecordId,
    pub field: String,
    pub value: Value,
}

///
/// QueryPort
///
/// Scalar aggregate facility. `entity` covers the type and its subtypes.
/// `field` is `None` only for `count` (count rows); `count` over a field
/// counts non-null values. Empty inputs yield `Null` except for `count`.
///

pub trait QueryPort {
    fn aggregate(
        &self,
        entity: &EntityTag,
        function: AggregateFunction,
        field: Option<&str>,
        filter: &Predicate,
    ) -> Result<Value, InternalError>;
}

///
/// BulkUpdatePort
///
/// Set `field = value` on every record of `entity` matching `filter`
/// without dispatching lifecycle events. Returns the affected count.
///

pub trait BulkUpdatePort {
    fn bulk_update(
        &mut self,
        entity: &EntityTag,
        filter: &Predicate,
        field: &str,
        value: &Value,
    ) -> Result<u64, InternalError>;
}

///
/// TransactionPort
///
/// Record loading plus the bounded secondary transaction.
///

pub trait TransactionPort {
    /// Load the current image of one record whose concrete type is exactly
    /// `id.entity`. A record stored under a subtype is not returned.
    fn load(&self, id: &RecordId) -> Result<Option<Record>, InternalError>;

    /// Stop tracking a record without deleting it.
    fn detach(&mut self, id: &RecordId);

    /// Apply `writes` in one follow-up transaction tagged
    /// [`WriteOrigin::System`]. Writes to detached or missing records are
    /// dropped by the host.
    fn commit_secondary(&mut self, writes: &[FieldWrite]) -> Result<(), InternalError>;
}

///
/// Persistence
///
/// Everything the engine needs from a host.
///

pub trait Persistence: QueryPort + BulkUpdatePort + TransactionPort {}

impl<T> Persistence for T where T: QueryPort + BulkUpdatePort + TransactionPort + ?Sized {}

///
/// LifecycleListener
///
/// Hook surface a host event pipeline dispatches into. Hooks that receive
/// `&mut Record` may edit the record in memory; the host persists such edits
/// with its ordinary flush.
///

pub trait LifecycleListener {
    fn after_insert(
        &mut self,
        _port: &mut dyn Persistence,
        _record: &mut Record,
        _origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_update(
        &mut self,
        _port: &mut dyn Persistence,
        _record: &Record,
        _changeset: &Changeset,
        _origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn after_update(
        &mut self,
        _port: &mut dyn Persistence,
        _record: &mut Record,
        _changeset: &Changeset,
        _origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_delete(
        &mut self,
        _port: &mut dyn Persistence,
        _record: &Record,
        _origin: WriteOrigin,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_commit(&mut self, _port: &mut dyn Persistence) -> Result<(), InternalError> {
        Ok(())
    }

    /// Runs after the primary transaction is durable. Never fails the
    /// already-committed business write.
    fn after_commit(&mut self, _port: &mut dyn Persistence) {}

    /// The primary transaction was rolled back.
    fn after_rollback(&mut self) {}
}
