use crate::{
    error::InternalError,
    memory::MemoryStore,
    port::{LifecycleListener, WriteOrigin},
    record::{Changeset, Record, RecordId},
};
use tracing::trace;

///
/// MemoryTransaction
///
/// One primary transaction against a [`MemoryStore`]. Every write dispatches
/// the matching lifecycle hooks; edits a hook makes to the record are
/// written back before the call returns. Dropping the transaction without
/// committing rolls every row change back.
///

pub struct MemoryTransaction<'a, L>
where
    L: LifecycleListener + ?Sized,
{
    store: &'a mut MemoryStore,
    listener: &'a mut L,
    origin: WriteOrigin,
    finished: bool,
}

impl<'a, L> MemoryTransaction<'a, L>
where
    L: LifecycleListener + ?Sized,
{
    pub(super) fn new(store: &'a mut MemoryStore, listener: &'a mut L) -> Self {
        store.begin_undo();

        Self {
            store,
            listener,
            origin: WriteOrigin::Application,
            finished: false,
        }
    }

    /// Tag subsequent writes with `origin`.
    pub const fn set_origin(&mut self, origin: WriteOrigin) {
        self.origin = origin;
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        self.store
    }

    pub fn insert(&mut self, record: Record) -> Result<RecordId, InternalError> {
        let mut record = self.store.normalize(record);
        let id = record.id();
        if self.store.rows.contains_key(&id) {
            return Err(InternalError::store_conflict(format!(
                "record already exists: {id}"
            )));
        }

        self.store.write_row(record.clone());
        self.listener
            .after_insert(&mut *self.store, &mut record, self.origin)?;
        self.write_back(record);
        trace!(record = %id, "inserted");

        Ok(id)
    }

    /// Replace the stored image of `record` and return what changed.
    pub fn update(&mut self, record: Record) -> Result<Changeset, InternalError> {
        let mut record = self.store.normalize(record);
        let id = record.id();
        let Some(current) = self.store.rows.get(&id) else {
            return Err(InternalError::store_not_found(id.to_string()));
        };

        let changes = Changeset::between(current, &record);
        if changes.is_empty() {
            return Ok(changes);
        }

        self.listener
            .before_update(&mut *self.store, &record, &changes, self.origin)?;
        self.store.write_row(record.clone());
        self.listener
            .after_update(&mut *self.store, &mut record, &changes, self.origin)?;
        self.write_back(record);
        trace!(record = %id, changed = changes.len(), "updated");

        Ok(changes)
    }

    /// Load, modify with `edit`, and update.
    pub fn modify(
        &mut self,
        id: &RecordId,
        edit: impl FnOnce(&mut Record),
    ) -> Result<Changeset, InternalError> {
        let mut record = self
            .store
            .rows
            .get(id)
            .cloned()
            .ok_or_else(|| InternalError::store_not_found(id.to_string()))?;
        edit(&mut record);

        self.update(record)
    }

    pub fn delete(&mut self, id: &RecordId) -> Result<Record, InternalError> {
        let Some(record) = self.store.rows.get(id).cloned() else {
            return Err(InternalError::store_not_found(id.to_string()));
        };

        self.listener
            .before_delete(&mut *self.store, &record, self.origin)?;
        self.store.remove_row(id);
        trace!(record = %id, "deleted");

        Ok(record)
    }

    /// Make the primary writes durable, then run post-commit hooks.
    /// A failing pre-commit hook rolls the transaction back.
    pub fn commit(mut self) -> Result<(), InternalError> {
        self.listener.before_commit(&mut *self.store)?;

        self.store.discard_undo();
        self.finished = true;
        self.listener.after_commit(&mut *self.store);

        Ok(())
    }

    pub fn rollback(self) {}

    // Persist edits a hook made to the in-memory record.
    fn write_back(&mut self, record: Record) {
        if self.store.rows.get(&record.id()) != Some(&record) {
            self.store.write_row(record);
        }
    }
}

impl<L> Drop for MemoryTransaction<'_, L>
where
    L: LifecycleListener + ?Sized,
{
    fn drop(&mut self) {
        if !self.finished {
            self.store.rollback_undo();
            self.listener.after_rollback();
        }
    }
}
