use crate::{key::Key, model::EntityTag, value::Value};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

static NULL: Value = Value::Null;

///
/// RecordId
///
/// Identity of one record: concrete type tag plus primary key.
///

#[derive(
    Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[display("{entity}({key})")]
pub struct RecordId {
    pub entity: EntityTag,
    pub key: Key,
}

impl RecordId {
    #[must_use]
    pub fn new(entity: impl Into<EntityTag>, key: impl Into<Key>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

///
/// Record
///
/// Dynamic row image exchanged between the host and the engine.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub entity: EntityTag,
    pub key: Key,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new(entity: impl Into<EntityTag>, key: impl Into<Key>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        RecordId {
            entity: self.entity.clone(),
            key: self.key.clone(),
        }
    }

    /// Read a field; missing fields read as `Null`.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Write a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Value {
        self.fields
            .insert(field.into(), value.into())
            .unwrap_or_default()
    }
}

///
/// FieldChange
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

///
/// Changeset
///
/// Fields of a record mid-update whose value differs from the loaded
/// snapshot, with both sides retained.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Changeset {
    changes: BTreeMap<String, FieldChange>,
}

impl Changeset {
    /// Diff two images of the same record.
    #[must_use]
    pub fn between(old: &Record, new: &Record) -> Self {
        let names: BTreeSet<&String> = old.fields.keys().chain(new.fields.keys()).collect();
        let changes = names
            .into_iter()
            .filter_map(|name| {
                let (before, after) = (old.get(name), new.get(name));
                (before != after).then(|| {
                    (
                        name.clone(),
                        FieldChange {
                            old: before.clone(),
                            new: after.clone(),
                        },
                    )
                })
            })
            .collect();

        Self { changes }
    }

    /// Record one change explicitly.
    #[must_use]
    pub fn with_change(
        mut self,
        field: impl Into<String>,
        old: impl Into<Value>,
        new: impl Into<Value>,
    ) -> Self {
        self.changes.insert(
            field.into(),
            FieldChange {
                old: old.into(),
                new: new.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// Value before the update, if the field changed.
    #[must_use]
    pub fn old(&self, field: &str) -> Option<&Value> {
        self.changes.get(field).map(|change| &change.old)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
