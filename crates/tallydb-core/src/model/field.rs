use crate::model::entity::EntityTag;
use serde::{Deserialize, Serialize};

///
/// FieldModel
/// Runtime field metadata used by rule resolution and validation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldModel {
    /// Field name as used in filters and changesets.
    pub name: String,
    pub kind: FieldKind,
}

impl FieldModel {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

///
/// FieldKind
///
/// Minimal type surface needed to validate rule declarations.
/// Aligned with `Value` variants.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Decimal,
    Float64,
    Int,
    Text,
    Uint,
    Ulid,
}

impl FieldKind {
    /// Returns true when `sum`/`avg` may read a field of this kind.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Decimal | Self::Float64 | Self::Int | Self::Uint)
    }

    /// Returns true when values of this kind can identify a record.
    #[must_use]
    pub const fn is_keyable(self) -> bool {
        matches!(self, Self::Int | Self::Text | Self::Uint | Self::Ulid)
    }
}

///
/// AssociationModel
///
/// Foreign-key association held by a member type. `field` stores the
/// target's primary key; `inverse` names the owner-side collection and is
/// informational (diagnostics, config round-trips).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssociationModel {
    pub field: String,
    pub target: EntityTag,
    pub inverse: Option<String>,
}

impl AssociationModel {
    #[must_use]
    pub fn new(field: impl Into<String>, target: impl Into<EntityTag>) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            inverse: None,
        }
    }

    #[must_use]
    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }
}
