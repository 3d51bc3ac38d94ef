use crate::model::{
    field::{AssociationModel, FieldKind, FieldModel},
    rule::{AggregateRule, ExclusiveRule},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// EntityTag
///
/// Stable type tag used to key the descriptor table, record identities and
/// port calls.
///

#[derive(
    Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct EntityTag(String);

impl EntityTag {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityTag {
    fn from(name: String) -> Self {
        Self(name)
    }
}

///
/// EntityModel
///
/// One row of the descriptor table.
///

#[derive(Clone, Debug)]
pub struct EntityModel {
    /// Type tag (dispatch, identities and diagnostics).
    pub tag: EntityTag,
    /// Supertype whose fields, associations and rules are inherited.
    pub parent: Option<EntityTag>,
    /// Primary key field (must also appear in `fields`, possibly inherited).
    pub primary_key: String,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldModel>,
    /// Foreign-key associations held by this type.
    pub associations: Vec<AssociationModel>,
    /// Aggregate rules attached to fields of this type.
    pub aggregates: Vec<AggregateRule>,
    /// Exclusivity rules attached to flag fields of this type.
    pub exclusives: Vec<ExclusiveRule>,
}

impl EntityModel {
    #[must_use]
    pub fn new(tag: impl Into<EntityTag>, primary_key: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            parent: None,
            primary_key: primary_key.into(),
            fields: Vec::new(),
            associations: Vec::new(),
            aggregates: Vec::new(),
            exclusives: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<EntityTag>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldModel::new(name, kind));
        self
    }

    /// Declare a foreign-key field and its association in one step.
    #[must_use]
    pub fn belongs_to(
        mut self,
        field: impl Into<String>,
        kind: FieldKind,
        target: impl Into<EntityTag>,
    ) -> Self {
        let field = field.into();
        self.fields.push(FieldModel::new(field.clone(), kind));
        self.associations.push(AssociationModel::new(field, target));
        self
    }

    #[must_use]
    pub fn association(mut self, association: AssociationModel) -> Self {
        self.associations.push(association);
        self
    }

    #[must_use]
    pub fn aggregate(mut self, rule: AggregateRule) -> Self {
        self.aggregates.push(rule);
        self
    }

    #[must_use]
    pub fn exclusive(mut self, rule: ExclusiveRule) -> Self {
        self.exclusives.push(rule);
        self
    }
}
