//! Rule Registry.
//!
//! Built once at startup from the descriptor table and passed by reference
//! to every transaction scope. Resolution flattens inheritance, validates
//! every reference, partitions aggregate filters into static and dynamic
//! parts, and precomputes the member → dependent-rule index the observer
//! consults on every lifecycle event.

mod resolve;


use crate::{
    model::{AggregateFunction, AssociationModel, EntityModel, EntityTag, FieldKind},
    predicate::{Criteria, Predicate},
    record::{Changeset, Record},
    value::{Value, ValueError},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// RegistryError
///
/// Metadata resolution failures. Always fatal at registration.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RegistryError {
    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity { entity: EntityTag },

    #[error("entity '{entity}' extends unknown entity '{parent}'")]
    UnknownParent { entity: EntityTag, parent: EntityTag },

    #[error("entity '{entity}' is part of an inheritance cycle")]
    InheritanceCycle { entity: EntityTag },

    #[error("entity '{entity}' primary key '{field}' is not a declared field")]
    UnknownPrimaryKey { entity: EntityTag, field: String },

    #[error("entity '{entity}' primary key '{field}' has a kind that cannot identify records")]
    PrimaryKeyNotKeyable { entity: EntityTag, field: String },

    #[error(
        "entity '{entity}' primary key '{field}' differs from '{parent_field}' declared by supertype '{parent}'"
    )]
    PrimaryKeyMismatch {
        entity: EntityTag,
        field: String,
        parent: EntityTag,
        parent_field: String,
    },

    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField { entity: EntityTag, field: String },

    #[error("association '{entity}.{field}' targets unknown entity '{target}'")]
    UnknownAssociationTarget {
        entity: EntityTag,
        field: String,
        target: EntityTag,
    },

    #[error(
        "association '{entity}.{field}' holds {kind:?} values but '{target}' is keyed by {key_kind:?}"
    )]
    AssociationKeyMismatch {
        entity: EntityTag,
        field: String,
        kind: FieldKind,
        target: EntityTag,
        key_kind: FieldKind,
    },

    #[error("rule '{entity}.{field}' reads unknown member entity '{member}'")]
    UnknownMember {
        entity: EntityTag,
        field: String,
        member: EntityTag,
    },

    #[error("rule '{entity}.{field}' uses unknown association '{member}.{association}'")]
    UnknownAssociation {
        entity: EntityTag,
        field: String,
        member: EntityTag,
        association: String,
    },

    #[error(
        "rule '{entity}.{field}' association '{association}' targets '{target}', which is not '{entity}' or one of its supertypes"
    )]
    AssociationTargetMismatch {
        entity: EntityTag,
        field: String,
        association: String,
        target: EntityTag,
    },

    #[error("rule '{entity}.{field}' uses {function} and must name a member field")]
    MissingMemberField {
        entity: EntityTag,
        field: String,
        function: AggregateFunction,
    },

    #[error("rule '{entity}.{field}' reads unknown member field '{member}.{member_field}'")]
    UnknownMemberField {
        entity: EntityTag,
        field: String,
        member: EntityTag,
        member_field: String,
    },

    #[error("rule '{entity}.{field}' applies {function} to non-numeric field '{member_field}'")]
    NonNumericMemberField {
        entity: EntityTag,
        field: String,
        member_field: String,
        function: AggregateFunction,
    },

    #[error("rule '{entity}.{field}' depends on its own field")]
    SelfDependency { entity: EntityTag, field: String },
}

///
/// Catalog
///
/// Type hierarchy and primary-key names, shared with hosts that need to
/// answer polymorphic queries (`entity` covering its subtypes).
///

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<EntityTag, CatalogEntry>,
}

///
/// CatalogEntry
///

#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub primary_key: String,
    /// The type itself first, then each ancestor up to the root.
    pub lineage: Vec<EntityTag>,
}

impl Catalog {
    #[must_use]
    pub fn contains(&self, tag: &EntityTag) -> bool {
        self.entries.contains_key(tag)
    }

    /// Returns true when `tag` is `ancestor` or one of its subtypes.
    #[must_use]
    pub fn is_a(&self, tag: &EntityTag, ancestor: &EntityTag) -> bool {
        self.entries
            .get(tag)
            .is_some_and(|entry| entry.lineage.contains(ancestor))
    }

    #[must_use]
    pub fn primary_key(&self, tag: &EntityTag) -> Option<&str> {
        self.entries.get(tag).map(|entry| entry.primary_key.as_str())
    }
}

///
/// ResolvedAggregate
///
/// One aggregate rule resolved for one concrete owner type.
///

#[derive(Clone, Debug)]
pub struct ResolvedAggregate {
    pub owner: EntityTag,
    pub declared_on: EntityTag,
    pub field: String,
    pub function: AggregateFunction,
    pub member: EntityTag,
    pub member_association: String,
    pub member_field: Option<String>,
    /// Constant equalities, in declaration order.
    pub static_filters: Vec<(String, Value)>,
    /// Remaining criteria, resolved against the owner per recompute.
    pub dynamic_criteria: Vec<Criteria>,
    pub priority: i32,
    pub default: Value,
    /// Owner fields whose change re-enqueues the rule.
    pub dependencies: BTreeSet<String>,
    /// Member fields the rule reads (association, aggregated field, criteria).
    pub member_reads: BTreeSet<String>,
}

impl ResolvedAggregate {
    /// Build the member filter for one owner:
    /// `association == owner.key AND static filters AND dynamic criteria`.
    pub fn member_filter(&self, owner: &Record) -> Result<Predicate, ValueError> {
        let mut clauses = Vec::with_capacity(1 + self.static_filters.len());
        clauses.push(Predicate::eq(
            self.member_association.as_str(),
            owner.key.to_value(),
        ));
        clauses.extend(
            self.static_filters
                .iter()
                .map(|(field, value)| Predicate::eq(field.as_str(), value.clone())),
        );
        for criteria in &self.dynamic_criteria {
            clauses.push(criteria.resolve(owner)?);
        }

        Ok(Predicate::conjoin(clauses))
    }

    /// Returns true when a member changeset can alter this aggregate.
    #[must_use]
    pub fn reads_any(&self, changeset: &Changeset) -> bool {
        changeset.fields().any(|field| self.member_reads.contains(field))
    }
}

///
/// ResolvedExclusive
///
/// One exclusivity rule resolved for one concrete type. `scope` is the
/// declaring type: groups span it and all of its subtypes.
///

#[derive(Clone, Debug)]
pub struct ResolvedExclusive {
    pub scope: EntityTag,
    pub primary_key: String,
    pub field: String,
    pub exclusive: Value,
    pub fallback: Value,
    pub group_by: Vec<String>,
    pub filters: Vec<(String, Value)>,
    pub ensure_filters: Vec<(String, Value)>,
    pub cancel_on_set: bool,
    pub ensure_holder: bool,
}

impl ResolvedExclusive {
    /// Returns true when the record holds the exclusive value.
    #[must_use]
    pub fn holds(&self, record: &Record) -> bool {
        Value::semantic_eq(record.get(&self.field), &self.exclusive)
    }

    /// Returns true when the record satisfies the static filters.
    #[must_use]
    pub fn in_scope(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| Value::semantic_eq(record.get(field), value))
    }

    /// Returns true when the record satisfies the ensure filters.
    #[must_use]
    pub fn in_ensure_scope(&self, record: &Record) -> bool {
        self.in_scope(record)
            && self
                .ensure_filters
                .iter()
                .all(|(field, value)| Value::semantic_eq(record.get(field), value))
    }
}

///
/// MemberDependency
///
/// "A write to this member type may change `rule` on the owner reached
/// through `association`."
///

#[derive(Clone, Debug)]
pub struct MemberDependency {
    pub association: String,
    pub owner: EntityTag,
    pub rule: Arc<ResolvedAggregate>,
}

///
/// ResolvedEntity
///
/// Effective (own + inherited) metadata for one type.
///

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub tag: EntityTag,
    pub primary_key: String,
    pub lineage: Vec<EntityTag>,
    pub fields: BTreeMap<String, FieldKind>,
    pub associations: BTreeMap<String, AssociationModel>,
    /// Sorted by priority descending, then field name.
    pub aggregates: Vec<Arc<ResolvedAggregate>>,
    pub exclusives: Vec<Arc<ResolvedExclusive>>,
}

///
/// RuleRegistry
///

#[derive(Clone, Debug)]
pub struct RuleRegistry {
    entities: BTreeMap<EntityTag, ResolvedEntity>,
    dependents: BTreeMap<EntityTag, Vec<MemberDependency>>,
    catalog: Catalog,
}

impl RuleRegistry {
    /// Resolve a descriptor table. Any invalid declaration fails the build.
    pub fn build(models: impl IntoIterator<Item = EntityModel>) -> Result<Self, RegistryError> {
        resolve::resolve(models)
    }

    #[must_use]
    pub fn entity(&self, tag: &EntityTag) -> Option<&ResolvedEntity> {
        self.entities.get(tag)
    }

    pub fn entities(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.values()
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Rules that a write to `member` may invalidate.
    #[must_use]
    pub fn member_dependencies(&self, member: &EntityTag) -> &[MemberDependency] {
        self.dependents.get(member).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn aggregates_for(&self, owner: &EntityTag) -> &[Arc<ResolvedAggregate>] {
        self.entities
            .get(owner)
            .map_or(&[], |entity| entity.aggregates.as_slice())
    }

    #[must_use]
    pub fn exclusives_for(&self, tag: &EntityTag) -> &[Arc<ResolvedExclusive>] {
        self.entities
            .get(tag)
            .map_or(&[], |entity| entity.exclusives.as_slice())
    }

    /// Owner-side rules whose dependency fields intersect `changeset`.
    pub fn owner_rules_touched<'a>(
        &'a self,
        owner: &EntityTag,
        changeset: &'a Changeset,
    ) -> impl Iterator<Item = &'a Arc<ResolvedAggregate>> + 'a {
        self.aggregates_for(owner).iter().filter(|rule| {
            rule.dependencies
                .iter()
                .any(|field| changeset.contains(field))
        })
    }

    /// Total number of resolved aggregate and exclusivity rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.entities
            .values()
            .map(|entity| entity.aggregates.len() + entity.exclusives.len())
            .sum()
    }
}
