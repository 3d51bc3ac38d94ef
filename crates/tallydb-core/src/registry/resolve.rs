use crate::{
    model::{
        AggregateRule, AssociationModel, EntityModel, EntityTag, ExclusiveRule, FieldKind,
    },
    registry::{
        Catalog, CatalogEntry, MemberDependency, RegistryError, ResolvedAggregate, ResolvedEntity,
        ResolvedExclusive, RuleRegistry,
    },
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::debug;

///
/// FlatEntity
///
/// Inheritance-flattened declarations, before rule validation.
///

struct FlatEntity {
    tag: EntityTag,
    primary_key: String,
    lineage: Vec<EntityTag>,
    fields: BTreeMap<String, FieldKind>,
    associations: BTreeMap<String, AssociationModel>,
    aggregates: BTreeMap<String, (EntityTag, AggregateRule)>,
    exclusives: BTreeMap<String, (EntityTag, ExclusiveRule)>,
}

impl FlatEntity {
    fn require_field(&self, field: &str) -> Result<FieldKind, RegistryError> {
        self.fields
            .get(field)
            .copied()
            .ok_or_else(|| RegistryError::UnknownField {
                entity: self.tag.clone(),
                field: field.to_string(),
            })
    }
}

pub(super) fn resolve(
    models: impl IntoIterator<Item = EntityModel>,
) -> Result<RuleRegistry, RegistryError> {
    let mut table = BTreeMap::new();
    for model in models {
        let tag = model.tag.clone();
        if table.insert(tag.clone(), model).is_some() {
            return Err(RegistryError::DuplicateEntity { entity: tag });
        }
    }

    let mut flat = BTreeMap::new();
    for tag in table.keys() {
        let lineage = lineage(&table, tag)?;
        flat.insert(tag.clone(), flatten(&table, lineage));
    }

    let catalog = Catalog {
        entries: flat
            .values()
            .map(|entity| {
                (
                    entity.tag.clone(),
                    CatalogEntry {
                        primary_key: entity.primary_key.clone(),
                        lineage: entity.lineage.clone(),
                    },
                )
            })
            .collect(),
    };

    let mut entities = BTreeMap::new();
    for entity in flat.values() {
        validate_shape(entity, &flat)?;
        let resolved = resolve_entity(entity, &flat, &catalog)?;
        entities.insert(entity.tag.clone(), resolved);
    }

    let dependents = member_index(&entities, &catalog);

    let registry = RuleRegistry {
        entities,
        dependents,
        catalog,
    };
    debug!(
        entities = registry.entities.len(),
        rules = registry.rule_count(),
        "rule registry resolved"
    );

    Ok(registry)
}

// Walk parents from `tag` to the root, rejecting unknown parents and cycles.
fn lineage(
    table: &BTreeMap<EntityTag, EntityModel>,
    tag: &EntityTag,
) -> Result<Vec<EntityTag>, RegistryError> {
    let mut lineage = vec![tag.clone()];
    let mut seen = BTreeSet::from([tag.clone()]);
    let mut current = tag;

    while let Some(parent) = table.get(current).and_then(|model| model.parent.as_ref()) {
        if !table.contains_key(parent) {
            return Err(RegistryError::UnknownParent {
                entity: current.clone(),
                parent: parent.clone(),
            });
        }
        if !seen.insert(parent.clone()) {
            return Err(RegistryError::InheritanceCycle {
                entity: tag.clone(),
            });
        }
        lineage.push(parent.clone());
        current = parent;
    }

    Ok(lineage)
}

// Merge root-first so a subtype's declaration overrides the inherited one.
fn flatten(table: &BTreeMap<EntityTag, EntityModel>, lineage: Vec<EntityTag>) -> FlatEntity {
    let tag = lineage[0].clone();
    let primary_key = table
        .get(&tag)
        .map(|model| model.primary_key.clone())
        .unwrap_or_default();

    let mut fields = BTreeMap::new();
    let mut associations = BTreeMap::new();
    let mut aggregates = BTreeMap::new();
    let mut exclusives = BTreeMap::new();

    for ancestor in lineage.iter().rev() {
        let Some(model) = table.get(ancestor) else {
            continue;
        };
        for field in &model.fields {
            fields.insert(field.name.clone(), field.kind);
        }
        for association in &model.associations {
            associations.insert(association.field.clone(), association.clone());
        }
        for rule in &model.aggregates {
            aggregates.insert(rule.field.clone(), (ancestor.clone(), rule.clone()));
        }
        for rule in &model.exclusives {
            exclusives.insert(rule.field.clone(), (ancestor.clone(), rule.clone()));
        }
    }

    FlatEntity {
        tag,
        primary_key,
        lineage,
        fields,
        associations,
        aggregates,
        exclusives,
    }
}

fn validate_shape(
    entity: &FlatEntity,
    flat: &BTreeMap<EntityTag, FlatEntity>,
) -> Result<(), RegistryError> {
    match entity.fields.get(&entity.primary_key) {
        None => {
            return Err(RegistryError::UnknownPrimaryKey {
                entity: entity.tag.clone(),
                field: entity.primary_key.clone(),
            });
        }
        Some(kind) if !kind.is_keyable() => {
            return Err(RegistryError::PrimaryKeyNotKeyable {
                entity: entity.tag.clone(),
                field: entity.primary_key.clone(),
            });
        }
        Some(_) => {}
    }

    // subtypes share the key field their supertypes are queried by
    if let Some(parent) = entity
        .lineage
        .iter()
        .skip(1)
        .filter_map(|ancestor| flat.get(ancestor))
        .find(|parent| parent.primary_key != entity.primary_key)
    {
        return Err(RegistryError::PrimaryKeyMismatch {
            entity: entity.tag.clone(),
            field: entity.primary_key.clone(),
            parent: parent.tag.clone(),
            parent_field: parent.primary_key.clone(),
        });
    }

    for association in entity.associations.values() {
        let kind = entity.require_field(&association.field)?;
        let Some(target) = flat.get(&association.target) else {
            return Err(RegistryError::UnknownAssociationTarget {
                entity: entity.tag.clone(),
                field: association.field.clone(),
                target: association.target.clone(),
            });
        };

        // owner identities are built from the raw foreign-key value
        let key_kind = target.fields.get(&target.primary_key).copied();
        if let Some(key_kind) = key_kind.filter(|key_kind| *key_kind != kind) {
            return Err(RegistryError::AssociationKeyMismatch {
                entity: entity.tag.clone(),
                field: association.field.clone(),
                kind,
                target: target.tag.clone(),
                key_kind,
            });
        }
    }

    Ok(())
}

fn resolve_entity(
    entity: &FlatEntity,
    flat: &BTreeMap<EntityTag, FlatEntity>,
    catalog: &Catalog,
) -> Result<ResolvedEntity, RegistryError> {
    let mut aggregates = entity
        .aggregates
        .values()
        .map(|(declared_on, rule)| {
            resolve_aggregate(entity, declared_on, rule, flat, catalog).map(Arc::new)
        })
        .collect::<Result<Vec<_>, _>>()?;
    aggregates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.field.cmp(&b.field)));

    let exclusives = entity
        .exclusives
        .values()
        .map(|(declared_on, rule)| resolve_exclusive(entity, declared_on, rule, flat).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedEntity {
        tag: entity.tag.clone(),
        primary_key: entity.primary_key.clone(),
        lineage: entity.lineage.clone(),
        fields: entity.fields.clone(),
        associations: entity.associations.clone(),
        aggregates,
        exclusives,
    })
}

fn resolve_aggregate(
    owner: &FlatEntity,
    declared_on: &EntityTag,
    rule: &AggregateRule,
    flat: &BTreeMap<EntityTag, FlatEntity>,
    catalog: &Catalog,
) -> Result<ResolvedAggregate, RegistryError> {
    owner.require_field(&rule.field)?;

    let member = flat
        .get(&rule.member)
        .ok_or_else(|| RegistryError::UnknownMember {
            entity: owner.tag.clone(),
            field: rule.field.clone(),
            member: rule.member.clone(),
        })?;

    let association = member
        .associations
        .get(&rule.member_association)
        .ok_or_else(|| RegistryError::UnknownAssociation {
            entity: owner.tag.clone(),
            field: rule.field.clone(),
            member: member.tag.clone(),
            association: rule.member_association.clone(),
        })?;
    if !catalog.is_a(&owner.tag, &association.target) {
        return Err(RegistryError::AssociationTargetMismatch {
            entity: owner.tag.clone(),
            field: rule.field.clone(),
            association: rule.member_association.clone(),
            target: association.target.clone(),
        });
    }

    let unknown_member_field = |member_field: &str| RegistryError::UnknownMemberField {
        entity: owner.tag.clone(),
        field: rule.field.clone(),
        member: member.tag.clone(),
        member_field: member_field.to_string(),
    };

    match &rule.member_field {
        None if rule.function.requires_field() => {
            return Err(RegistryError::MissingMemberField {
                entity: owner.tag.clone(),
                field: rule.field.clone(),
                function: rule.function,
            });
        }
        None => {}
        Some(member_field) => {
            let kind = member
                .fields
                .get(member_field)
                .ok_or_else(|| unknown_member_field(member_field))?;
            if rule.function.requires_numeric() && !kind.is_numeric() {
                return Err(RegistryError::NonNumericMemberField {
                    entity: owner.tag.clone(),
                    field: rule.field.clone(),
                    member_field: member_field.clone(),
                    function: rule.function,
                });
            }
        }
    }

    let mut member_fields = BTreeSet::new();
    let mut dependencies = BTreeSet::new();
    for criteria in &rule.filters {
        criteria.collect_member_fields(&mut member_fields);
        criteria.collect_owner_fields(&mut dependencies);
    }
    if let Some(missing) = member_fields
        .iter()
        .find(|field| !member.fields.contains_key(*field))
    {
        return Err(unknown_member_field(missing));
    }

    dependencies.extend(rule.depends_on.iter().cloned());
    for field in &dependencies {
        owner.require_field(field)?;
    }
    if dependencies.contains(&rule.field) {
        return Err(RegistryError::SelfDependency {
            entity: owner.tag.clone(),
            field: rule.field.clone(),
        });
    }

    let mut member_reads = member_fields;
    member_reads.insert(rule.member_association.clone());
    member_reads.extend(rule.member_field.iter().cloned());

    let mut static_filters = Vec::new();
    let mut dynamic_criteria = Vec::new();
    for criteria in &rule.filters {
        match criteria.as_static_eq() {
            Some((field, value)) => static_filters.push((field.to_string(), value.clone())),
            None => dynamic_criteria.push(criteria.clone()),
        }
    }

    Ok(ResolvedAggregate {
        owner: owner.tag.clone(),
        declared_on: declared_on.clone(),
        field: rule.field.clone(),
        function: rule.function,
        member: member.tag.clone(),
        member_association: rule.member_association.clone(),
        member_field: rule.member_field.clone(),
        static_filters,
        dynamic_criteria,
        priority: rule.priority,
        default: rule.default.clone(),
        dependencies,
        member_reads,
    })
}

fn resolve_exclusive(
    entity: &FlatEntity,
    declared_on: &EntityTag,
    rule: &ExclusiveRule,
    flat: &BTreeMap<EntityTag, FlatEntity>,
) -> Result<ResolvedExclusive, RegistryError> {
    entity.require_field(&rule.field)?;
    for field in rule
        .group_by
        .iter()
        .chain(rule.filters.keys())
        .chain(rule.ensure_filters.keys())
    {
        entity.require_field(field)?;
    }

    // Groups span the declaring type, so bulk writes key on its primary key.
    let primary_key = flat
        .get(declared_on)
        .map_or_else(|| entity.primary_key.clone(), |scope| scope.primary_key.clone());

    Ok(ResolvedExclusive {
        scope: declared_on.clone(),
        primary_key,
        field: rule.field.clone(),
        exclusive: rule.exclusive.clone(),
        fallback: rule.fallback.clone(),
        group_by: rule.group_by.clone(),
        filters: rule
            .filters
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect(),
        ensure_filters: rule
            .ensure_filters
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect(),
        cancel_on_set: rule.cancel_on_set,
        ensure_holder: rule.ensure_holder,
    })
}

// Index every concrete member type (subtypes included) to the owner rules it
// feeds, so the observer does one lookup per event.
fn member_index(
    entities: &BTreeMap<EntityTag, ResolvedEntity>,
    catalog: &Catalog,
) -> BTreeMap<EntityTag, Vec<MemberDependency>> {
    let mut index: BTreeMap<EntityTag, Vec<MemberDependency>> = BTreeMap::new();

    for member in entities.keys() {
        for owner in entities.values() {
            for rule in &owner.aggregates {
                if catalog.is_a(member, &rule.member) {
                    index.entry(member.clone()).or_default().push(MemberDependency {
                        association: rule.member_association.clone(),
                        owner: owner.tag.clone(),
                        rule: Arc::clone(rule),
                    });
                }
            }
        }
    }

    index
}
