//! Declarative schema files.
//!
//! A TOML document listing entity types, their fields and associations, and
//! the derived-field rules they declare. Loading yields the same
//! [`EntityModel`] table the builder API produces; [`SchemaConfig::build_registry`]
//! resolves it in one step.
//!
//! ```toml
//! [[entity]]
//! name = "Invoice"
//! primary_key = "id"
//! fields = { id = "uint", total = "decimal" }
//!
//! [[entity.aggregates]]
//! field = "total"
//! function = "sum"
//! member = "LineItem"
//! via = "invoice_id"
//! of = "amount"
//! default = 0
//! filters = [{ op = "eq", field = "status", value = "active" }]
//! ```

mod literal;

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    model::{
        AggregateFunction, AggregateRule, AssociationModel, EntityModel, EntityTag, ExclusiveRule,
        FieldKind,
    },
    predicate::{Criteria, Operand},
    registry::RuleRegistry,
    value::Value,
};
use derive_more::Display;
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};
use thiserror::Error as ThisError;
use tracing::debug;

pub use literal::ConfigLiteral;

///
/// ConfigError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("schema file '{path}' could not be read: {message}")]
    Io { path: String, message: String },

    #[error("schema is not valid TOML: {message}")]
    Parse { message: String },

    #[error("'{entity}.{field}': literal {literal} is not a valid {kind:?}")]
    InvalidLiteral {
        entity: EntityTag,
        field: String,
        literal: String,
        kind: FieldKind,
    },

    #[error("criteria on '{entity}.{rule}' uses '{op}' without '{key}'")]
    IncompleteCriteria {
        entity: EntityTag,
        rule: String,
        op: CriteriaOp,
        key: &'static str,
    },
}

///
/// SchemaConfig
///

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityConfig>,
}

impl SchemaConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        debug!(entities = config.entities.len(), "schema config parsed");

        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        Self::from_toml_str(&source)
    }

    /// Convert into the descriptor table. Literals are typed against the
    /// declared field kinds, inherited ones included.
    pub fn to_models(&self) -> Result<Vec<EntityModel>, ConfigError> {
        let index: BTreeMap<&EntityTag, &EntityConfig> =
            self.entities.iter().map(|e| (&e.name, e)).collect();
        let kinds = KindLookup { index };

        self.entities
            .iter()
            .map(|entity| entity.to_model(&kinds))
            .collect()
    }

    /// Convert and resolve in one step.
    pub fn build_registry(&self) -> Result<RuleRegistry, InternalError> {
        let models = self.to_models()?;

        Ok(RuleRegistry::build(models)?)
    }
}

///
/// EntityConfig
///

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub name: EntityTag,
    pub primary_key: String,
    #[serde(default)]
    pub extends: Option<EntityTag>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
    #[serde(default)]
    pub associations: Vec<AssociationConfig>,
    #[serde(default)]
    pub aggregates: Vec<AggregateConfig>,
    #[serde(default)]
    pub exclusives: Vec<ExclusiveConfig>,
}

impl EntityConfig {
    fn to_model(&self, kinds: &KindLookup<'_>) -> Result<EntityModel, ConfigError> {
        let mut model = EntityModel::new(self.name.clone(), self.primary_key.clone());
        if let Some(parent) = &self.extends {
            model = model.extends(parent.clone());
        }
        for (name, kind) in &self.fields {
            model = model.field(name.clone(), *kind);
        }
        for association in &self.associations {
            let mut assoc =
                AssociationModel::new(association.field.clone(), association.target.clone());
            if let Some(inverse) = &association.inverse {
                assoc = assoc.inverse(inverse.clone());
            }
            model = model.association(assoc);
        }
        for aggregate in &self.aggregates {
            model = model.aggregate(aggregate.to_rule(&self.name, kinds)?);
        }
        for exclusive in &self.exclusives {
            model = model.exclusive(exclusive.to_rule(&self.name, kinds)?);
        }

        Ok(model)
    }
}

///
/// AssociationConfig
///

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociationConfig {
    pub field: String,
    pub target: EntityTag,
    #[serde(default)]
    pub inverse: Option<String>,
}

///
/// AggregateConfig
///
/// `via` names the member's association field; `of` the member field read
/// (omitted for row counts).
///

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    pub field: String,
    pub function: AggregateFunction,
    pub member: EntityTag,
    pub via: String,
    #[serde(default)]
    pub of: Option<String>,
    #[serde(default)]
    pub filters: Vec<CriteriaConfig>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub default: Option<ConfigLiteral>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl AggregateConfig {
    fn to_rule(
        &self,
        owner: &EntityTag,
        kinds: &KindLookup<'_>,
    ) -> Result<AggregateRule, ConfigError> {
        let mut rule = AggregateRule::new(
            self.field.clone(),
            self.function,
            self.member.clone(),
            self.via.clone(),
            self.of.clone(),
        )
        .priority(self.priority);

        if self.function == AggregateFunction::Count {
            rule = rule.default_value(0u64);
        }
        if let Some(default) = &self.default {
            rule = rule.default_value(kinds.typed(owner, &self.field, default)?);
        }
        for criteria in &self.filters {
            let ctx = CriteriaContext {
                owner,
                rule: &self.field,
                member: &self.member,
                kinds,
            };
            rule = rule.filter(criteria.to_criteria(&ctx)?);
        }
        for field in &self.depends_on {
            rule = rule.depends_on(field.clone());
        }

        Ok(rule)
    }
}

///
/// ExclusiveConfig
///
/// `exclusive` and `fallback` default to `true` and `false`.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclusiveConfig {
    pub field: String,
    #[serde(default)]
    pub exclusive: Option<ConfigLiteral>,
    #[serde(default)]
    pub fallback: Option<ConfigLiteral>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, ConfigLiteral>,
    #[serde(default)]
    pub ensure_filters: BTreeMap<String, ConfigLiteral>,
    #[serde(default = "default_cancel_on_set")]
    pub cancel_on_set: bool,
    #[serde(default)]
    pub ensure_holder: bool,
}

const fn default_cancel_on_set() -> bool {
    true
}

impl ExclusiveConfig {
    fn to_rule(
        &self,
        scope: &EntityTag,
        kinds: &KindLookup<'_>,
    ) -> Result<ExclusiveRule, ConfigError> {
        let exclusive = self
            .exclusive
            .as_ref()
            .map_or(Ok(Value::Bool(true)), |lit| kinds.typed(scope, &self.field, lit))?;
        let fallback = self
            .fallback
            .as_ref()
            .map_or(Ok(Value::Bool(false)), |lit| kinds.typed(scope, &self.field, lit))?;

        let mut rule = ExclusiveRule::new(self.field.clone(), exclusive, fallback)
            .cancel_on_set(self.cancel_on_set);
        for field in &self.group_by {
            rule = rule.group_by(field.clone());
        }
        for (field, literal) in &self.filters {
            rule = rule.filter(field.clone(), kinds.typed(scope, field, literal)?);
        }
        for (field, literal) in &self.ensure_filters {
            rule = rule.ensure_filter(field.clone(), kinds.typed(scope, field, literal)?);
        }
        if self.ensure_holder {
            rule = rule.ensure_holder();
        }

        Ok(rule)
    }
}

///
/// CriteriaOp
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaOp {
    #[display("eq")]
    Eq,
    #[display("ne")]
    Ne,
    #[display("in")]
    In,
    #[display("like")]
    Like,
    #[display("between")]
    Between,
    #[display("and")]
    And,
    #[display("or")]
    Or,
}

///
/// OperandConfig
///
/// A literal, or `{ owner = "field" }` to read the owner record.
///

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OperandConfig {
    Owner { owner: String },
    Literal(ConfigLiteral),
}

///
/// CriteriaConfig
///
/// One clause. Which keys are required depends on `op`:
/// eq/ne take `value` or `owner`, in takes `values`, like takes `pattern`,
/// between takes `low` and `high`, and/or take nested `criteria`.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriteriaConfig {
    pub op: CriteriaOp,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<ConfigLiteral>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub values: Vec<ConfigLiteral>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub low: Option<OperandConfig>,
    #[serde(default)]
    pub high: Option<OperandConfig>,
    #[serde(default)]
    pub criteria: Vec<Self>,
}

struct CriteriaContext<'a> {
    owner: &'a EntityTag,
    rule: &'a str,
    member: &'a EntityTag,
    kinds: &'a KindLookup<'a>,
}

impl CriteriaConfig {
    fn to_criteria(&self, ctx: &CriteriaContext<'_>) -> Result<Criteria, ConfigError> {
        let criteria = match self.op {
            CriteriaOp::And => Criteria::and(self.nested(ctx)?),
            CriteriaOp::Or => Criteria::or(self.nested(ctx)?),
            CriteriaOp::Eq => {
                let field = self.field(ctx)?;
                Criteria::Eq {
                    value: self.operand(ctx, &field)?,
                    field,
                }
            }
            CriteriaOp::Ne => {
                let field = self.field(ctx)?;
                Criteria::Ne {
                    value: self.operand(ctx, &field)?,
                    field,
                }
            }
            CriteriaOp::In => {
                let field = self.field(ctx)?;
                let values = self
                    .values
                    .iter()
                    .map(|lit| self.member_literal(ctx, &field, lit).map(Operand::Value))
                    .collect::<Result<_, _>>()?;
                Criteria::In { field, values }
            }
            CriteriaOp::Like => {
                let pattern = self.require(ctx, self.pattern.clone(), "pattern")?;
                Criteria::like(self.field(ctx)?, pattern)
            }
            CriteriaOp::Between => {
                let field = self.field(ctx)?;
                let low = self.require(ctx, self.low.clone(), "low")?;
                let high = self.require(ctx, self.high.clone(), "high")?;
                Criteria::between(
                    field.clone(),
                    self.resolve_operand(ctx, &field, low)?,
                    self.resolve_operand(ctx, &field, high)?,
                )
            }
        };

        Ok(criteria)
    }

    fn nested(&self, ctx: &CriteriaContext<'_>) -> Result<Vec<Criteria>, ConfigError> {
        self.criteria.iter().map(|c| c.to_criteria(ctx)).collect()
    }

    fn field(&self, ctx: &CriteriaContext<'_>) -> Result<String, ConfigError> {
        self.require(ctx, self.field.clone(), "field")
    }

    fn operand(&self, ctx: &CriteriaContext<'_>, field: &str) -> Result<Operand, ConfigError> {
        if let Some(owner) = &self.owner {
            return Ok(Operand::owner(owner.clone()));
        }
        let literal = self.require(ctx, self.value.clone(), "value")?;

        self.member_literal(ctx, field, &literal).map(Operand::Value)
    }

    fn resolve_operand(
        &self,
        ctx: &CriteriaContext<'_>,
        field: &str,
        operand: OperandConfig,
    ) -> Result<Operand, ConfigError> {
        match operand {
            OperandConfig::Owner { owner } => Ok(Operand::owner(owner)),
            OperandConfig::Literal(literal) => {
                self.member_literal(ctx, field, &literal).map(Operand::Value)
            }
        }
    }

    fn member_literal(
        &self,
        ctx: &CriteriaContext<'_>,
        field: &str,
        literal: &ConfigLiteral,
    ) -> Result<Value, ConfigError> {
        ctx.kinds.typed(ctx.member, field, literal)
    }

    fn require<T>(
        &self,
        ctx: &CriteriaContext<'_>,
        value: Option<T>,
        key: &'static str,
    ) -> Result<T, ConfigError> {
        value.ok_or_else(|| ConfigError::IncompleteCriteria {
            entity: ctx.owner.clone(),
            rule: ctx.rule.to_string(),
            op: self.op,
            key,
        })
    }
}

///
/// KindLookup
///
/// Field kinds by entity, following `extends` chains.
///

struct KindLookup<'a> {
    index: BTreeMap<&'a EntityTag, &'a EntityConfig>,
}

impl KindLookup<'_> {
    fn kind(&self, entity: &EntityTag, field: &str) -> Option<FieldKind> {
        let mut current = self.index.get(entity).copied();
        // bounded walk; cycles are reported by the registry
        for _ in 0..self.index.len() {
            let config = current?;
            if let Some(kind) = config.fields.get(field) {
                return Some(*kind);
            }
            current = config
                .extends
                .as_ref()
                .and_then(|parent| self.index.get(parent).copied());
        }

        None
    }

    // Unknown fields keep the untyped conversion; the registry rejects them.
    fn typed(
        &self,
        entity: &EntityTag,
        field: &str,
        literal: &ConfigLiteral,
    ) -> Result<Value, ConfigError> {
        let Some(kind) = self.kind(entity, field) else {
            return Ok(literal.to_value());
        };

        literal
            .to_value_as(kind)
            .ok_or_else(|| ConfigError::InvalidLiteral {
                entity: entity.clone(),
                field: field.to_string(),
                literal: literal.to_string(),
                kind,
            })
    }
}
