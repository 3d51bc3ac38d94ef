use crate::{model::entity::EntityTag, predicate::Criteria, value::Value};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

///
/// AggregateFunction
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Returns true when the function needs a member field to read.
    #[must_use]
    pub const fn requires_field(self) -> bool {
        !matches!(self, Self::Count)
    }

    /// Returns true when the member field must be numeric.
    #[must_use]
    pub const fn requires_numeric(self) -> bool {
        matches!(self, Self::Sum | Self::Avg)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        };
        write!(f, "{label}")
    }
}

///
/// AggregateRule
///
/// Declares `owner.field = function(member.member_field)` over members whose
/// `member_association` points at the owner and that satisfy `filters`.
///
/// `filters` is the ordered declared form; constant equalities are split into
/// static filters at registration, the rest stay dynamic criteria.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateRule {
    pub field: String,
    pub function: AggregateFunction,
    pub member: EntityTag,
    pub member_association: String,
    pub member_field: Option<String>,
    pub filters: Vec<Criteria>,
    /// Higher priorities are recomputed first within one owner.
    pub priority: i32,
    /// Written when the aggregate is null (no matching members).
    pub default: Value,
    /// Extra owner fields whose change re-enqueues this rule.
    pub depends_on: Vec<String>,
}

impl AggregateRule {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        function: AggregateFunction,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
        member_field: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            function,
            member: member.into(),
            member_association: member_association.into(),
            member_field,
            filters: Vec::new(),
            priority: 0,
            default: Value::Null,
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn sum(
        field: impl Into<String>,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
        member_field: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            AggregateFunction::Sum,
            member,
            member_association,
            Some(member_field.into()),
        )
    }

    /// Count matching members; never null.
    #[must_use]
    pub fn count(
        field: impl Into<String>,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
    ) -> Self {
        Self::new(field, AggregateFunction::Count, member, member_association, None)
            .default_value(0u64)
    }

    #[must_use]
    pub fn avg(
        field: impl Into<String>,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
        member_field: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            AggregateFunction::Avg,
            member,
            member_association,
            Some(member_field.into()),
        )
    }

    #[must_use]
    pub fn min(
        field: impl Into<String>,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
        member_field: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            AggregateFunction::Min,
            member,
            member_association,
            Some(member_field.into()),
        )
    }

    #[must_use]
    pub fn max(
        field: impl Into<String>,
        member: impl Into<EntityTag>,
        member_association: impl Into<String>,
        member_field: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            AggregateFunction::Max,
            member,
            member_association,
            Some(member_field.into()),
        )
    }

    #[must_use]
    pub fn filter(mut self, criteria: Criteria) -> Self {
        self.filters.push(criteria);
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    #[must_use]
    pub fn depends_on(mut self, field: impl Into<String>) -> Self {
        self.depends_on.push(field.into());
        self
    }
}

///
/// ExclusiveRule
///
/// At most one record per group holds `exclusive` in `field`; with
/// `ensure_holder`, a non-empty group always has one.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExclusiveRule {
    pub field: String,
    pub exclusive: Value,
    pub fallback: Value,
    pub group_by: Vec<String>,
    /// Constant equalities narrowing the group (cancel and ensure).
    pub filters: BTreeMap<String, Value>,
    /// Extra constant equalities applied to the ensure-holder step only.
    pub ensure_filters: BTreeMap<String, Value>,
    /// Cancel others only when the flag is being set, not on every write.
    pub cancel_on_set: bool,
    pub ensure_holder: bool,
}

impl ExclusiveRule {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        exclusive: impl Into<Value>,
        fallback: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            exclusive: exclusive.into(),
            fallback: fallback.into(),
            group_by: Vec::new(),
            filters: BTreeMap::new(),
            ensure_filters: BTreeMap::new(),
            cancel_on_set: true,
            ensure_holder: false,
        }
    }

    /// Boolean flag rule: `true` is exclusive, `false` the fallback.
    #[must_use]
    pub fn flag(field: impl Into<String>) -> Self {
        Self::new(field, true, false)
    }

    #[must_use]
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn ensure_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ensure_filters.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub const fn cancel_on_set(mut self, cancel_on_set: bool) -> Self {
        self.cancel_on_set = cancel_on_set;
        self
    }

    #[must_use]
    pub const fn ensure_holder(mut self) -> Self {
        self.ensure_holder = true;
        self
    }
}
