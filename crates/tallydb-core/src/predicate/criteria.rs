use crate::{
    predicate::{CompareOp, ComparePredicate, Predicate},
    record::Record,
    value::{Value, ValueError},
};
use std::collections::BTreeSet;

///
/// Operand
///
/// Right-hand side of a criteria clause: a literal, or a field read from the
/// owner record when the rule is recomputed.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Value(Value),
    Owner(String),
}

impl Operand {
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    #[must_use]
    pub fn owner(field: impl Into<String>) -> Self {
        Self::Owner(field.into())
    }

    fn resolve(&self, owner: &Record) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Owner(field) => owner.get(field).clone(),
        }
    }

    fn collect_owner_field(&self, out: &mut BTreeSet<String>) {
        if let Self::Owner(field) = self {
            out.insert(field.clone());
        }
    }
}

///
/// Criteria
///
/// Ordered, composable member filter declared on an aggregate rule.
/// Field names on the left always refer to the member type.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Criteria {
    Eq { field: String, value: Operand },
    Ne { field: String, value: Operand },
    In { field: String, values: Vec<Operand> },
    Like { field: String, pattern: Operand },
    Between {
        field: String,
        low: Operand,
        high: Operand,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
}

impl Criteria {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: Operand::value(value),
        }
    }

    /// `member.field == owner.owner_field`
    #[must_use]
    pub fn eq_owner(field: impl Into<String>, owner_field: impl Into<String>) -> Self {
        Self::Eq {
            field: field.into(),
            value: Operand::owner(owner_field),
        }
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: Operand::value(value),
        }
    }

    #[must_use]
    pub fn in_<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Operand::value).collect(),
        }
    }

    #[must_use]
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            field: field.into(),
            pattern: Operand::Value(Value::Text(pattern.into())),
        }
    }

    #[must_use]
    pub fn between(field: impl Into<String>, low: Operand, high: Operand) -> Self {
        Self::Between {
            field: field.into(),
            low,
            high,
        }
    }

    #[must_use]
    pub const fn and(criteria: Vec<Self>) -> Self {
        Self::And(criteria)
    }

    #[must_use]
    pub const fn or(criteria: Vec<Self>) -> Self {
        Self::Or(criteria)
    }

    /// Returns the `(field, literal)` pair when this clause is a constant
    /// equality, the shape resolution partitions into static filters.
    #[must_use]
    pub fn as_static_eq(&self) -> Option<(&str, &Value)> {
        match self {
            Self::Eq {
                field,
                value: Operand::Value(value),
            } => Some((field.as_str(), value)),
            _ => None,
        }
    }

    /// Member fields read by this clause.
    pub fn collect_member_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::In { field, .. }
            | Self::Like { field, .. }
            | Self::Between { field, .. } => {
                out.insert(field.clone());
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_member_fields(out);
                }
            }
        }
    }

    /// Owner fields referenced by operands.
    pub fn collect_owner_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Eq { value, .. } | Self::Ne { value, .. } => value.collect_owner_field(out),
            Self::In { values, .. } => {
                for value in values {
                    value.collect_owner_field(out);
                }
            }
            Self::Like { pattern, .. } => pattern.collect_owner_field(out),
            Self::Between { low, high, .. } => {
                low.collect_owner_field(out);
                high.collect_owner_field(out);
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_owner_fields(out);
                }
            }
        }
    }

    /// Resolve owner operands against `owner` and lower into a literal predicate.
    pub fn resolve(&self, owner: &Record) -> Result<Predicate, ValueError> {
        let predicate = match self {
            Self::Eq { field, value } => compare(field, CompareOp::Eq, value.resolve(owner)),
            Self::Ne { field, value } => compare(field, CompareOp::Ne, value.resolve(owner)),
            Self::In { field, values } => {
                let values = values.iter().map(|v| v.resolve(owner)).collect();
                compare(field, CompareOp::In, Value::List(values))
            }
            Self::Like { field, pattern } => {
                let pattern = pattern.resolve(owner);
                if pattern.as_text().is_none() {
                    return Err(ValueError::LikePatternNotText {
                        value: pattern.to_string(),
                    });
                }
                compare(field, CompareOp::Like, pattern)
            }
            Self::Between { field, low, high } => Predicate::And(vec![
                compare(field, CompareOp::Gte, low.resolve(owner)),
                compare(field, CompareOp::Lte, high.resolve(owner)),
            ]),
            Self::And(children) => Predicate::And(
                children
                    .iter()
                    .map(|child| child.resolve(owner))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Or(children) => Predicate::Or(
                children
                    .iter()
                    .map(|child| child.resolve(owner))
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(predicate)
    }
}

fn compare(field: &str, op: CompareOp, value: Value) -> Predicate {
    Predicate::Compare(ComparePredicate::new(field, op, value))
}
