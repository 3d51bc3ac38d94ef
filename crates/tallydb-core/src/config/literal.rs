use crate::{model::FieldKind, value::Value};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use ulid::Ulid;

///
/// ConfigLiteral
///
/// Scalar as written in a schema file. TOML has no decimal, unsigned or
/// ulid type, so literals are converted using the kind of the field they
/// are compared against or assigned to.
///

#[derive(Clone, Debug, Deserialize, Display, PartialEq)]
#[serde(untagged)]
pub enum ConfigLiteral {
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Float(f64),
    #[display("{_0:?}")]
    Text(String),
}

impl ConfigLiteral {
    /// Convert without a kind hint.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::Int(*v),
            Self::Float(v) => Value::Float64(*v),
            Self::Text(v) => Value::Text(v.clone()),
        }
    }

    /// Convert for a field of `kind`. Returns `None` when the literal cannot
    /// represent a value of that kind.
    #[must_use]
    pub fn to_value_as(&self, kind: FieldKind) -> Option<Value> {
        let value = match (kind, self) {
            (FieldKind::Bool, Self::Bool(v)) => Value::Bool(*v),
            (FieldKind::Int, Self::Int(v)) => Value::Int(*v),
            (FieldKind::Uint, Self::Int(v)) => Value::Uint(u64::try_from(*v).ok()?),
            #[allow(clippy::cast_precision_loss)]
            (FieldKind::Float64, Self::Int(v)) => Value::Float64(*v as f64),
            (FieldKind::Float64, Self::Float(v)) => Value::Float64(*v),
            (FieldKind::Decimal, Self::Int(v)) => Value::Decimal(Decimal::from(*v)),
            (FieldKind::Decimal, Self::Float(v)) => Value::Decimal(Decimal::try_from(*v).ok()?),
            (FieldKind::Decimal, Self::Text(v)) => Value::Decimal(Decimal::from_str(v).ok()?),
            (FieldKind::Text, Self::Text(v)) => Value::Text(v.clone()),
            (FieldKind::Ulid, Self::Text(v)) => Value::Ulid(Ulid::from_string(v).ok()?),
            _ => return None,
        };

        Some(value)
    }
}
