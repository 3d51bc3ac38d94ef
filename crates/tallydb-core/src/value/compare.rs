use crate::value::Value;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use std::cmp::Ordering;

///
/// NumericRepr
///

enum NumericRepr {
    Decimal(Decimal),
    F64(f64),
}

/// Total canonical comparator.
///
/// Ordering rules:
/// 1. Canonical variant rank
/// 2. Variant-specific comparison for same-ranked values
///
/// Mixed-variant comparisons are rank-only and must remain deterministic.
#[must_use]
pub(super) fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let rank = left.canonical_rank().cmp(&right.canonical_rank());
    if rank != Ordering::Equal {
        return rank;
    }

    #[allow(clippy::match_same_arms)]
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
        (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Ulid(a), Value::Ulid(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => canonical_cmp_list(a, b),
        _ => Ordering::Equal,
    }
}

fn canonical_cmp_list(left: &[Value], right: &[Value]) -> Ordering {
    for (a, b) in left.iter().zip(right.iter()) {
        let ord = canonical_cmp(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

/// Numeric-aware comparator used by filter evaluation and group matching.
///
/// Numeric variants compare by value across representations; other
/// variants only compare with themselves. Null equals Null and is not
/// ordered against anything else.
#[must_use]
pub(super) fn semantic_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Ulid(a), Value::Ulid(b)) => Some(a.cmp(b)),
        (Value::List(_), _) | (_, Value::List(_)) => None,
        _ if left.is_numeric() && right.is_numeric() => numeric_cmp(left, right),
        _ => None,
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (numeric_repr(left)?, numeric_repr(right)?) {
        (NumericRepr::Decimal(a), NumericRepr::Decimal(b)) => Some(a.cmp(&b)),
        (NumericRepr::F64(a), NumericRepr::F64(b)) => a.partial_cmp(&b),
        (NumericRepr::Decimal(a), NumericRepr::F64(b)) => {
            Decimal::from_f64(b).map(|b| a.cmp(&b))
        }
        (NumericRepr::F64(a), NumericRepr::Decimal(b)) => {
            Decimal::from_f64(a).map(|a| a.cmp(&b))
        }
    }
}

fn numeric_repr(value: &Value) -> Option<NumericRepr> {
    match value {
        Value::Int(v) => Some(NumericRepr::Decimal(Decimal::from(*v))),
        Value::Uint(v) => Some(NumericRepr::Decimal(Decimal::from(*v))),
        Value::Decimal(v) => Some(NumericRepr::Decimal(*v)),
        Value::Float64(v) => Some(NumericRepr::F64(*v)),
        _ => None,
    }
}
