use crate::value::{Value, ValueError};
use rust_decimal::{Decimal, prelude::ToPrimitive};

///
/// NumericFold
///
/// Running accumulator for `sum` / `avg` reductions.
/// Nulls are skipped; the result keeps the operand family (integer sums stay
/// integers, float sums stay floats, mixed integer/decimal promotes to
/// decimal, anything mixed with float promotes to float).
///

#[derive(Clone, Debug, Default)]
pub struct NumericFold {
    total: Option<Value>,
    count: u64,
}

impl NumericFold {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total: None,
            count: 0,
        }
    }

    /// Fold one value into the accumulator; nulls are ignored.
    pub fn push(&mut self, value: &Value) -> Result<(), ValueError> {
        if value.is_null() {
            return Ok(());
        }
        if !value.is_numeric() {
            return Err(ValueError::NotNumeric {
                value: value.to_string(),
            });
        }

        self.total = Some(match self.total.take() {
            None => value.clone(),
            Some(total) => checked_add(&total, value)?,
        });
        self.count = self.count.saturating_add(1);

        Ok(())
    }

    /// Number of non-null values folded so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Sum of folded values, or `Null` when nothing was folded.
    #[must_use]
    pub fn sum(&self) -> Value {
        self.total.clone().unwrap_or(Value::Null)
    }

    /// Arithmetic mean of folded values, or `Null` when nothing was folded.
    ///
    /// Float operands average to `Float64`; integer and decimal operands
    /// average to `Decimal` so integer division never truncates.
    pub fn avg(&self) -> Result<Value, ValueError> {
        let Some(total) = &self.total else {
            return Ok(Value::Null);
        };

        #[allow(clippy::cast_precision_loss)]
        let avg = match total {
            Value::Float64(v) => Value::Float64(v / self.count as f64),
            other => {
                let total = to_decimal(other)?;
                let avg = total
                    .checked_div(Decimal::from(self.count))
                    .ok_or_else(|| overflow(other, &Value::Uint(self.count)))?;
                Value::Decimal(avg)
            }
        };

        Ok(avg)
    }
}

/// Add two numeric values, promoting across families when they differ.
pub(super) fn checked_add(left: &Value, right: &Value) -> Result<Value, ValueError> {
    let sum = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int),
        (Value::Uint(a), Value::Uint(b)) => a.checked_add(*b).map(Value::Uint),
        (Value::Decimal(a), Value::Decimal(b)) => a.checked_add(*b).map(Value::Decimal),
        (Value::Float64(_), _) | (_, Value::Float64(_)) => {
            Some(Value::Float64(to_f64(left)? + to_f64(right)?))
        }
        _ => to_decimal(left)?
            .checked_add(to_decimal(right)?)
            .map(Value::Decimal),
    };

    sum.ok_or_else(|| overflow(left, right))
}

fn to_decimal(value: &Value) -> Result<Decimal, ValueError> {
    match value {
        Value::Int(v) => Ok(Decimal::from(*v)),
        Value::Uint(v) => Ok(Decimal::from(*v)),
        Value::Decimal(v) => Ok(*v),
        other => Err(ValueError::NotNumeric {
            value: other.to_string(),
        }),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: &Value) -> Result<f64, ValueError> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Uint(v) => Ok(*v as f64),
        Value::Float64(v) => Ok(*v),
        Value::Decimal(v) => v.to_f64().ok_or_else(|| ValueError::NotNumeric {
            value: v.to_string(),
        }),
        other => Err(ValueError::NotNumeric {
            value: other.to_string(),
        }),
    }
}

fn overflow(left: &Value, right: &Value) -> ValueError {
    ValueError::Overflow {
        left: left.to_string(),
        right: right.to_string(),
    }
}
