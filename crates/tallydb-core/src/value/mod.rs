mod compare;
mod numeric;


use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};
use thiserror::Error as ThisError;
use ulid::Ulid;

// re-exports
pub use numeric::NumericFold;

///
/// ValueError
///
/// Failures raised while folding or coercing runtime values.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ValueError {
    #[error("arithmetic overflow folding {left} and {right}")]
    Overflow { left: String, right: String },

    #[error("value is not numeric: {value}")]
    NotNumeric { value: String },

    #[error("like pattern must be text, found {value}")]
    LikePatternNotText { value: String },

    #[error("count aggregate returned a non-integer value: {value}")]
    CountNotInteger { value: String },
}

///
/// Value
///
/// Dynamic scalar carried by records, filters and aggregate results.
///
/// Null   → the field is absent or explicitly null (SQL NULL).
/// List   → right-hand side of `in` comparisons; never stored as a field.
///
/// `Eq`/`Ord` use the canonical total order (variant rank first), so
/// `Int(1) != Uint(1)`. Filter evaluation uses the numeric-aware
/// [`Value::semantic_cmp`] instead.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Ulid(Ulid),
    List(Vec<Self>),
}

impl Value {
    /// Build a `Value::List` from owned items.
    pub fn from_list<T>(items: Vec<T>) -> Self
    where
        T: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if the value is one of the numeric variants.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Uint(_) | Self::Float64(_) | Self::Decimal(_)
        )
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Interpret the value as a non-negative integer count.
    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Uint(n) => Some(*n),
            Self::Int(n) => u64::try_from(*n).ok(),
            Self::Decimal(d) if d.fract().is_zero() => d.to_u64(),
            _ => None,
        }
    }

    /// Stable canonical rank used by cross-variant ordering.
    #[must_use]
    pub(crate) const fn canonical_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Uint(_) => 3,
            Self::Float64(_) => 4,
            Self::Decimal(_) => 5,
            Self::Text(_) => 6,
            Self::Ulid(_) => 7,
            Self::List(_) => 8,
        }
    }

    /// Total canonical comparator (rank, then same-variant comparison).
    #[must_use]
    pub fn canonical_cmp(left: &Self, right: &Self) -> Ordering {
        compare::canonical_cmp(left, right)
    }

    /// Numeric-aware comparison used by filter evaluation.
    ///
    /// Returns `None` for values that are not mutually orderable.
    #[must_use]
    pub fn semantic_cmp(left: &Self, right: &Self) -> Option<Ordering> {
        compare::semantic_cmp(left, right)
    }

    /// Numeric-aware equality used by filter evaluation.
    #[must_use]
    pub fn semantic_eq(left: &Self, right: &Self) -> bool {
        Self::semantic_cmp(left, right) == Some(Ordering::Equal)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Self::canonical_cmp(self, other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::canonical_cmp(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Ulid(v) => write!(f, "{v}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

///
/// CONVERSIONS
///

macro_rules! impl_value_from {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Uint,
    u16 => Uint,
    u32 => Uint,
    u64 => Uint,
    f32 => Float64,
    f64 => Float64,
    Decimal => Decimal,
    String => Text,
    &str => Text,
    Ulid => Ulid,
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
