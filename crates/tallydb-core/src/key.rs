use crate::value::Value;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

///
/// Key
///
/// Primary-key scalar. Kept separate from `Value` so identities are always
/// non-null, totally ordered and hashable.
///

#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Key {
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Uint(u64),
    #[display("{_0:?}")]
    Text(String),
    #[display("{_0}")]
    Ulid(Ulid),
}

impl Key {
    /// Convert a field value into a key, when the value is key-shaped.
    ///
    /// Null, booleans, floats, decimals and lists never identify a record.
    #[must_use]
    pub fn try_from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Self::Int(*v)),
            Value::Uint(v) => Some(Self::Uint(*v)),
            Value::Text(v) => Some(Self::Text(v.clone())),
            Value::Ulid(v) => Some(Self::Ulid(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::Int(*v),
            Self::Uint(v) => Value::Uint(*v),
            Self::Text(v) => Value::Text(v.clone()),
            Self::Ulid(v) => Value::Ulid(*v),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips_through_value() {
        for key in [
            Key::Int(-4),
            Key::Uint(9),
            Key::from("inv-1"),
            Key::Ulid(Ulid::nil()),
        ] {
            assert_eq!(Key::try_from_value(&key.to_value()), Some(key));
        }
    }

    #[test]
    fn non_key_values_do_not_identify_records() {
        assert_eq!(Key::try_from_value(&Value::Null), None);
        assert_eq!(Key::try_from_value(&Value::Bool(true)), None);
        assert_eq!(Key::try_from_value(&Value::Float64(1.0)), None);
    }

    #[test]
    fn display_is_unambiguous_for_text_keys() {
        assert_eq!(Key::Uint(7).to_string(), "7");
        assert_eq!(Key::from("7").to_string(), "\"7\"");
    }
}
