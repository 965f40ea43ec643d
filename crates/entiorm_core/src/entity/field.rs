//! Natively storable member types.

use entiorm_codec::Value;
use uuid::Uuid;

/// Storage category of a member, used for column types and key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Text.
    Text,
    /// Raw bytes (also used for serialized members).
    Bytes,
    /// UUID, stored as hyphenated text.
    Uuid,
}

/// A Rust type that maps onto a single native column or element.
///
/// Conversions back from storage are lenient where databases are: SQLite
/// returns booleans as integers, for example.
pub trait FieldValue: Sized + Send + Sync + 'static {
    /// Storage category.
    const KIND: ValueKind;
    /// Whether the type itself admits null.
    const NULLABLE: bool = false;

    /// Converts to the stored form.
    fn to_value(&self) -> Value;

    /// Converts from the stored form.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch.
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {}", value.type_name())
}

impl FieldValue for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FieldValue for i32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| format!("{n} does not fit in i32"))
    }
}

impl FieldValue for u32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let n = i64::from_value(value)?;
        u32::try_from(n).map_err(|_| format!("{n} does not fit in u32"))
    }
}

impl FieldValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(n) => Ok(n as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl FieldValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FieldValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FieldValue for Uuid {
    const KIND: ValueKind = ValueKind::Uuid;

    fn to_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Uuid::parse_str(&s).map_err(|e| e.to_string()),
            Value::Bytes(b) => Uuid::from_slice(&b).map_err(|e| e.to_string()),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    const KIND: ValueKind = V::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldValue::to_value)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_check_range() {
        assert_eq!(i32::from_value(Value::Integer(-5)).unwrap(), -5);
        assert!(i32::from_value(Value::Integer(i64::MAX)).is_err());
        assert!(u32::from_value(Value::Integer(-1)).is_err());
    }

    #[test]
    fn bool_accepts_integer_storage() {
        assert!(bool::from_value(Value::Integer(1)).unwrap());
        assert!(!bool::from_value(Value::Integer(0)).unwrap());
        assert!(bool::from_value(Value::Integer(2)).is_err());
    }

    #[test]
    fn uuid_is_stored_as_text() {
        let id = Uuid::new_v4();
        let stored = id.to_value();
        assert_eq!(stored.as_text().unwrap().len(), 36);
        assert_eq!(Uuid::from_value(stored).unwrap(), id);
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Some(3i64).to_value(), Value::Integer(3));
        assert!(<Option<i64> as FieldValue>::NULLABLE);
        assert!(String::from_value(Value::Null).is_err());
    }
}
