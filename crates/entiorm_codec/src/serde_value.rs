//! Serde representations as [`Value`]s.
//!
//! Serialized members hand their serde form to the mapping as a plain
//! [`Value`]; turning that into bytes is left to [`serialized`](crate::serialized).

use ciborium::value::Value as Cbor;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// The serde representation of `member` as a [`Value`].
///
/// # Errors
///
/// Returns an error if the member's `Serialize` impl fails or produces an
/// integer outside the `i64` range.
pub fn to_value<T: Serialize + ?Sized>(member: &T) -> CodecResult<Value> {
    let cbor = Cbor::serialized(member).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

/// Rebuilds a member from the [`Value`] produced by [`to_value`].
///
/// # Errors
///
/// Returns an error if `value` does not fit `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
    to_cbor_value(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

pub(crate) fn to_cbor_value(value: Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(b),
        Value::Integer(n) => Cbor::Integer(n.into()),
        Value::Float(f) => Cbor::Float(f),
        Value::Bytes(b) => Cbor::Bytes(b),
        Value::Text(s) => Cbor::Text(s),
        Value::Array(items) => Cbor::Array(items.into_iter().map(to_cbor_value).collect()),
        Value::Map(pairs) => Cbor::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (to_cbor_value(k), to_cbor_value(v)))
                .collect(),
        ),
    }
}

pub(crate) fn from_cbor_value(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => Value::Integer(
            i64::try_from(n).map_err(|_| CodecError::unsupported_type("integer outside i64"))?,
        ),
        Cbor::Float(f) => Value::Float(f),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Tag(tag, _) => return Err(CodecError::unsupported_type(format!("tag {tag}"))),
        _ => return Err(CodecError::unsupported_type("cbor item")),
    })
}
