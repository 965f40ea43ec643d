//! Serialized member encoding.
//!
//! Members mapped with serialization are stored as one opaque byte
//! string. This module is the only place that knows the byte format
//! (CBOR written by `ciborium`); every backend stores and returns the
//! bytes untouched.
//!
//! Input is always a [`Value`], so a native member and a serde member
//! (captured with [`to_value`](crate::serde_value::to_value)) produce the
//! same bytes for the same data.

use ciborium::value::Value as Cbor;

use crate::error::{CodecError, CodecResult};
use crate::serde_value::{from_cbor_value, to_cbor_value};
use crate::value::Value;

/// Serialize a member value into its stored representation.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&to_cbor_value(value.clone()), &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Deserialize a member value from its stored representation.
///
/// # Errors
///
/// Returns an error if the bytes were not produced by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: Cbor =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde_value::{from_value, to_value};
    use std::collections::BTreeMap;

    #[test]
    fn nested_map_roundtrip() {
        let mut extra: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        extra.insert("TestKey".into(), serde_json::json!("TestValue"));
        extra.insert(
            "Nested".into(),
            serde_json::json!({ "a": [1, 2, { "b": null }], "c": 1.25, "d": true }),
        );

        let bytes = to_bytes(&to_value(&extra).unwrap()).unwrap();
        let back: BTreeMap<String, serde_json::Value> =
            from_value(from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(back, extra);
        assert_eq!(to_bytes(&to_value(&back).unwrap()).unwrap(), bytes);
    }

    #[test]
    fn scalars_match_their_native_values() {
        assert_eq!(to_value("text").unwrap(), Value::from("text"));
        assert_eq!(to_value(&-4_i64).unwrap(), Value::Integer(-4));
        assert_eq!(to_value(&Option::<bool>::None).unwrap(), Value::Null);
        assert_eq!(
            to_bytes(&to_value(&7_u32).unwrap()).unwrap(),
            to_bytes(&Value::Integer(7)).unwrap()
        );
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        assert!(matches!(
            to_value(&u64::MAX),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        assert!(matches!(
            from_bytes(&[0xff, 0x00]),
            Err(CodecError::DecodingFailed { .. })
        ));
        let wrong: CodecResult<Vec<String>> = from_value(Value::Integer(1));
        assert!(matches!(wrong, Err(CodecError::DecodingFailed { .. })));
    }

    proptest::proptest! {
        #[test]
        fn string_vectors_roundtrip(items in proptest::collection::vec(".*", 0..8)) {
            let bytes = to_bytes(&to_value(&items).unwrap()).unwrap();
            let back: Vec<String> = from_value(from_bytes(&bytes).unwrap()).unwrap();
            proptest::prop_assert_eq!(back, items);
        }
    }
}
