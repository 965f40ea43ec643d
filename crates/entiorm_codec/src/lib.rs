//! # entiorm codec
//!
//! Backend-neutral values and the byte formats built on them.
//!
//! Three concerns live here:
//!
//! - [`Value`], the scalar/document value every backend reads and writes,
//!   together with a canonical CBOR encoding used by the embedded document
//!   store and for schema fingerprints.
//! - [`serde_value`], which captures a member's serde representation as a
//!   [`Value`].
//! - [`serialized`], the single boundary that turns members mapped with
//!   serialization into opaque bytes and back.
//!
//! ## Canonical CBOR Rules
//!
//! - Maps are sorted by key (length-first, then bytewise on encoded keys)
//! - Integers use shortest encoding
//! - Floats are always encoded as 64-bit; NaN is rejected
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use entiorm_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::Integer(42);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
pub mod serde_value;
pub mod serialized;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_shaped_value_roundtrips() {
        let value = Value::map(vec![
            (Value::from("_id"), Value::from("a8b1")),
            (Value::from("Name"), Value::from("TestName")),
            (Value::from("Score"), Value::Float(1.5)),
            (
                Value::from("Tags"),
                Value::Array(vec![Value::from("x"), Value::Null]),
            ),
        ]);
        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn nested_maps_roundtrip() {
        let inner = Value::map(vec![(Value::from("depth"), Value::Integer(2))]);
        let value = Value::map(vec![
            (Value::from("inner"), inner),
            (Value::from("flag"), Value::Bool(true)),
        ]);
        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }
}
