//! proptest generators for fixture entities.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::fixtures::TestTable;

/// A JSON scalar that survives every backend unchanged.
pub fn arb_scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|n| serde_json::Value::from(n)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(serde_json::Value::String),
    ]
}

/// A nested key-value bag, up to two levels deep.
pub fn arb_extra() -> impl Strategy<Value = BTreeMap<String, serde_json::Value>> {
    let leaf = arb_scalar();
    let nested = prop::collection::btree_map("[a-z]{1,6}", arb_scalar(), 0..4)
        .prop_map(|m| serde_json::Value::Object(m.into_iter().collect()));
    prop::collection::btree_map("[a-z]{1,8}", prop_oneof![leaf, nested], 0..5)
}

/// An unsaved [`TestTable`].
pub fn arb_test_table() -> impl Strategy<Value = TestTable> {
    ("[a-zA-Z][a-zA-Z0-9 ]{0,23}", arb_extra()).prop_map(|(name, extra)| TestTable {
        id: 0,
        name,
        extra,
    })
}
