//! Patch operations returned by pull.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One step of a pull patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Set `key` to `value`.
    Put {
        /// Entry key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Remove `key`.
    Del {
        /// Entry key.
        key: String,
    },
}

impl PatchOperation {
    /// Creates a put operation.
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    /// Creates a del operation.
    pub fn del(key: impl Into<String>) -> Self {
        Self::Del { key: key.into() }
    }

    /// Returns the key the operation touches.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Del { key } => key,
        }
    }
}

/// Applies `patch` in order to a client-side replica.
pub fn apply_patch(replica: &mut BTreeMap<String, Value>, patch: &[PatchOperation]) {
    for op in patch {
        match op {
            PatchOperation::Put { key, value } => {
                replica.insert(key.clone(), value.clone());
            }
            PatchOperation::Del { key } => {
                replica.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn del_has_no_value_field() {
        let encoded = serde_json::to_value(PatchOperation::del("todo/1")).unwrap();
        assert_eq!(encoded, json!({"op": "del", "key": "todo/1"}));
    }

    #[test]
    fn decode_tagged_ops() {
        let ops: Vec<PatchOperation> = serde_json::from_value(json!([
            {"op": "put", "key": "a", "value": 1},
            {"op": "del", "key": "b"}
        ]))
        .unwrap();
        assert_eq!(ops[0], PatchOperation::put("a", json!(1)));
        assert_eq!(ops[1].key(), "b");
    }

    #[test]
    fn apply_in_order() {
        let mut replica = BTreeMap::new();
        replica.insert("stale".to_string(), json!(true));

        apply_patch(
            &mut replica,
            &[
                PatchOperation::put("a", json!(1)),
                PatchOperation::del("stale"),
                PatchOperation::put("a", json!(2)),
                PatchOperation::del("never-existed"),
            ],
        );

        assert_eq!(replica.len(), 1);
        assert_eq!(replica["a"], json!(2));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn op_strategy() -> impl Strategy<Value = PatchOperation> {
            let key = "[a-c]";
            prop_oneof![
                (key, any::<i32>()).prop_map(|(k, v)| PatchOperation::put(k, json!(v))),
                key.prop_map(|k| PatchOperation::del(k)),
            ]
        }

        proptest! {
            #[test]
            fn last_op_per_key_wins(ops in prop::collection::vec(op_strategy(), 0..32)) {
                let mut replica = BTreeMap::new();
                apply_patch(&mut replica, &ops);

                for key in ["a", "b", "c"] {
                    let last = ops.iter().rev().find(|op| op.key() == key);
                    match last {
                        Some(PatchOperation::Put { value, .. }) => {
                            prop_assert_eq!(replica.get(key), Some(value));
                        }
                        _ => prop_assert!(!replica.contains_key(key)),
                    }
                }
            }
        }
    }
}
