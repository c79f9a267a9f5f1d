//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small key space so that generated batches
//! overwrite and delete each other's entries.

use proptest::prelude::*;
use serde_json::{json, Value};
use spacesync_protocol::Mutation;

/// Strategy for generating entry keys from a small key space.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ab]/[0-9]").expect("Invalid regex")
}

/// Strategy for generating JSON entry values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        prop::string::string_regex("[a-z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::from),
        (any::<u16>(), prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex"))
            .prop_map(|(n, s)| json!({"n": n, "s": s})),
    ]
}

/// A generic key-value operation.
#[derive(Debug, Clone, PartialEq)]
pub enum KvOp {
    /// Put a value.
    Put(String, Value),
    /// Delete a key.
    Del(String),
}

impl KvOp {
    /// Returns the key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Put(key, _) | Self::Del(key) => key,
        }
    }

    /// Converts the operation into a `put`/`del` mutation.
    pub fn to_mutation(&self, client: &str, id: u64) -> Mutation {
        match self {
            Self::Put(key, value) => {
                Mutation::new(client, id, "put", json!({"key": key, "value": value}))
            }
            Self::Del(key) => Mutation::new(client, id, "del", json!({"key": key})),
        }
    }
}

/// Strategy for generating a single key-value operation. Puts are three
/// times as likely as deletes.
pub fn kv_op_strategy() -> impl Strategy<Value = KvOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| KvOp::Put(k, v)),
        1 => key_strategy().prop_map(KvOp::Del),
    ]
}

/// Strategy for generating a batch of operations.
pub fn kv_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<KvOp>> {
    prop::collection::vec(kv_op_strategy(), 0..=max_len)
}

/// Strategy for generating a sequence of batches.
pub fn kv_history_strategy(
    max_batches: usize,
    max_batch_len: usize,
) -> impl Strategy<Value = Vec<Vec<KvOp>>> {
    prop::collection::vec(kv_batch_strategy(max_batch_len), 1..=max_batches)
}

/// Numbers consecutive operations of one client starting at `first_id`.
pub fn to_mutations(client: &str, first_id: u64, ops: &[KvOp]) -> Vec<Mutation> {
    ops.iter()
        .zip(first_id..)
        .map(|(op, id)| op.to_mutation(client, id))
        .collect()
}
