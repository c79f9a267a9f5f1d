//! Push and pull messages.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ClientGroupId, ClientId, SpaceId};
use crate::patch::PatchOperation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// JSON encoding shared by every wire message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes the message as a JSON body.
    fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a message from a JSON body.
    fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A named, client-sequenced operation to replay against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Client that produced the mutation.
    #[serde(rename = "clientID", alias = "clientId")]
    pub client_id: ClientId,
    /// Client-local sequence number, starting at 1.
    pub id: u64,
    /// Name of the mutator to run.
    pub name: String,
    /// Opaque arguments handed to the mutator.
    #[serde(default)]
    pub args: Value,
}

impl Mutation {
    /// Creates a mutation.
    pub fn new(client_id: impl Into<ClientId>, id: u64, name: impl Into<String>, args: Value) -> Self {
        Self {
            client_id: client_id.into(),
            id,
            name: name.into(),
            args,
        }
    }
}

/// A batch of mutations from one client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Group the pushing clients belong to.
    #[serde(rename = "clientGroupID", alias = "clientGroupId")]
    pub client_group_id: ClientGroupId,
    /// Mutations in client order.
    #[serde(default)]
    pub mutations: Vec<Mutation>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(client_group_id: impl Into<ClientGroupId>, mutations: Vec<Mutation>) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            mutations,
        }
    }

    /// Returns the distinct client ids appearing in the batch.
    pub fn client_ids(&self) -> BTreeSet<ClientId> {
        self.mutations.iter().map(|m| m.client_id.clone()).collect()
    }

    /// Checks structural rules that hold regardless of server state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty group or client id, an empty
    /// mutator name, or a mutation id of zero.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.client_group_id.is_empty() {
            return Err(ProtocolError::invalid("clientGroupID must not be empty"));
        }
        for mutation in &self.mutations {
            if mutation.client_id.is_empty() {
                return Err(ProtocolError::invalid("clientID must not be empty"));
            }
            if mutation.name.is_empty() {
                return Err(ProtocolError::invalid(format!(
                    "mutation {} from {} has no name",
                    mutation.id, mutation.client_id
                )));
            }
            if mutation.id == 0 {
                return Err(ProtocolError::invalid(format!(
                    "mutation ids start at 1 (client {})",
                    mutation.client_id
                )));
            }
        }
        Ok(())
    }
}

/// Successful push reply. Carries no data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {}

/// Request for the changes since a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Group whose mutation-id deltas are reported.
    #[serde(rename = "clientGroupID", alias = "clientGroupId")]
    pub client_group_id: ClientGroupId,
    /// Last cookie the client saw; `null` on first pull.
    #[serde(default)]
    pub cookie: Option<u64>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(client_group_id: impl Into<ClientGroupId>, cookie: Option<u64>) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            cookie,
        }
    }

    /// Returns the version to diff from; a missing cookie means 0.
    #[must_use]
    pub fn since(&self) -> u64 {
        self.cookie.unwrap_or(0)
    }
}

/// Patch and watermarks bringing a replica up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// New baseline the client should record.
    pub cookie: u64,
    /// Clients of the requesting group whose last mutation id changed.
    #[serde(rename = "lastMutationIDChanges", alias = "lastMutationIdChanges")]
    pub last_mutation_id_changes: BTreeMap<ClientId, u64>,
    /// Ordered put/del operations.
    pub patch: Vec<PatchOperation>,
}

/// JSON body for failed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
}

/// Reply to a space provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSpaceResponse {
    /// Id of the new space.
    #[serde(rename = "spaceID", alias = "spaceId")]
    pub space_id: SpaceId,
}

/// Reply to a space existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceExistsResponse {
    /// Whether the space has a cookie.
    pub exists: bool,
}

impl WireMessage for PushRequest {}
impl WireMessage for PushResponse {}
impl WireMessage for PullRequest {}
impl WireMessage for PullResponse {}
impl WireMessage for ErrorBody {}
impl WireMessage for CreateSpaceResponse {}
impl WireMessage for SpaceExistsResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_push_with_extra_fields() {
        let body = json!({
            "profileID": "p1",
            "clientGroupID": "g1",
            "pushVersion": 1,
            "schemaVersion": "",
            "mutations": [
                {"clientID": "c1", "id": 3, "name": "put", "args": {"key": "todo/1"}, "timestamp": 12.5}
            ]
        });
        let request = PushRequest::from_json(body.to_string().as_bytes()).unwrap();

        assert_eq!(request.client_group_id.as_str(), "g1");
        assert_eq!(request.mutations.len(), 1);
        assert_eq!(request.mutations[0].client_id.as_str(), "c1");
        assert_eq!(request.mutations[0].args["key"], "todo/1");
        request.validate().unwrap();
    }

    #[test]
    fn decode_accepts_id_spelling() {
        let body = br#"{"clientGroupId":"g1","mutations":[{"clientId":"c1","id":1,"name":"x"}]}"#;
        let request = PushRequest::from_json(body).unwrap();
        assert_eq!(request.mutations[0].client_id.as_str(), "c1");
        assert_eq!(request.mutations[0].args, Value::Null);
    }

    #[test]
    fn validate_rejects_zero_id_and_blank_fields() {
        let zero = PushRequest::new("g", vec![Mutation::new("c", 0, "put", Value::Null)]);
        assert!(zero.validate().is_err());

        let unnamed = PushRequest::new("g", vec![Mutation::new("c", 1, "", Value::Null)]);
        assert!(unnamed.validate().is_err());

        let no_group = PushRequest::new("", vec![]);
        assert!(no_group.validate().is_err());
    }

    #[test]
    fn client_ids_are_distinct() {
        let request = PushRequest::new(
            "g",
            vec![
                Mutation::new("b", 1, "put", Value::Null),
                Mutation::new("a", 1, "put", Value::Null),
                Mutation::new("b", 2, "put", Value::Null),
            ],
        );
        let ids: Vec<_> = request.client_ids().into_iter().collect();
        assert_eq!(ids, vec![ClientId::from("a"), ClientId::from("b")]);
    }

    #[test]
    fn pull_cookie_null_means_zero() {
        let request = PullRequest::from_json(br#"{"clientGroupID":"g","cookie":null}"#).unwrap();
        assert_eq!(request.cookie, None);
        assert_eq!(request.since(), 0);

        let request = PullRequest::from_json(br#"{"clientGroupID":"g","cookie":7}"#).unwrap();
        assert_eq!(request.since(), 7);
    }

    #[test]
    fn pull_response_wire_shape() {
        let mut changes = BTreeMap::new();
        changes.insert(ClientId::from("c1"), 3);
        let response = PullResponse {
            cookie: 6,
            last_mutation_id_changes: changes,
            patch: vec![PatchOperation::put("todo/1", json!({"text": "a"}))],
        };

        let encoded: Value = serde_json::from_slice(&response.to_json().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "cookie": 6,
                "lastMutationIDChanges": {"c1": 3},
                "patch": [{"op": "put", "key": "todo/1", "value": {"text": "a"}}]
            })
        );
    }

    #[test]
    fn push_response_is_empty_object() {
        assert_eq!(PushResponse::default().to_json().unwrap(), b"{}");
    }

    #[test]
    fn create_space_response_shape() {
        let reply = CreateSpaceResponse {
            space_id: SpaceId::from("a1b2c3"),
        };
        let encoded: Value = serde_json::from_slice(&reply.to_json().unwrap()).unwrap();
        assert_eq!(encoded, json!({"spaceID": "a1b2c3"}));
        let exists = SpaceExistsResponse::from_json(br#"{"exists": true}"#).unwrap();
        assert!(exists.exists);
    }
}
