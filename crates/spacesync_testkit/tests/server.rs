//! The endpoint layer over a real engine.

use serde_json::{json, Value};
use spacesync_protocol::{PokeEvent, SpaceId};
use spacesync_server::{ServerConfig, SyncRequest, SyncServer};
use spacesync_testkit::prelude::*;
use std::time::Duration;

fn server() -> SyncServer {
    SyncServer::new(TestEngine::memory(todo_mutators()).engine, ServerConfig::default())
}

fn body(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

#[test]
fn todo_round_trip_over_json() {
    let server = server();
    let created = server.handle(SyncRequest::CreateSpace { space_id: None });
    assert_eq!(created.status, 200);
    let created: Value = serde_json::from_slice(&created.body).unwrap();
    let space_id = SpaceId::from(created["spaceID"].as_str().unwrap());

    let push = server.handle(SyncRequest::Push {
        space_id: space_id.clone(),
        body: body(json!({
            "profileID": "p",
            "clientGroupID": "g",
            "pushVersion": 1,
            "mutations": [{
                "clientID": "c",
                "id": 1,
                "name": "createTodo",
                "args": {"id": "t1", "text": "milk", "completed": false, "sort": 0, "updatedBy": "c"},
                "timestamp": 1.0
            }]
        })),
    });
    assert!(push.is_success());

    let pull = server.handle(SyncRequest::Pull {
        space_id,
        body: body(json!({"clientGroupID": "g", "cookie": null, "pullVersion": 1})),
    });
    let pulled: Value = serde_json::from_slice(&pull.body).unwrap();
    assert_eq!(pulled["cookie"], 1);
    assert_eq!(pulled["lastMutationIDChanges"], json!({"c": 1}));
    assert_eq!(pulled["patch"][0]["op"], "put");
    assert_eq!(pulled["patch"][0]["key"], "todo/t1");
    assert_eq!(pulled["patch"][0]["value"]["text"], "milk");
}

#[test]
fn error_statuses() {
    let server = server();
    let missing = server.handle(SyncRequest::Pull {
        space_id: SpaceId::from("nope"),
        body: body(json!({"clientGroupID": "g", "cookie": 0})),
    });
    assert_eq!(missing.status, 404);

    server.handle(SyncRequest::CreateSpace {
        space_id: Some(SpaceId::from("s")),
    });
    let again = server.handle(SyncRequest::CreateSpace {
        space_id: Some(SpaceId::from("s")),
    });
    assert_eq!(again.status, 409);

    let garbage = server.handle(SyncRequest::Push {
        space_id: SpaceId::from("s"),
        body: b"{not json".to_vec(),
    });
    assert_eq!(garbage.status, 400);
    let error: Value = serde_json::from_slice(&garbage.body).unwrap();
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn pushes_poke_subscribers() {
    let server = server();
    server.handle(SyncRequest::CreateSpace {
        space_id: Some(SpaceId::from("s")),
    });
    let mut stream = server.subscribe(&SpaceId::from("s"));
    let mut other = server.subscribe(&SpaceId::from("elsewhere"));

    let reply = server.handle(SyncRequest::Push {
        space_id: SpaceId::from("s"),
        body: body(json!({
            "clientGroupID": "g",
            "mutations": [{"clientID": "c", "id": 1, "name": "put", "args": {"key": "k", "value": 1}}]
        })),
    });
    assert!(reply.is_success());

    let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap();
    assert_eq!(event, Some(PokeEvent::new("s")));
    assert!(other.try_next().is_none());
}
