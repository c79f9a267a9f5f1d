//! End-to-end push/pull scenarios.

use serde_json::json;
use spacesync_core::{CoreError, Version};
use spacesync_protocol::{ClientId, Mutation, PatchOperation, PullRequest, SpaceId};
use spacesync_testkit::prelude::*;
use std::collections::BTreeMap;

#[test]
fn push_then_pull_since_previous_cookie() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space_at("s", Version::new(3));
    engine
        .push(&space, &push_request("g", vec![put_mutation("c1", 1, "seed", json!(0))]))
        .unwrap();
    engine
        .push(&space, &push_request("g", vec![del_mutation("c1", 2, "seed")]))
        .unwrap();

    let outcome = engine
        .push(
            &space,
            &push_request("g", vec![put_mutation("c1", 3, "todo/1", json!({"text": "a"}))]),
        )
        .unwrap();
    assert_eq!(outcome.version, Version::new(6));
    assert_eq!(outcome.applied, 1);

    let response = engine.pull(&space, &PullRequest::new("g", Some(5))).unwrap();
    assert_eq!(response.cookie, 6);
    assert_eq!(
        response.last_mutation_id_changes,
        BTreeMap::from([(ClientId::from("c1"), 3)])
    );
    assert_eq!(
        response.patch,
        vec![PatchOperation::put("todo/1", json!({"text": "a"}))]
    );
}

#[test]
fn first_pull_includes_tombstones() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space("s");
    engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    put_mutation("c", 1, "a", json!(1)),
                    put_mutation("c", 2, "b", json!(2)),
                    del_mutation("c", 3, "a"),
                ],
            ),
        )
        .unwrap();

    let response = engine.pull(&space, &PullRequest::new("g", None)).unwrap();
    assert_eq!(
        response.patch,
        vec![PatchOperation::del("a"), PatchOperation::put("b", json!(2))]
    );
}

#[test]
fn unknown_space_fails_both_ways() {
    let engine = TestEngine::memory(kv_mutators());
    let missing = SpaceId::from("missing");

    let push = engine.push(&missing, &push_request("g", vec![put_mutation("c", 1, "k", json!(1))]));
    assert!(matches!(push, Err(CoreError::SpaceNotFound { .. })));

    let pull = engine.pull(&missing, &PullRequest::new("g", None));
    assert!(matches!(pull, Err(CoreError::SpaceNotFound { .. })));
    assert!(!engine.space_exists(&missing));
    assert!(engine.list_spaces().is_empty());
}

#[test]
fn gap_stops_the_batch() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space("s");
    engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    put_mutation("c", 1, "k1", json!(1)),
                    put_mutation("c", 2, "k2", json!(2)),
                    put_mutation("c", 3, "k3", json!(3)),
                ],
            ),
        )
        .unwrap();

    let outcome = engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    put_mutation("c", 4, "k4", json!(4)),
                    put_mutation("c", 6, "k6", json!(6)),
                    put_mutation("other", 1, "o1", json!(1)),
                ],
            ),
        )
        .unwrap();
    let gap = outcome.out_of_order.unwrap();
    assert_eq!((gap.expected, gap.actual, gap.dropped), (5, 6, 2));

    let mut replica = Replica::new("g");
    replica.pull_from(&engine, &space).unwrap();
    assert_eq!(replica.last_mutation_ids[&ClientId::from("c")], 4);
    assert!(replica.entries.contains_key("k4"));
    assert!(!replica.entries.contains_key("k6"));
    assert!(!replica.entries.contains_key("o1"));

    // The client resends from the missing id.
    engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    put_mutation("c", 5, "k5", json!(5)),
                    put_mutation("c", 6, "k6", json!(6)),
                ],
            ),
        )
        .unwrap();
    replica.pull_from(&engine, &space).unwrap();
    assert_eq!(replica.last_mutation_ids[&ClientId::from("c")], 6);
    assert_eq!(replica.entries["k6"], json!(6));
}

#[test]
fn failing_and_unknown_mutators_still_advance() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space("s");
    let outcome = engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    Mutation::new("c", 1, "fail", json!({"key": "from-fail"})),
                    Mutation::new("c", 2, "panic", json!({"key": "from-panic"})),
                    Mutation::new("c", 3, "noSuchMutator", json!(null)),
                    put_mutation("c", 4, "ok", json!(true)),
                ],
            ),
        )
        .unwrap();
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.unknown, 1);
    assert_eq!(outcome.applied, 1);

    let mut replica = Replica::new("g");
    replica.pull_from(&engine, &space).unwrap();
    assert_eq!(replica.entries.len(), 1);
    assert_eq!(replica.entries["ok"], json!(true));
    assert_eq!(replica.last_mutation_ids[&ClientId::from("c")], 4);
}

#[test]
fn mutators_see_earlier_writes_in_batch() {
    let engine = TestEngine::memory(
        kv_mutators().with("copy", |tx, args| {
            let from = args["from"].as_str().unwrap_or_default();
            let to = args["to"].as_str().unwrap_or_default();
            if let Some(value) = tx.get(from) {
                tx.put(to, value);
            }
            Ok(())
        }),
    );
    let space = engine.space("s");
    engine
        .push(
            &space,
            &push_request(
                "g",
                vec![
                    put_mutation("c", 1, "src", json!("v")),
                    Mutation::new("c", 2, "copy", json!({"from": "src", "to": "dst"})),
                ],
            ),
        )
        .unwrap();

    let mut replica = Replica::new("g");
    replica.pull_from(&engine, &space).unwrap();
    assert_eq!(replica.entries["dst"], json!("v"));
}

#[test]
fn other_groups_do_not_see_foreign_clients() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space("s");
    engine
        .push(&space, &push_request("g1", vec![put_mutation("c1", 1, "k", json!(1))]))
        .unwrap();

    let mut replica = Replica::new("g2");
    replica.pull_from(&engine, &space).unwrap();
    assert!(replica.last_mutation_ids.is_empty());
    assert_eq!(replica.entries["k"], json!(1));
}

#[test]
fn spaces_are_isolated() {
    let engine = TestEngine::memory(kv_mutators());
    let a = engine.space("a");
    let b = engine.space("b");
    engine
        .push(&a, &push_request("g", vec![put_mutation("c", 1, "k", json!("a"))]))
        .unwrap();

    let response = engine.pull(&b, &PullRequest::new("g", None)).unwrap();
    assert_eq!(response.cookie, 0);
    assert!(response.patch.is_empty());
}

#[test]
fn pokes_follow_commits() {
    let engine = TestEngine::memory(kv_mutators());
    let space = engine.space("s");
    let pokes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = std::sync::Arc::clone(&pokes);
    let subscription = engine.subscribe(&space, move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    engine
        .push(&space, &push_request("g", vec![put_mutation("c", 1, "k", json!(1))]))
        .unwrap();
    let _ = engine.push(&SpaceId::from("missing"), &push_request("g", vec![]));
    assert_eq!(pokes.load(std::sync::atomic::Ordering::SeqCst), 1);

    drop(subscription);
    engine
        .push(&space, &push_request("g", vec![put_mutation("c", 2, "k", json!(2))]))
        .unwrap();
    assert_eq!(pokes.load(std::sync::atomic::Ordering::SeqCst), 1);
}
