//! Concurrent pushes and pulls.

use serde_json::json;
use spacesync_core::{CoreError, StoreConfig, Version};
use spacesync_protocol::{ClientId, PullRequest};
use spacesync_testkit::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PUSHES_PER_THREAD: u64 = 25;

#[test]
fn concurrent_pushes_to_one_space_serialize() {
    let engine = Arc::new(TestEngine::memory(kv_mutators()));
    let space = engine.space("s");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let space = space.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let client = format!("c{t}");
                let group = format!("g{t}");
                barrier.wait();
                for id in 1..=PUSHES_PER_THREAD {
                    let key = format!("{client}/{id}");
                    engine
                        .push(&space, &push_request(&group, vec![put_mutation(&client, id, &key, json!(id))]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut replica = Replica::new("g0");
    replica.pull_from(&engine, &space).unwrap();
    assert_eq!(replica.cookie, Some(THREADS as u64 * PUSHES_PER_THREAD));
    assert_eq!(replica.entries.len(), THREADS * PUSHES_PER_THREAD as usize);
    assert_eq!(
        replica.last_mutation_ids[&ClientId::from("c0")],
        PUSHES_PER_THREAD
    );
}

#[test]
fn pulls_see_whole_batches() {
    let engine = Arc::new(TestEngine::memory(kv_mutators()));
    let space = engine.space("s");

    let writer = {
        let engine = Arc::clone(&engine);
        let space = space.clone();
        thread::spawn(move || {
            for round in 0..50u64 {
                let mutations = (0..4)
                    .map(|i| put_mutation("c", round * 4 + i + 1, &format!("k{i}"), json!(round)))
                    .collect();
                engine.push(&space, &push_request("g", mutations)).unwrap();
            }
        })
    };

    for _ in 0..50 {
        let response = engine.pull(&space, &PullRequest::new("g", None)).unwrap();
        let values: Vec<_> = response
            .patch
            .iter()
            .filter_map(|op| match op {
                spacesync_protocol::PatchOperation::Put { value, .. } => Some(value.clone()),
                spacesync_protocol::PatchOperation::Del { .. } => None,
            })
            .collect();
        // Every key written by one batch carries the same round number.
        assert!(values.windows(2).all(|w| w[0] == w[1]));
        if response.cookie > 0 {
            assert_eq!(values.len(), 4);
            assert_eq!(values[0], json!(response.cookie - 1));
        }
    }
    writer.join().unwrap();
}

#[test]
fn different_spaces_proceed_independently() {
    let engine = Arc::new(TestEngine::memory(kv_mutators()));
    let spaces: Vec<_> = (0..THREADS).map(|i| engine.space(&format!("s{i}"))).collect();

    let handles: Vec<_> = spaces
        .iter()
        .cloned()
        .map(|space| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for id in 1..=PUSHES_PER_THREAD {
                    engine
                        .push(&space, &push_request("g", vec![put_mutation("c", id, "k", json!(id))]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for summary in engine.list_spaces() {
        assert_eq!(summary.version, Version::new(PUSHES_PER_THREAD));
        assert_eq!(summary.live_entries, 1);
        assert_eq!(summary.clients, 1);
    }
}

#[test]
fn writer_lock_timeout_reports_conflict() {
    let engine = TestEngine::file_with_config(
        kv_mutators(),
        StoreConfig::new().lock_timeout(Duration::from_millis(20)),
    );
    let space = engine.space("s");

    let held = engine.store().begin_write(&space).unwrap();
    let err = engine
        .push(&space, &push_request("g", vec![put_mutation("c", 1, "k", json!(1))]))
        .unwrap_err();
    assert!(matches!(err, CoreError::TransactionConflict { .. }));
    assert!(err.is_retryable());
    drop(held);

    engine
        .push(&space, &push_request("g", vec![put_mutation("c", 1, "k", json!(1))]))
        .unwrap();
}
