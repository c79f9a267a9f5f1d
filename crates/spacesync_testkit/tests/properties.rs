//! Property tests over generated push histories.

use proptest::prelude::*;
use serde_json::Value;
use spacesync_core::{SyncEngine, Version};
use spacesync_protocol::{apply_patch, ClientId, PullRequest, SpaceId};
use spacesync_testkit::prelude::*;
use std::collections::BTreeMap;

/// Applies `history` as consecutive batches of client `c`, returning the
/// expected live entries.
fn run_history(engine: &SyncEngine, space: &SpaceId, history: &[Vec<KvOp>]) -> BTreeMap<String, Value> {
    let mut expected = BTreeMap::new();
    let mut next_id = 1;
    for batch in history {
        let mutations = to_mutations("c", next_id, batch);
        next_id += batch.len() as u64;
        engine.push(space, &push_request("g", mutations)).unwrap();
        for op in batch {
            match op {
                KvOp::Put(key, value) => {
                    expected.insert(key.clone(), value.clone());
                }
                KvOp::Del(key) => {
                    expected.remove(key);
                }
            }
        }
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cookie_grows_by_one_per_push(initial in 0u64..1000, history in kv_history_strategy(6, 5)) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space_at("s", Version::new(initial));
        run_history(&engine, &space, &history);

        let response = engine.pull(&space, &PullRequest::new("g", None)).unwrap();
        prop_assert_eq!(response.cookie, initial + history.len() as u64);
    }

    #[test]
    fn full_pull_reproduces_store(history in kv_history_strategy(6, 6)) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space("s");
        let expected = run_history(&engine, &space, &history);

        let mut replica = Replica::new("g");
        replica.pull_from(&engine, &space).unwrap();
        prop_assert_eq!(&replica.entries, &expected);

        let total: u64 = history.iter().map(|b| b.len() as u64).sum();
        if total > 0 {
            prop_assert_eq!(replica.last_mutation_ids.get(&ClientId::from("c")), Some(&total));
        }
    }

    #[test]
    fn incremental_pulls_converge(history in kv_history_strategy(6, 4)) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space("s");

        let mut incremental = Replica::new("g");
        let mut expected = BTreeMap::new();
        let mut next_id = 1;
        for batch in &history {
            engine
                .push(&space, &push_request("g", to_mutations("c", next_id, batch)))
                .unwrap();
            next_id += batch.len() as u64;
            for op in batch {
                match op {
                    KvOp::Put(key, value) => {
                        expected.insert(key.clone(), value.clone());
                    }
                    KvOp::Del(key) => {
                        expected.remove(key);
                    }
                }
            }
            incremental.pull_from(&engine, &space).unwrap();
            prop_assert_eq!(&incremental.entries, &expected);
        }
    }

    #[test]
    fn resubmitted_batches_change_nothing(history in kv_history_strategy(4, 5)) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space("s");
        run_history(&engine, &space, &history);
        let before = engine.pull(&space, &PullRequest::new("g", None)).unwrap();

        let mut next_id = 1;
        for batch in &history {
            let outcome = engine
                .push(&space, &push_request("g", to_mutations("c", next_id, batch)))
                .unwrap();
            next_id += batch.len() as u64;
            prop_assert_eq!(outcome.processed(), 0);
            prop_assert_eq!(outcome.skipped, batch.len());
        }

        let after = engine.pull(&space, &PullRequest::new("g", None)).unwrap();
        let mut replayed = BTreeMap::new();
        apply_patch(&mut replayed, &after.patch);
        let mut original = BTreeMap::new();
        apply_patch(&mut original, &before.patch);
        prop_assert_eq!(replayed, original);
        prop_assert_eq!(after.last_mutation_id_changes, before.last_mutation_id_changes);
    }

    #[test]
    fn repeated_pulls_are_identical(history in kv_history_strategy(5, 5), since in 0u64..6) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space("s");
        run_history(&engine, &space, &history);

        let first = engine.pull(&space, &PullRequest::new("g", Some(since))).unwrap();
        let second = engine.pull(&space, &PullRequest::new("g", Some(since))).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn delta_contains_only_later_writes(history in kv_history_strategy(6, 4), split in 0usize..6) {
        let engine = TestEngine::memory(kv_mutators());
        let space = engine.space("s");
        let split = split.min(history.len());
        run_history(&engine, &space, &history[..split]);

        let mut touched_later: Vec<String> = history[split..]
            .iter()
            .flatten()
            .map(|op| op.key().to_string())
            .collect();
        touched_later.sort();
        touched_later.dedup();

        let mut next_id = 1 + history[..split].iter().map(|b| b.len() as u64).sum::<u64>();
        for batch in &history[split..] {
            engine
                .push(&space, &push_request("g", to_mutations("c", next_id, batch)))
                .unwrap();
            next_id += batch.len() as u64;
        }

        let response = engine
            .pull(&space, &PullRequest::new("g", Some(split as u64)))
            .unwrap();
        let patched: Vec<String> = response.patch.iter().map(|op| op.key().to_string()).collect();
        prop_assert_eq!(patched, touched_later);
    }
}
