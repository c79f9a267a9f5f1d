//! Test fixtures and engine helpers.
//!
//! Provides example mutator registries, engines that clean up after
//! themselves and a client replica that follows pull patches.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spacesync_core::{
    ChangeNotifier, CoreResult, MutationTx, MutatorError, MutatorRegistry, StoreConfig,
    SyncEngine, Version, VersionedStore,
};
use spacesync_protocol::{
    apply_patch, ClientGroupId, ClientId, Mutation, PullRequest, PushRequest, SpaceId,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Key prefix of todo entries.
pub const TODO_PREFIX: &str = "todo/";

/// A todo item as stored under `todo/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Item id.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Whether the item is done.
    pub completed: bool,
    /// Position in the list.
    pub sort: f64,
    /// Client that wrote the item last.
    #[serde(rename = "updatedBy")]
    pub updated_by: String,
}

/// A partial todo update. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoUpdate {
    /// Item id.
    pub id: String,
    /// New text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// New completion state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// New position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<f64>,
    /// Client making the change.
    #[serde(rename = "updatedBy")]
    pub updated_by: String,
}

/// Returns the entry key of a todo.
pub fn todo_key(id: &str) -> String {
    format!("{TODO_PREFIX}{id}")
}

/// Reads a todo by id.
pub fn get_todo(tx: &dyn MutationTx, id: &str) -> Result<Option<Todo>, MutatorError> {
    tx.get(&todo_key(id))
        .map(serde_json::from_value)
        .transpose()
        .map_err(MutatorError::from)
}

/// Lists all todos in key order.
pub fn list_todos(tx: &dyn MutationTx) -> Result<Vec<Todo>, MutatorError> {
    tx.scan_prefix(TODO_PREFIX)
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value).map_err(MutatorError::from))
        .collect()
}

fn put_json<T: Serialize>(tx: &mut dyn MutationTx, key: &str, value: &T) -> Result<(), MutatorError> {
    tx.put(key, serde_json::to_value(value)?);
    Ok(())
}

fn string_arg<'a>(args: &'a Value, field: &str) -> Result<&'a str, MutatorError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| MutatorError::new(format!("missing string argument `{field}`")))
}

/// Registers the todo-list mutators: `createTodo`, `updateTodo` and
/// `deleteTodo`.
pub fn register_todo_mutators(registry: &mut MutatorRegistry) {
    registry
        .register("createTodo", |tx, args| {
            let todo: Todo = serde_json::from_value(args.clone())?;
            put_json(tx, &todo_key(&todo.id), &todo)
        })
        .register("updateTodo", |tx, args| {
            let update: TodoUpdate = serde_json::from_value(args.clone())?;
            let Some(mut todo) = get_todo(tx, &update.id)? else {
                return Ok(());
            };
            if let Some(text) = update.text {
                todo.text = text;
            }
            if let Some(completed) = update.completed {
                todo.completed = completed;
            }
            if let Some(sort) = update.sort {
                todo.sort = sort;
            }
            todo.updated_by = update.updated_by;
            put_json(tx, &todo_key(&todo.id), &todo)
        })
        .register("deleteTodo", |tx, args| {
            let id = args
                .as_str()
                .ok_or_else(|| MutatorError::new("deleteTodo expects a todo id"))?;
            tx.del(&todo_key(id));
            Ok(())
        });
}

/// Registers generic `put {key, value}` and `del {key}` mutators.
pub fn register_kv_mutators(registry: &mut MutatorRegistry) {
    registry
        .register("put", |tx, args| {
            let key = string_arg(args, "key")?;
            tx.put(key, args.get("value").cloned().unwrap_or(Value::Null));
            Ok(())
        })
        .register("del", |tx, args| {
            let key = string_arg(args, "key")?;
            tx.del(key);
            Ok(())
        });
}

/// Registers `fail`, which writes `{key}` and then errors, and `panic`,
/// which writes `{key}` and then panics.
pub fn register_faulty_mutators(registry: &mut MutatorRegistry) {
    registry
        .register("fail", |tx, args| {
            tx.put(string_arg(args, "key")?, json!("partial"));
            Err(MutatorError::new("fail mutator always fails"))
        })
        .register("panic", |tx, args| {
            tx.put(string_arg(args, "key")?, json!("partial"));
            panic!("panic mutator always panics");
        });
}

/// The todo mutators plus `put` and `del`.
pub fn todo_mutators() -> MutatorRegistry {
    let mut registry = MutatorRegistry::new();
    register_todo_mutators(&mut registry);
    register_kv_mutators(&mut registry);
    registry
}

/// `put`, `del`, `fail` and `panic`.
pub fn kv_mutators() -> MutatorRegistry {
    let mut registry = MutatorRegistry::new();
    register_kv_mutators(&mut registry);
    register_faulty_mutators(&mut registry);
    registry
}

/// Builds a `put` mutation.
pub fn put_mutation(client: &str, id: u64, key: &str, value: Value) -> Mutation {
    Mutation::new(client, id, "put", json!({"key": key, "value": value}))
}

/// Builds a `del` mutation.
pub fn del_mutation(client: &str, id: u64, key: &str) -> Mutation {
    Mutation::new(client, id, "del", json!({"key": key}))
}

/// Builds a `createTodo` mutation.
pub fn create_todo_mutation(client: &str, id: u64, todo: &Todo) -> Mutation {
    Mutation::new(client, id, "createTodo", json!(todo))
}

/// Builds a push request.
pub fn push_request(group: &str, mutations: Vec<Mutation>) -> PushRequest {
    PushRequest::new(group, mutations)
}

/// An engine with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: SyncEngine,
    mutators: Arc<MutatorRegistry>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Creates an engine over an in-memory store.
    pub fn memory(mutators: MutatorRegistry) -> Self {
        let store = VersionedStore::open_in_memory().expect("Failed to open in-memory store");
        let mutators = Arc::new(mutators);
        Self {
            engine: build_engine(store, &mutators),
            mutators,
            temp_dir: None,
        }
    }

    /// Creates an engine over a store in a fresh temporary directory.
    pub fn file(mutators: MutatorRegistry) -> Self {
        Self::file_with_config(mutators, StoreConfig::default())
    }

    /// Creates a file-backed engine with a custom store configuration.
    pub fn file_with_config(mutators: MutatorRegistry, config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = VersionedStore::open_with_config(temp_dir.path(), config)
            .expect("Failed to open file store");
        let mutators = Arc::new(mutators);
        Self {
            engine: build_engine(store, &mutators),
            mutators,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Creates `id` at version 0 and returns it.
    pub fn space(&self, id: &str) -> SpaceId {
        self.space_at(id, Version::ZERO)
    }

    /// Creates `id` at `version` and returns it.
    pub fn space_at(&self, id: &str, version: Version) -> SpaceId {
        let space_id = SpaceId::from(id);
        self.engine
            .create_space_with_id(&space_id, version)
            .expect("Failed to create space");
        space_id
    }

    /// Closes the store and opens it again from its directory, simulating
    /// a restart. Panics for in-memory engines.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            mutators,
            temp_dir,
        } = self;
        let temp_dir = temp_dir.expect("Only file engines can be reopened");
        drop(engine);

        let store = VersionedStore::open(temp_dir.path()).expect("Failed to reopen store");
        Self {
            engine: build_engine(store, &mutators),
            mutators,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = SyncEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

fn build_engine(store: VersionedStore, mutators: &Arc<MutatorRegistry>) -> SyncEngine {
    SyncEngine::new(
        Arc::new(store),
        Arc::clone(mutators),
        Arc::new(ChangeNotifier::new()),
    )
}

/// Runs a test against an in-memory engine with the key-value mutators.
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&SyncEngine) -> R,
{
    let test_engine = TestEngine::memory(kv_mutators());
    f(&test_engine.engine)
}

/// Runs a test against a file-backed engine with the key-value mutators.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&SyncEngine, &Path) -> R,
{
    let test_engine = TestEngine::file(kv_mutators());
    let path = test_engine.path().expect("File engine should have a path");
    f(&test_engine.engine, &path)
}

/// A client-side replica of one space, driven by pulls.
#[derive(Debug, Clone)]
pub struct Replica {
    /// Group the replica pulls for.
    pub client_group_id: ClientGroupId,
    /// Cookie of the last applied pull.
    pub cookie: Option<u64>,
    /// Entries as the client sees them.
    pub entries: BTreeMap<String, Value>,
    /// Last mutation ids confirmed by the server.
    pub last_mutation_ids: BTreeMap<ClientId, u64>,
}

impl Replica {
    /// Creates an empty replica that has never pulled.
    pub fn new(client_group_id: &str) -> Self {
        Self {
            client_group_id: ClientGroupId::from(client_group_id),
            cookie: None,
            entries: BTreeMap::new(),
            last_mutation_ids: BTreeMap::new(),
        }
    }

    /// Pulls from `engine` and applies the response. Returns the number of
    /// patch operations applied.
    pub fn pull_from(&mut self, engine: &SyncEngine, space_id: &SpaceId) -> CoreResult<usize> {
        let request = PullRequest::new(self.client_group_id.clone(), self.cookie);
        let response = engine.pull(space_id, &request)?;
        apply_patch(&mut self.entries, &response.patch);
        self.last_mutation_ids
            .extend(response.last_mutation_id_changes);
        self.cookie = Some(response.cookie);
        Ok(response.patch.len())
    }
}
