//! Create-space command implementation.

use spacesync_core::{ChangeNotifier, MutatorRegistry, SpaceId, SyncEngine, Version, VersionedStore};
use std::path::Path;
use std::sync::Arc;

/// Runs the create-space command.
pub fn run(path: &Path, id: Option<&str>, version: u64) -> Result<(), Box<dyn std::error::Error>> {
    let space_id = create(path, id, version)?;
    println!("{space_id}");
    Ok(())
}

fn create(path: &Path, id: Option<&str>, version: u64) -> Result<SpaceId, Box<dyn std::error::Error>> {
    let store = Arc::new(VersionedStore::open(path)?);
    let engine = SyncEngine::new(
        store,
        Arc::new(MutatorRegistry::new()),
        Arc::new(ChangeNotifier::new()),
    );

    let space_id = match id {
        Some(id) => {
            let space_id = SpaceId::from(id);
            engine.create_space_with_id(&space_id, Version::new(version))?;
            space_id
        }
        None if version == 0 => engine.create_space()?,
        None => return Err("--version requires --id".into()),
    };
    Ok(space_id)
}
