//! Inspect command implementation.

use serde::Serialize;
use spacesync_core::{SpaceSummary, StoreConfig, VersionedStore};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Per-space statistics.
    pub spaces: Vec<SpaceStats>,
}

/// Statistics for a single space.
#[derive(Debug, Serialize)]
pub struct SpaceStats {
    /// Space id.
    pub id: String,
    /// Current cookie.
    pub version: u64,
    /// Live entries.
    pub entries: usize,
    /// Tombstoned entries.
    pub tombstones: usize,
    /// Known clients.
    pub clients: usize,
    /// Last modification, milliseconds since the Unix epoch.
    pub last_modified_ms: u64,
}

impl From<SpaceSummary> for SpaceStats {
    fn from(summary: SpaceSummary) -> Self {
        let last_modified_ms = summary
            .last_modified
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            id: summary.space_id.to_string(),
            version: summary.version.as_u64(),
            entries: summary.live_entries,
            tombstones: summary.tombstones,
            clients: summary.clients,
            last_modified_ms,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = VersionedStore::open_with_config(path, StoreConfig::new().create_if_missing(false))?;

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: store.journal_size()?,
        spaces: store.list_spaces().into_iter().map(SpaceStats::from).collect(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("Journal: {} bytes", result.journal_size);
    println!();
    println!("Spaces ({} total)", result.spaces.len());
    println!("================");

    for space in &result.spaces {
        println!(
            "{:<12} version={:<8} entries={:<6} tombstones={:<6} clients={}",
            space.id, space.version, space.entries, space.tombstones, space.clients
        );
    }
}
