//! Dump-journal command implementation.

use serde::Serialize;
use spacesync_core::journal::{self, Journal, JournalRecord, ScannedRecord};
use std::path::Path;

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct JournalRecordInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Record type.
    pub record_type: &'static str,
    /// Space the record belongs to.
    pub space_id: String,
    /// Space version after the record.
    pub version: u64,
    /// Client rows written (commits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<usize>,
    /// Entries written (commits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puts: Option<usize>,
    /// Entries tombstoned (commits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dels: Option<usize>,
}

impl From<&ScannedRecord> for JournalRecordInfo {
    fn from(scanned: &ScannedRecord) -> Self {
        let record = &scanned.record;
        let mut info = Self {
            offset: scanned.offset,
            record_type: "CREATE_SPACE",
            space_id: record.space_id().to_string(),
            version: record.version(),
            clients: None,
            puts: None,
            dels: None,
        };
        if let JournalRecord::Commit(commit) = record {
            let dels = commit.entries.iter().filter(|e| e.value.is_none()).count();
            info.record_type = "COMMIT";
            info.clients = Some(commit.clients.len());
            info.puts = Some(commit.entries.len() - dels);
            info.dels = Some(dels);
        }
        info
    }
}

/// Runs the dump-journal command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let journal_path = journal::journal_path(path);
    if !journal_path.exists() {
        return Err("journal file not found".into());
    }

    let scan = Journal::open_read_only(&journal_path)?.scan()?;
    let records: Vec<JournalRecordInfo> = scan
        .records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(JournalRecordInfo::from)
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
            if scan.torn_bytes() > 0 {
                println!();
                println!("{} torn bytes after offset {}", scan.torn_bytes(), scan.valid_len);
            }
        }
    }

    Ok(())
}

fn print_text_output(records: &[JournalRecordInfo]) {
    println!("Journal Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!(
            "[{:08}] {:12} space={} version={}",
            record.offset, record.record_type, record.space_id, record.version
        );
        if let Some(clients) = record.clients {
            print!(" clients={clients}");
        }
        if let (Some(puts), Some(dels)) = (record.puts, record.dels) {
            print!(" puts={puts} dels={dels}");
        }
        println!();
    }
}
