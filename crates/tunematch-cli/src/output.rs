//! JSON output formatting

use serde::Serialize;
use tunematch_core::ingest::IngestOutcome;
use tunematch_core::migration::MigrationStats;
use tunematch_core::{SongMatch, SongMetadata};

#[derive(Serialize)]
struct RecognizeOutput<'a> {
    query_path: &'a str,
    matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a SongMatch>,
}

#[derive(Serialize)]
struct AddOutput<'a> {
    id: &'a str,
    meta: SongMetadata,
    source_url: &'a str,
    fingerprint_len: usize,
}

#[derive(Serialize)]
struct MigrateOutput<'a> {
    dry_run: bool,
    #[serde(flatten)]
    stats: &'a MigrationStats,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// Recognition outcome; a missing match is reported with `"matched": false`
pub fn recognize_json(query_path: &str, result: Option<&SongMatch>) -> serde_json::Value {
    serde_json::to_value(RecognizeOutput {
        query_path,
        matched: result.is_some(),
        result,
    })
    .unwrap_or_default()
}

pub fn print_json_match(query_path: &str, result: Option<&SongMatch>) {
    print_json(&recognize_json(query_path, result));
}

/// Newly added song
pub fn add_json(outcome: &IngestOutcome) -> serde_json::Value {
    serde_json::to_value(AddOutput {
        id: &outcome.id,
        meta: outcome.track.clone().into_metadata(),
        source_url: &outcome.source_url,
        fingerprint_len: outcome.fingerprint_len,
    })
    .unwrap_or_default()
}

pub fn print_json_added(outcome: &IngestOutcome) {
    print_json(&add_json(outcome));
}

pub fn print_json_migration(stats: &MigrationStats, dry_run: bool) {
    print_json(&MigrateOutput { dry_run, stats });
}
