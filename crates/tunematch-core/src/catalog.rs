//! In-memory catalog entries

use serde::{Deserialize, Serialize};
use tunematch_fp::SongRecord;

/// Opaque song metadata, passed through to match results unchanged
pub type SongMetadata = serde_json::Map<String, serde_json::Value>;

/// One reference song as seen by the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub metadata: SongMetadata,
    /// May be empty; such entries are skipped during matching
    pub fingerprint: Vec<u32>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, metadata: SongMetadata, fingerprint: Vec<u32>) -> Self {
        Self {
            id: id.into(),
            metadata,
            fingerprint,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }
}

impl From<SongRecord> for CatalogEntry {
    fn from(record: SongRecord) -> Self {
        Self {
            id: record.id,
            metadata: record.meta,
            fingerprint: record.fingerprint,
        }
    }
}
