//! JSON / BSON format for catalog records
//!
//! One file per song. The JSON layout is the canonical one; BSON and the binary
//! `.tmfp` layout carry the same fields.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::format::{FpFile, MAGIC};
use crate::reader::FpReader;
use crate::writer::FpWriter;

/// Current record layout version
pub const RECORD_VERSION: &str = "1.0";

/// Complete catalog record for one song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub version: String,
    pub id: String,
    /// Opaque song metadata (title, artist, album, ...)
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Where the reference audio was acquired from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Stored audio blob, relative to the catalog directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    pub created_at: String,
    /// Chromaprint sub-fingerprints, in temporal order
    #[serde(default, deserialize_with = "deserialize_sub_fingerprints")]
    pub fingerprint: Vec<u32>,
}

/// Mask a signed or wider value to its 32-bit sub-fingerprint pattern
#[inline]
pub fn mask_sub_fingerprint(value: i64) -> u32 {
    (value & 0xFFFF_FFFF) as u32
}

/// Older Chromaprint builds print signed values; both encodings map to the same bits
fn deserialize_sub_fingerprints<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<i64>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(mask_sub_fingerprint).collect())
}

/// On-disk encoding of a [`SongRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Bson,
    Binary,
}

impl RecordFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordFormat::Json => "json",
            RecordFormat::Bson => "bson",
            RecordFormat::Binary => "tmfp",
        }
    }

    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(RecordFormat::Json),
            Some("bson") => Some(RecordFormat::Bson),
            Some("tmfp") => Some(RecordFormat::Binary),
            _ => None,
        }
    }

    /// Sniff format from the leading bytes of a file
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&MAGIC) {
            return RecordFormat::Binary;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => RecordFormat::Json,
            _ => RecordFormat::Bson,
        }
    }
}

impl SongRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        id: String,
        meta: serde_json::Map<String, serde_json::Value>,
        fingerprint: Vec<u32>,
    ) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            id,
            meta,
            source_url: None,
            audio_file: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            fingerprint,
        }
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    pub fn with_audio_file(mut self, audio_file: impl Into<String>) -> Self {
        self.audio_file = Some(audio_file.into());
        self
    }

    /// Save to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json_str = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_str)
            .with_context(|| format!("Failed to write record: {}", path.display()))?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record: {}", path.display()))?;
        let record: SongRecord = serde_json::from_str(&json_str)
            .with_context(|| format!("Invalid JSON record: {}", path.display()))?;
        Ok(record)
    }

    /// Save to BSON file
    pub fn save_bson(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = bson::to_vec(self)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write record: {}", path.display()))?;
        Ok(())
    }

    /// Load from BSON file
    pub fn load_bson(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read record: {}", path.display()))?;
        let record: SongRecord = bson::from_slice(&bytes)
            .with_context(|| format!("Invalid BSON record: {}", path.display()))?;
        Ok(record)
    }

    /// Save to compact binary file
    pub fn save_binary(&self, path: &Path) -> anyhow::Result<()> {
        FpWriter::new().write(path, &FpFile::from(self.clone()))
    }

    /// Load from compact binary file
    pub fn load_binary(path: &Path) -> anyhow::Result<Self> {
        Ok(FpReader::read(path)?.into())
    }

    /// Save in the given format
    pub fn save_as(&self, path: &Path, format: RecordFormat) -> anyhow::Result<()> {
        match format {
            RecordFormat::Json => self.save(path),
            RecordFormat::Bson => self.save_bson(path),
            RecordFormat::Binary => self.save_binary(path),
        }
    }

    /// Load a record, detecting the format from the extension or the file contents
    pub fn load_auto(path: &Path) -> anyhow::Result<Self> {
        let format = match RecordFormat::from_path(path) {
            Some(format) => format,
            None => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read record: {}", path.display()))?;
                RecordFormat::sniff(&bytes)
            }
        };
        match format {
            RecordFormat::Json => Self::load(path),
            RecordFormat::Bson => Self::load_bson(path),
            RecordFormat::Binary => Self::load_binary(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> SongRecord {
        let meta = json!({
            "title": "Hey Jude",
            "artist": "The Beatles",
            "duration_ms": 431333,
        });
        SongRecord::new(
            "hey-jude".to_string(),
            meta.as_object().cloned().unwrap(),
            vec![0, 1, 0xFFFF_FFFF, 0x8000_0000, 12345],
        )
        .with_source_url("https://www.youtube.com/watch?v=A_MjCqQoLLA")
    }

    #[test]
    fn test_json_and_bson_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();

        let json_path = dir.path().join("hey-jude.json");
        record.save(&json_path).unwrap();
        assert_eq!(SongRecord::load_auto(&json_path).unwrap(), record);

        let bson_path = dir.path().join("hey-jude.bson");
        record.save_bson(&bson_path).unwrap();
        let loaded = SongRecord::load_auto(&bson_path).unwrap();
        assert_eq!(loaded.fingerprint, record.fingerprint);
        assert_eq!(loaded.meta["title"], "Hey Jude");
    }

    #[test]
    fn test_load_auto_sniffs_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.dat");
        sample_record().save(&path).unwrap();

        let loaded = SongRecord::load_auto(&path).unwrap();
        assert_eq!(loaded.id, "hey-jude");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let record: SongRecord = serde_json::from_str(
            r#"{"version": "1.0", "id": "x", "created_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(record.fingerprint.is_empty());
        assert!(record.meta.is_empty());
        assert!(record.source_url.is_none());
    }

    #[test]
    fn test_signed_sub_fingerprints_are_masked() {
        let record: SongRecord = serde_json::from_str(
            r#"{
                "version": "1.0",
                "id": "signed",
                "created_at": "2024-01-01T00:00:00Z",
                "fingerprint": [-1, -2147483648, 7, 4294967295]
            }"#,
        )
        .unwrap();
        assert_eq!(
            record.fingerprint,
            vec![0xFFFF_FFFF, 0x8000_0000, 7, 0xFFFF_FFFF]
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signed.bson");
        record.save_bson(&path).unwrap();
        assert_eq!(SongRecord::load_bson(&path).unwrap().fingerprint, record.fingerprint);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(RecordFormat::sniff(b"TMFP\x01\x00"), RecordFormat::Binary);
        assert_eq!(RecordFormat::sniff(b"  \n{\"id\": 1}"), RecordFormat::Json);
        assert_eq!(RecordFormat::sniff(&[0x16, 0, 0, 0]), RecordFormat::Bson);
    }
}
