//! .tmfp file format structures

use serde::{Deserialize, Serialize};

use crate::json_format::{SongRecord, RECORD_VERSION};

/// Magic bytes for .tmfp files: "TMFP"
pub const MAGIC: [u8; 4] = [0x54, 0x4D, 0x46, 0x50];

/// Current format version
pub const VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 48;

/// Flag bit: payload is zstd compressed
pub const FLAG_COMPRESSED: u16 = 0x1;

/// Errors raised while decoding a .tmfp file
#[derive(Debug, thiserror::Error)]
pub enum FpFormatError {
    #[error("invalid .tmfp file: magic bytes mismatch")]
    BadMagic,
    #[error("unsupported .tmfp version {0}")]
    UnsupportedVersion(u16),
    #[error("truncated .tmfp file: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("payload checksum mismatch: header {expected:#018x}, computed {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("payload size {0} is not a multiple of 4")]
    MisalignedPayload(usize),
}

/// File header (48 bytes fixed size, little-endian)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpHeader {
    /// Magic bytes: "TMFP"
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Flags (bit 0: compressed)
    pub flags: u16,
    /// Size of metadata section
    pub metadata_size: u64,
    /// Size of payload (uncompressed)
    pub payload_size: u64,
    /// Compressed payload size (0 if uncompressed)
    pub payload_size_compressed: u64,
    /// Number of sub-fingerprints
    pub num_sub_fingerprints: u32,
    /// Reserved
    pub reserved: u32,
    /// CRC-64 of the uncompressed payload
    pub checksum: u64,
}

impl FpHeader {
    pub fn new(metadata_size: u64, num_sub_fingerprints: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            metadata_size,
            payload_size: num_sub_fingerprints as u64 * 4,
            payload_size_compressed: 0,
            num_sub_fingerprints,
            reserved: 0,
            checksum: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        (self.flags & FLAG_COMPRESSED) != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= FLAG_COMPRESSED;
        } else {
            self.flags &= !FLAG_COMPRESSED;
        }
    }

    /// Bytes of payload actually stored on disk
    pub fn stored_payload_size(&self) -> u64 {
        if self.is_compressed() {
            self.payload_size_compressed
        } else {
            self.payload_size
        }
    }
}

/// Metadata section, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpMetadata {
    pub id: String,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    pub created_at: String,
}

/// Complete .tmfp file structure
#[derive(Debug, Clone, PartialEq)]
pub struct FpFile {
    pub header: FpHeader,
    pub metadata: FpMetadata,
    pub fingerprint: Vec<u32>,
}

impl From<SongRecord> for FpFile {
    fn from(record: SongRecord) -> Self {
        let metadata = FpMetadata {
            id: record.id,
            meta: record.meta,
            source_url: record.source_url,
            audio_file: record.audio_file,
            created_at: record.created_at,
        };
        // Sizes are finalised by the writer
        let header = FpHeader::new(0, record.fingerprint.len() as u32);
        Self {
            header,
            metadata,
            fingerprint: record.fingerprint,
        }
    }
}

impl From<FpFile> for SongRecord {
    fn from(file: FpFile) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            id: file.metadata.id,
            meta: file.metadata.meta,
            source_url: file.metadata.source_url,
            audio_file: file.metadata.audio_file,
            created_at: file.metadata.created_at,
            fingerprint: file.fingerprint,
        }
    }
}
