//! .tmfp file reader

use crate::format::{FpFile, FpFormatError, FpHeader, FpMetadata, HEADER_SIZE, MAGIC, VERSION};
use crate::writer::CRC64;
use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

pub struct FpReader;

impl FpReader {
    /// Read .tmfp file
    pub fn read(path: &Path) -> Result<FpFile> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open .tmfp file: {}", path.display()))?;

        // SAFETY: catalog files are written once and never modified in place.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .with_context(|| format!("Failed to map .tmfp file: {}", path.display()))?;

        Self::decode(&mmap).with_context(|| format!("Invalid .tmfp file: {}", path.display()))
    }

    /// Decode a .tmfp file from bytes
    pub fn decode(bytes: &[u8]) -> Result<FpFile> {
        let header = Self::read_header(bytes)?;

        if header.magic != MAGIC {
            return Err(FpFormatError::BadMagic.into());
        }
        if header.version != VERSION {
            return Err(FpFormatError::UnsupportedVersion(header.version).into());
        }

        let metadata_end = section_end(bytes, HEADER_SIZE, header.metadata_size)?;
        let payload_end = section_end(bytes, metadata_end, header.stored_payload_size())?;

        let metadata: FpMetadata = serde_json::from_slice(&bytes[HEADER_SIZE..metadata_end])
            .context("Failed to parse .tmfp metadata")?;

        let stored = &bytes[metadata_end..payload_end];
        let payload = if header.is_compressed() {
            zstd::decode_all(stored).context("Failed to decompress fingerprint payload")?
        } else {
            stored.to_vec()
        };

        let fingerprint = Self::read_fingerprint(&payload, &header)?;

        Ok(FpFile {
            header,
            metadata,
            fingerprint,
        })
    }

    fn read_header(bytes: &[u8]) -> Result<FpHeader> {
        ensure_len(bytes, HEADER_SIZE)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);

        Ok(FpHeader {
            magic,
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            metadata_size: read_u64(bytes, 8),
            payload_size: read_u64(bytes, 16),
            payload_size_compressed: read_u64(bytes, 24),
            num_sub_fingerprints: read_u32(bytes, 32),
            reserved: read_u32(bytes, 36),
            checksum: read_u64(bytes, 40),
        })
    }

    fn read_fingerprint(payload: &[u8], header: &FpHeader) -> Result<Vec<u32>> {
        if payload.len() % 4 != 0 {
            return Err(FpFormatError::MisalignedPayload(payload.len()).into());
        }
        let expected = header.num_sub_fingerprints as usize * 4;
        if payload.len() != expected {
            return Err(FpFormatError::Truncated {
                needed: expected,
                available: payload.len(),
            }
            .into());
        }

        let actual = CRC64.checksum(payload);
        if actual != header.checksum {
            return Err(FpFormatError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            }
            .into());
        }

        Ok(payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), FpFormatError> {
    if bytes.len() < needed {
        return Err(FpFormatError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

/// End offset of a section of `size` bytes starting at `start`; sizes come from the
/// header and must not be trusted
fn section_end(bytes: &[u8], start: usize, size: u64) -> Result<usize, FpFormatError> {
    let end = usize::try_from(size)
        .ok()
        .and_then(|size| start.checked_add(size))
        .ok_or(FpFormatError::Truncated {
            needed: usize::MAX,
            available: bytes.len(),
        })?;
    ensure_len(bytes, end)?;
    Ok(end)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
