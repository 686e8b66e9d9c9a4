//! .tmfp file writer

use crate::format::{FpFile, FpHeader, HEADER_SIZE};
use anyhow::{Context, Result};
use crc::{Crc, CRC_64_ECMA_182};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub(crate) const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Sub-fingerprint payloads shorter than this are stored raw
const MIN_COMPRESS_BYTES: usize = 256;

pub struct FpWriter {
    compress: bool,
    level: i32,
}

impl FpWriter {
    pub fn new() -> Self {
        Self {
            compress: true,
            level: 3,
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Write .tmfp file
    pub fn write(&self, path: &Path, fp_file: &FpFile) -> Result<()> {
        let bytes = self.encode(fp_file)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create .tmfp file: {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;

        Ok(())
    }

    /// Encode a file into its on-disk bytes
    pub fn encode(&self, fp_file: &FpFile) -> Result<Vec<u8>> {
        let metadata_json = serde_json::to_vec(&fp_file.metadata)?;

        let mut payload = Vec::with_capacity(fp_file.fingerprint.len() * 4);
        for sub in &fp_file.fingerprint {
            payload.extend_from_slice(&sub.to_le_bytes());
        }

        let mut header = FpHeader::new(metadata_json.len() as u64, fp_file.fingerprint.len() as u32);
        header.checksum = CRC64.checksum(&payload);

        let stored = if self.compress && payload.len() >= MIN_COMPRESS_BYTES {
            let compressed = zstd::encode_all(&payload[..], self.level)
                .context("Failed to compress fingerprint payload")?;
            header.set_compressed(true);
            header.payload_size_compressed = compressed.len() as u64;
            compressed
        } else {
            payload
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + metadata_json.len() + stored.len());
        write_header(&mut out, &header);
        out.extend_from_slice(&metadata_json);
        out.extend_from_slice(&stored);

        Ok(out)
    }
}

fn write_header(out: &mut Vec<u8>, header: &FpHeader) {
    out.extend_from_slice(&header.magic);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.flags.to_le_bytes());
    out.extend_from_slice(&header.metadata_size.to_le_bytes());
    out.extend_from_slice(&header.payload_size.to_le_bytes());
    out.extend_from_slice(&header.payload_size_compressed.to_le_bytes());
    out.extend_from_slice(&header.num_sub_fingerprints.to_le_bytes());
    out.extend_from_slice(&header.reserved.to_le_bytes());
    out.extend_from_slice(&header.checksum.to_le_bytes());
}

impl Default for FpWriter {
    fn default() -> Self {
        Self::new()
    }
}
