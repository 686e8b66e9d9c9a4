//! Chromaprint fingerprint extraction
//!
//! Audio is optionally normalised to mono 16 kHz WAV with `ffmpeg`, then passed to
//! `fpcalc -raw -json`. Both tools must be installed; their paths are configurable.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::ExtractionError;
use crate::settings::ExtractionConfig;
use crate::similarity::mask_sub_fingerprint;

/// Produces a sub-fingerprint sequence for an audio file
#[async_trait]
pub trait FingerprintExtractor: Send + Sync {
    /// The result may be empty for very short or silent input.
    async fn extract(&self, path: &Path) -> Result<Vec<u32>, ExtractionError>;
}

/// Raw `fpcalc -json` output
#[derive(Debug, Clone, Deserialize)]
pub struct FpcalcOutput {
    #[serde(default)]
    pub duration: f64,
    /// Signed or unsigned depending on the Chromaprint build
    #[serde(default)]
    pub fingerprint: Vec<i64>,
}

impl FpcalcOutput {
    pub fn sub_fingerprints(&self) -> Vec<u32> {
        self.fingerprint
            .iter()
            .map(|&v| mask_sub_fingerprint(v))
            .collect()
    }
}

pub fn parse_fpcalc_output(stdout: &str) -> serde_json::Result<FpcalcOutput> {
    serde_json::from_str(stdout)
}

/// Extractor backed by the `ffmpeg` and `fpcalc` command-line tools
#[derive(Debug, Clone)]
pub struct FpcalcExtractor {
    config: ExtractionConfig,
}

impl FpcalcExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Override whether input is resampled with ffmpeg before fingerprinting
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.config.normalize = normalize;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Check that fpcalc (and ffmpeg, when normalising) can be executed
    pub async fn is_available(&self) -> bool {
        let fpcalc = probe(&self.config.fpcalc_path, "-version").await;
        if !self.config.normalize {
            return fpcalc;
        }
        fpcalc && probe(&self.config.ffmpeg_path, "-version").await
    }

    async fn normalize(&self, input: &Path, dir: &Path) -> Result<PathBuf, ExtractionError> {
        let output_path = dir.join("normalized.wav");

        log::debug!(
            "Normalising {} to {} Hz, {} channel(s)",
            input.display(),
            self.config.sample_rate,
            self.config.channels
        );

        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-ac")
            .arg(self.config.channels.to_string())
            .arg("-ar")
            .arg(self.config.sample_rate.to_string())
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ExtractionError::new(input, format!("failed to run {}: {}", self.config.ffmpeg_path, e))
            })?;

        if !output.status.success() {
            return Err(ExtractionError::new(
                input,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    last_line(&output.stderr)
                ),
            ));
        }

        Ok(output_path)
    }

    async fn run_fpcalc(&self, audio: &Path, reported: &Path) -> Result<Vec<u32>, ExtractionError> {
        let output = Command::new(&self.config.fpcalc_path)
            .arg("-raw")
            .arg("-json")
            .arg(audio)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ExtractionError::new(reported, format!("failed to run {}: {}", self.config.fpcalc_path, e))
            })?;

        if !output.status.success() {
            return Err(ExtractionError::new(
                reported,
                format!(
                    "fpcalc exited with {}: {}",
                    output.status,
                    last_line(&output.stderr)
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_fpcalc_output(&stdout)
            .map_err(|e| ExtractionError::new(reported, format!("invalid fpcalc output: {}", e)))?;

        log::debug!(
            "{}: {} sub-fingerprints over {:.1}s",
            reported.display(),
            parsed.fingerprint.len(),
            parsed.duration
        );

        Ok(parsed.sub_fingerprints())
    }
}

#[async_trait]
impl FingerprintExtractor for FpcalcExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<u32>, ExtractionError> {
        if !path.is_file() {
            return Err(ExtractionError::new(path, "file not found"));
        }

        if !self.config.normalize {
            return self.run_fpcalc(path, path).await;
        }

        // Removed when dropped, whatever the outcome
        let workdir = tempfile::Builder::new()
            .prefix("tunematch-")
            .tempdir()
            .map_err(|e| ExtractionError::new(path, format!("failed to create temp dir: {}", e)))?;

        let normalized = self.normalize(path, workdir.path()).await?;
        self.run_fpcalc(&normalized, path).await
    }
}

async fn probe(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
