//! TOML configuration for the tunematch tools
//!
//! Selects the catalog storage backend (filesystem vs PostgreSQL) and carries the
//! matching, extraction, ingestion and metadata-service settings. Credentials for
//! external services are read from environment variables named here, never from
//! the file itself.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::MatchConfig;
use tunematch_fp::RecordFormat;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TuneMatchConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    #[serde(default)]
    pub postgresql: PostgresqlConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Filesystem,
    Postgresql,
}

/// Filesystem backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemConfig {
    #[serde(default = "default_base_directory")]
    pub base_directory: String,
    #[serde(default)]
    pub format: FileFormat,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            format: FileFormat::default(),
        }
    }
}

fn default_base_directory() -> String {
    "./catalog".to_string()
}

/// Record format for filesystem storage
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    Bson,
    Binary,
    /// Read any format; write JSON
    #[default]
    Auto,
}

impl FileFormat {
    /// Format used when writing new records
    pub fn write_format(&self) -> RecordFormat {
        match self {
            FileFormat::Json | FileFormat::Auto => RecordFormat::Json,
            FileFormat::Bson => RecordFormat::Bson,
            FileFormat::Binary => RecordFormat::Binary,
        }
    }

    /// Whether a record file in `format` is part of the catalog
    pub fn accepts(&self, format: RecordFormat) -> bool {
        match self {
            FileFormat::Auto => true,
            other => other.write_format() == format,
        }
    }
}

/// PostgreSQL backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresqlConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "tunematch".to_string()
}
fn default_user() -> String {
    "tunematch_user".to_string()
}
fn default_password() -> String {
    "tunematch_pass".to_string()
}
fn default_max_connections() -> u32 {
    10
}

/// External tools used to fingerprint audio
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    pub fpcalc_path: String,
    pub ffmpeg_path: String,
    /// Target rate for normalisation
    pub sample_rate: u32,
    pub channels: u16,
    /// Resample with ffmpeg before fingerprinting
    pub normalize: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fpcalc_path: "fpcalc".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 16000,
            channels: 1,
            normalize: true,
        }
    }
}

/// Backend used to find and download reference audio
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    #[serde(rename = "yt-dlp")]
    YtDlp,
}

/// Add-song ingestion settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub source: SourceKind,
    pub yt_dlp_path: String,
    pub download_dir: String,
    /// Skip candidates longer than this many seconds
    pub max_audio_duration_s: Option<u64>,
    /// Cookie file handed to yt-dlp, written at startup from `cookie_env`
    pub cookie_file: Option<String>,
    pub cookie_env: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::YtDlp,
            yt_dlp_path: "yt-dlp".to_string(),
            download_dir: "./downloads".to_string(),
            max_audio_duration_s: None,
            cookie_file: None,
            cookie_env: "YTDLP_COOKIES".to_string(),
        }
    }
}

/// Names of the environment variables holding the metadata-service credentials
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id_env: String,
    pub client_secret_env: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id_env: "SPOTIFY_CLIENT_ID".to_string(),
            client_secret_env: "SPOTIFY_CLIENT_SECRET".to_string(),
        }
    }
}

impl TuneMatchConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TuneMatchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.matching.validate().context("Invalid [matching] section")?;
        if self.extraction.sample_rate == 0 || self.extraction.channels == 0 {
            anyhow::bail!("Invalid [extraction] section: sample_rate and channels must be > 0");
        }
        Ok(())
    }

    /// Get PostgreSQL connection string
    pub fn connection_string(&self) -> Option<String> {
        match self.storage.backend {
            BackendKind::Postgresql => {
                let pg = &self.storage.postgresql;
                Some(format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    pg.user, pg.password, pg.host, pg.port, pg.database
                ))
            }
            BackendKind::Filesystem => None,
        }
    }

    /// Create a default filesystem configuration
    pub fn default_filesystem() -> Self {
        Self::with_backend(BackendKind::Filesystem)
    }

    /// Create a default PostgreSQL configuration
    pub fn default_postgresql() -> Self {
        Self::with_backend(BackendKind::Postgresql)
    }

    fn with_backend(backend: BackendKind) -> Self {
        Self {
            storage: StorageConfig {
                backend,
                filesystem: FilesystemConfig::default(),
                postgresql: PostgresqlConfig::default(),
            },
            matching: MatchConfig::default(),
            extraction: ExtractionConfig::default(),
            ingest: IngestConfig::default(),
            spotify: SpotifyConfig::default(),
        }
    }
}
