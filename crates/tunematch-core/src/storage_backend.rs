//! Catalog storage trait and implementations
//!
//! Provides one interface over the filesystem catalog (one record file per song,
//! reference audio under `audio/`) and the PostgreSQL catalog.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::catalog::{CatalogEntry, SongMetadata};
use crate::settings::{BackendKind, FileFormat, FilesystemConfig, PostgresqlConfig, StorageConfig};
use tunematch_fp::{RecordFormat, SongRecord};

/// Bytes returned per [`AudioStream::next_chunk`] call
pub const AUDIO_CHUNK_SIZE: usize = 256 * 1024;

/// Reference audio to store alongside a new song
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    /// Read a downloaded file, inferring its content type from the extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read audio file: {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();
        Ok(Self {
            content_type: content_type_for(path).to_string(),
            filename,
            bytes,
        })
    }
}

/// A song to add to the catalog
#[derive(Debug, Clone)]
pub struct NewSong {
    /// Stable catalog identifier (`[A-Za-z0-9_-]+`)
    pub id: String,
    pub metadata: SongMetadata,
    pub fingerprint: Vec<u32>,
    pub source_url: Option<String>,
    pub audio: Option<AudioUpload>,
}

/// Stored description of a reference audio blob
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// A catalog song as stored, including bookkeeping fields
#[derive(Debug, Clone)]
pub struct StoredSong {
    pub entry: CatalogEntry,
    pub source_url: Option<String>,
    pub created_at: String,
    pub audio: Option<AudioInfo>,
}

enum AudioSource {
    File(tokio::fs::File),
    Postgres {
        pool: deadpool_postgres::Pool,
        audio_id: i32,
        offset: i64,
    },
}

/// Chunked reader over a stored reference audio blob
pub struct AudioStream {
    pub info: AudioInfo,
    source: AudioSource,
}

impl AudioStream {
    /// Next chunk of at most [`AUDIO_CHUNK_SIZE`] bytes, `None` at the end
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.source {
            AudioSource::File(file) => {
                let mut buf = vec![0u8; AUDIO_CHUNK_SIZE];
                let n = file.read(&mut buf).await.context("Failed to read audio file")?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            AudioSource::Postgres {
                pool,
                audio_id,
                offset,
            } => {
                if *offset as u64 >= self.info.size {
                    return Ok(None);
                }
                let chunk =
                    tunematch_db::read_audio_chunk(pool, *audio_id, *offset, AUDIO_CHUNK_SIZE as i32)
                        .await?;
                if chunk.is_empty() {
                    return Ok(None);
                }
                *offset += chunk.len() as i64;
                Ok(Some(chunk))
            }
        }
    }

    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.info.size as usize);
        while let Some(chunk) = self.next_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

/// Abstract catalog store
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Snapshot of every song, in a stable order
    async fn load_catalog(&self) -> Result<Vec<CatalogEntry>>;

    /// Add a song, returning its identifier. Fails if the id is taken.
    async fn save_song(&self, song: NewSong) -> Result<String>;

    async fn get_song(&self, id: &str) -> Result<Option<StoredSong>>;

    /// Open the reference audio of a song, if it has any
    async fn open_audio(&self, id: &str) -> Result<Option<AudioStream>>;

    async fn song_ids(&self) -> Result<Vec<String>>;
}

/// Content type for an audio file, from its extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("m4a") | Some("mp4") | Some("aac") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// Catalog identifiers double as file names
pub fn validate_song_id(id: &str) -> Result<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!("Invalid song id {:?}: only [A-Za-z0-9_-] allowed", id);
    }
    Ok(())
}

fn metadata_from_value(value: serde_json::Value) -> SongMetadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => SongMetadata::new(),
    }
}

/// Filesystem-based catalog
pub struct FilesystemBackend {
    base_dir: PathBuf,
    format: FileFormat,
}

impl FilesystemBackend {
    /// Create a new filesystem backend
    pub fn new(config: &FilesystemConfig) -> Self {
        Self::from_path(&config.base_directory, config.format)
    }

    /// Create from directory path and format
    pub fn from_path(base_dir: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            base_dir: base_dir.into(),
            format,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn audio_dir(&self) -> PathBuf {
        self.base_dir.join("audio")
    }

    /// Record files belonging to the catalog, sorted by file name
    fn record_files(&self) -> Result<Vec<(PathBuf, RecordFormat)>> {
        if !self.base_dir.exists() {
            log::warn!("Catalog directory {} does not exist", self.base_dir.display());
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.base_dir).with_context(|| {
            format!("Failed to read catalog directory: {}", self.base_dir.display())
        })?;

        let mut files: Vec<(PathBuf, RecordFormat)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| RecordFormat::from_path(&path).map(|f| (path, f)))
            .filter(|(_, format)| self.format.accepts(*format))
            .collect();

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Find the record file for `id`, in any accepted format
    fn find_record(&self, id: &str) -> Option<PathBuf> {
        [RecordFormat::Json, RecordFormat::Bson, RecordFormat::Binary]
            .into_iter()
            .filter(|f| self.format.accepts(*f))
            .map(|f| self.base_dir.join(format!("{}.{}", id, f.extension())))
            .find(|p| p.is_file())
    }

    fn load_record(&self, id: &str) -> Result<Option<SongRecord>> {
        validate_song_id(id)?;
        match self.find_record(id) {
            Some(path) => Ok(Some(SongRecord::load_auto(&path)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CatalogStore for FilesystemBackend {
    async fn load_catalog(&self) -> Result<Vec<CatalogEntry>> {
        use rayon::prelude::*;

        let files = self.record_files()?;

        // Load all files in parallel; collect keeps the sorted order
        let entries: Vec<CatalogEntry> = files
            .par_iter()
            .filter_map(|(path, _)| match SongRecord::load_auto(path) {
                Ok(record) => Some(CatalogEntry::from(record)),
                Err(e) => {
                    log::warn!("Failed to load {}: {:#}", path.display(), e);
                    None
                }
            })
            .collect();

        log::info!(
            "Loaded {} songs from {}",
            entries.len(),
            self.base_dir.display()
        );
        Ok(entries)
    }

    async fn save_song(&self, song: NewSong) -> Result<String> {
        validate_song_id(&song.id)?;
        if let Some(existing) = self.find_record(&song.id) {
            anyhow::bail!(
                "Song {} already exists: {}",
                song.id,
                existing.display()
            );
        }

        std::fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create catalog directory: {}", self.base_dir.display())
        })?;

        let mut record = SongRecord::new(song.id.clone(), song.metadata, song.fingerprint);
        if let Some(url) = song.source_url {
            record = record.with_source_url(url);
        }

        let mut audio_path = None;
        if let Some(audio) = song.audio {
            let ext = Path::new(&audio.filename)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin");
            let name = format!("{}.{}", song.id, ext);
            let audio_dir = self.audio_dir();
            std::fs::create_dir_all(&audio_dir)?;
            let blob = audio_dir.join(&name);
            std::fs::write(&blob, &audio.bytes)
                .with_context(|| format!("Failed to store audio for {}", song.id))?;
            audio_path = Some(blob);
            record = record.with_audio_file(format!("audio/{}", name));
        }

        let format = self.format.write_format();
        let path = self
            .base_dir
            .join(format!("{}.{}", song.id, format.extension()));
        if let Err(e) = record.save_as(&path, format) {
            // A blob without a record is unreachable
            if let Some(blob) = &audio_path {
                if let Err(rm) = std::fs::remove_file(blob) {
                    log::warn!("Failed to remove {}: {}", blob.display(), rm);
                }
            }
            return Err(e);
        }

        log::info!("Saved {} to {}", song.id, path.display());
        Ok(song.id)
    }

    async fn get_song(&self, id: &str) -> Result<Option<StoredSong>> {
        let Some(record) = self.load_record(id)? else {
            return Ok(None);
        };

        let audio = match &record.audio_file {
            Some(rel) => {
                let path = self.base_dir.join(rel);
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                Some(AudioInfo {
                    filename: path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or(rel.as_str())
                        .to_string(),
                    content_type: content_type_for(&path).to_string(),
                    size,
                })
            }
            None => None,
        };

        Ok(Some(StoredSong {
            source_url: record.source_url.clone(),
            created_at: record.created_at.clone(),
            entry: CatalogEntry::from(record),
            audio,
        }))
    }

    async fn open_audio(&self, id: &str) -> Result<Option<AudioStream>> {
        let Some(song) = self.get_song(id).await? else {
            return Ok(None);
        };
        let Some(info) = song.audio else {
            return Ok(None);
        };

        let path = self.audio_dir().join(&info.filename);
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open audio: {}", path.display()))?;

        Ok(Some(AudioStream {
            info,
            source: AudioSource::File(file),
        }))
    }

    async fn song_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .record_files()?
            .iter()
            .filter_map(|(path, _)| path.file_stem().and_then(|s| s.to_str()))
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// PostgreSQL-based catalog
pub struct PostgresqlBackend {
    pool: deadpool_postgres::Pool,
}

impl PostgresqlBackend {
    /// Connect, verify the connection and apply the schema
    pub async fn new(config: &PostgresqlConfig) -> Result<Self> {
        let pool = tunematch_db::create_pool(
            &config.host,
            config.port,
            &config.database,
            &config.user,
            &config.password,
            config.max_connections,
        )?;

        tunematch_db::test_connection(&pool)
            .await
            .with_context(|| format!("Cannot reach PostgreSQL at {}:{}", config.host, config.port))?;
        tunematch_db::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn audio_info(&self, audio_id: i32) -> Result<Option<AudioInfo>> {
        Ok(tunematch_db::get_audio_blob_info(&self.pool, audio_id)
            .await?
            .map(|blob| AudioInfo {
                filename: blob.filename,
                content_type: blob.content_type,
                size: blob.size.max(0) as u64,
            }))
    }
}

#[async_trait]
impl CatalogStore for PostgresqlBackend {
    async fn load_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let songs = tunematch_db::get_all_songs(&self.pool).await?;

        let entries: Vec<CatalogEntry> = songs
            .into_iter()
            .map(|song| {
                let fingerprint = song.sub_fingerprints();
                CatalogEntry::new(song.catalog_id, metadata_from_value(song.meta), fingerprint)
            })
            .collect();

        log::info!("Loaded {} songs from PostgreSQL", entries.len());
        Ok(entries)
    }

    async fn save_song(&self, song: NewSong) -> Result<String> {
        validate_song_id(&song.id)?;
        if tunematch_db::get_song_by_catalog_id(&self.pool, &song.id)
            .await?
            .is_some()
        {
            anyhow::bail!("Song {} already exists", song.id);
        }

        let audio_id = match song.audio {
            Some(audio) => Some(
                tunematch_db::insert_audio_blob(
                    &self.pool,
                    &tunematch_db::NewAudioBlob {
                        filename: audio.filename,
                        content_type: audio.content_type,
                        data: audio.bytes,
                    },
                )
                .await?,
            ),
            None => None,
        };

        let row = tunematch_db::NewSong::from_sub_fingerprints(
            song.id.clone(),
            serde_json::Value::Object(song.metadata),
            song.source_url,
            &song.fingerprint,
            audio_id,
        );
        let db_id = tunematch_db::insert_song(&self.pool, &row).await?;

        log::info!("Saved {} (row {})", song.id, db_id);
        Ok(song.id)
    }

    async fn get_song(&self, id: &str) -> Result<Option<StoredSong>> {
        let Some(song) = tunematch_db::get_song_by_catalog_id(&self.pool, id).await? else {
            return Ok(None);
        };

        let audio = match song.audio_id {
            Some(audio_id) => self.audio_info(audio_id).await?,
            None => None,
        };
        let fingerprint = song.sub_fingerprints();

        Ok(Some(StoredSong {
            entry: CatalogEntry::new(song.catalog_id, metadata_from_value(song.meta), fingerprint),
            source_url: song.source_url,
            created_at: song.created_at.to_rfc3339(),
            audio,
        }))
    }

    async fn open_audio(&self, id: &str) -> Result<Option<AudioStream>> {
        let Some(song) = tunematch_db::get_song_by_catalog_id(&self.pool, id).await? else {
            return Ok(None);
        };
        let Some(audio_id) = song.audio_id else {
            return Ok(None);
        };
        let Some(info) = self.audio_info(audio_id).await? else {
            return Ok(None);
        };

        Ok(Some(AudioStream {
            info,
            source: AudioSource::Postgres {
                pool: self.pool.clone(),
                audio_id,
                offset: 0,
            },
        }))
    }

    async fn song_ids(&self) -> Result<Vec<String>> {
        Ok(tunematch_db::get_song_summaries(&self.pool)
            .await?
            .into_iter()
            .map(|s| s.catalog_id)
            .collect())
    }
}

/// Open the catalog store selected by the configuration
pub async fn create_backend(config: &StorageConfig) -> Result<Box<dyn CatalogStore>> {
    match config.backend {
        BackendKind::Filesystem => Ok(Box::new(FilesystemBackend::new(&config.filesystem))),
        BackendKind::Postgresql => Ok(Box::new(PostgresqlBackend::new(&config.postgresql).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn song(id: &str, title: &str, fingerprint: Vec<u32>) -> NewSong {
        let mut metadata = SongMetadata::new();
        metadata.insert("title".to_string(), json!(title));
        NewSong {
            id: id.to_string(),
            metadata,
            fingerprint,
            source_url: None,
            audio: None,
        }
    }

    #[test]
    fn test_create_filesystem_backend() {
        let config = FilesystemConfig {
            base_directory: "./test_db".to_string(),
            format: FileFormat::Bson,
        };
        let backend = FilesystemBackend::new(&config);
        assert_eq!(backend.base_dir, PathBuf::from("./test_db"));
        assert_eq!(backend.format, FileFormat::Bson);
    }

    #[test]
    fn test_validate_song_id() {
        assert!(validate_song_id("spotify-4uLU6hMCjMI75M1A2tKUQC").is_ok());
        assert!(validate_song_id("a_b").is_ok());
        assert!(validate_song_id("").is_err());
        assert!(validate_song_id("../etc/passwd").is_err());
        assert!(validate_song_id("with space").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("x.m4a")), "audio/mp4");
        assert_eq!(content_type_for(Path::new("x.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("x")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_catalog_round_trip_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path(), FileFormat::Auto);

        for (id, title) in [("c", "Third"), ("a", "First"), ("b", "Second")] {
            store.save_song(song(id, title, vec![1, 2, 3])).await.unwrap();
        }

        let catalog = store.load_catalog().await.unwrap();
        let titles: Vec<_> = catalog.iter().filter_map(|e| e.title()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
        assert_eq!(store.song_ids().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_ids_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path(), FileFormat::Binary);

        store.save_song(song("dup", "One", vec![7])).await.unwrap();
        assert!(store.save_song(song("dup", "Two", vec![8])).await.is_err());
        assert!(store.save_song(song("no/slash", "Bad", vec![])).await.is_err());
        assert!(dir.path().join("dup.tmfp").exists());
    }

    #[tokio::test]
    async fn test_unreadable_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path(), FileFormat::Auto);

        store.save_song(song("good", "Good", vec![1])).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        // Header claims a metadata section of u64::MAX bytes
        let mut header = vec![0u8; tunematch_fp::HEADER_SIZE];
        header[0..4].copy_from_slice(&tunematch_fp::MAGIC);
        header[4..6].copy_from_slice(&tunematch_fp::VERSION.to_le_bytes());
        header[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(dir.path().join("bad.tmfp"), header).unwrap();

        let catalog = store.load_catalog().await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, "good");
    }

    #[tokio::test]
    async fn test_format_filter() {
        let dir = tempfile::tempdir().unwrap();
        let json_store = FilesystemBackend::from_path(dir.path(), FileFormat::Json);
        let bson_store = FilesystemBackend::from_path(dir.path(), FileFormat::Bson);

        json_store.save_song(song("j", "Json", vec![1])).await.unwrap();
        bson_store.save_song(song("b", "Bson", vec![2])).await.unwrap();

        let ids: Vec<_> = bson_store
            .load_catalog()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["b"]);

        let all = FilesystemBackend::from_path(dir.path(), FileFormat::Auto);
        assert_eq!(all.load_catalog().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path().join("absent"), FileFormat::Auto);
        assert!(store.load_catalog().await.unwrap().is_empty());
        assert!(store.get_song("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audio_is_stored_and_streamed_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path(), FileFormat::Auto);

        let bytes: Vec<u8> = (0..(AUDIO_CHUNK_SIZE + 1000)).map(|i| (i % 251) as u8).collect();
        let mut new_song = song("with-audio", "Loud", vec![9, 9]);
        new_song.source_url = Some("https://www.youtube.com/watch?v=abc".to_string());
        new_song.audio = Some(AudioUpload {
            filename: "abc.m4a".to_string(),
            content_type: "audio/mp4".to_string(),
            bytes: bytes.clone(),
        });
        store.save_song(new_song).await.unwrap();

        let stored = store.get_song("with-audio").await.unwrap().unwrap();
        assert_eq!(stored.source_url.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        let info = stored.audio.unwrap();
        assert_eq!(info.filename, "with-audio.m4a");
        assert_eq!(info.content_type, "audio/mp4");
        assert_eq!(info.size, bytes.len() as u64);

        let mut stream = store.open_audio("with-audio").await.unwrap().unwrap();
        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.len(), AUDIO_CHUNK_SIZE);
        let rest = stream.read_to_end().await.unwrap();
        assert_eq!(rest.len(), 1000);
        assert_eq!(&rest[..], &bytes[AUDIO_CHUNK_SIZE..]);

        store.save_song(song("silent", "None", vec![1])).await.unwrap();
        assert!(store.open_audio("silent").await.unwrap().is_none());
        assert!(store.open_audio("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_record_write_leaves_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path(), FileFormat::Json);

        // A directory where the record file should go makes the write fail
        std::fs::create_dir_all(dir.path().join("blocked.json")).unwrap();

        let mut new_song = song("blocked", "Blocked", vec![1, 2]);
        new_song.audio = Some(AudioUpload {
            filename: "blocked.m4a".to_string(),
            content_type: "audio/mp4".to_string(),
            bytes: vec![1; 64],
        });
        assert!(store.save_song(new_song).await.is_err());
        assert!(!dir.path().join("audio").join("blocked.m4a").exists());
        assert!(store.get_song("blocked").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgresql_backend_round_trip() {
        // Requires a running PostgreSQL instance:
        // cargo test --package tunematch-core -- --ignored
        let store = PostgresqlBackend::new(&PostgresqlConfig::default()).await.unwrap();
        let id = format!("pg-{}", chrono::Utc::now().timestamp_millis());

        let mut new_song = song(&id, "Postgres", vec![0xFFFF_FFFF, 1, 2]);
        new_song.audio = Some(AudioUpload {
            filename: "pg.m4a".to_string(),
            content_type: "audio/mp4".to_string(),
            bytes: vec![5; 300_000],
        });
        store.save_song(new_song).await.unwrap();

        let stored = store.get_song(&id).await.unwrap().unwrap();
        assert_eq!(stored.entry.fingerprint, vec![0xFFFF_FFFF, 1, 2]);
        let audio = store.open_audio(&id).await.unwrap().unwrap();
        assert_eq!(audio.read_to_end().await.unwrap().len(), 300_000);
    }
}
