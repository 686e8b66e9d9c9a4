//! Add-song ingestion
//!
//! Resolves a Spotify track link to metadata, finds and downloads matching audio,
//! fingerprints it and stores the result as a new catalog song.

pub mod source;
pub mod spotify;

use std::path::PathBuf;

use crate::error::{ExtractionError, IngestError};
use crate::extraction::FingerprintExtractor;
use crate::settings::IngestConfig;
use crate::storage_backend::{AudioUpload, CatalogStore, NewSong};

pub use source::{
    create_resolver, init_cookie_file, AudioSourceResolver, CookieFileStatus, DownloadInfo,
    DownloadedAudio, YtDlpResolver,
};
pub use spotify::{extract_track_id, MetadataResolver, SpotifyClient, TokenCache, TrackMetadata};

/// Search query for a track: `"title artist [album] audio"`, skipping empty parts
pub fn build_search_query(title: &str, artist: &str, album: Option<&str>) -> String {
    let mut parts = vec![title, artist];
    if let Some(album) = album {
        parts.push(album);
    }
    parts.push("audio");
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Catalog id for a Spotify track
pub fn song_id_for_track(track_id: &str) -> String {
    format!("spotify-{}", track_id)
}

/// Result of a successful ingestion
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    pub track: TrackMetadata,
    pub source_url: String,
    pub audio_path: PathBuf,
    pub fingerprint_len: usize,
}

/// Runs the add-song flow against a set of collaborators
pub struct Ingestor<'a> {
    metadata: &'a dyn MetadataResolver,
    source: &'a dyn AudioSourceResolver,
    extractor: &'a dyn FingerprintExtractor,
    store: &'a dyn CatalogStore,
    download_dir: PathBuf,
    max_duration_s: Option<u64>,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        metadata: &'a dyn MetadataResolver,
        source: &'a dyn AudioSourceResolver,
        extractor: &'a dyn FingerprintExtractor,
        store: &'a dyn CatalogStore,
        config: &IngestConfig,
    ) -> Self {
        Self {
            metadata,
            source,
            extractor,
            store,
            download_dir: PathBuf::from(&config.download_dir),
            max_duration_s: config.max_audio_duration_s,
        }
    }

    pub async fn ingest_track(&self, spotify_url: &str) -> Result<IngestOutcome, IngestError> {
        let track_id = extract_track_id(spotify_url)
            .ok_or_else(|| IngestError::InvalidTrackUrl(spotify_url.to_string()))?;
        let id = song_id_for_track(&track_id);

        if self
            .store
            .get_song(&id)
            .await
            .map_err(IngestError::Catalog)?
            .is_some()
        {
            return Err(IngestError::Catalog(anyhow::anyhow!(
                "{} is already in the catalog",
                id
            )));
        }

        let track = self
            .metadata
            .track(&track_id)
            .await
            .map_err(IngestError::Metadata)?;

        let query = build_search_query(&track.title, &track.artist, track.album.as_deref());
        let source_url = self
            .source
            .search(&query)
            .await
            .map_err(IngestError::Download)?
            .ok_or_else(|| IngestError::NoSourceFound(query.clone()))?;

        let downloaded = self
            .source
            .download(&source_url, &self.download_dir, self.max_duration_s)
            .await
            .map_err(IngestError::Download)?;

        let fingerprint = self.extractor.extract(&downloaded.path).await?;
        if fingerprint.is_empty() {
            return Err(ExtractionError::new(&downloaded.path, "no sub-fingerprints produced").into());
        }

        let audio = AudioUpload::from_file(&downloaded.path).map_err(IngestError::Download)?;
        let fingerprint_len = fingerprint.len();

        let saved_id = self
            .store
            .save_song(NewSong {
                id,
                metadata: track.clone().into_metadata(),
                fingerprint,
                source_url: Some(source_url.clone()),
                audio: Some(audio),
            })
            .await
            .map_err(IngestError::Catalog)?;

        log::info!(
            "Added {} ({} - {}), {} sub-fingerprints",
            saved_id,
            track.artist,
            track.title,
            fingerprint_len
        );

        Ok(IngestOutcome {
            id: saved_id,
            track,
            source_url,
            audio_path: downloaded.path,
            fingerprint_len,
        })
    }
}

/// Ingest one track link with the given collaborators
pub async fn ingest_track(
    spotify_url: &str,
    metadata: &dyn MetadataResolver,
    source: &dyn AudioSourceResolver,
    extractor: &dyn FingerprintExtractor,
    store: &dyn CatalogStore,
    config: &IngestConfig,
) -> Result<IngestOutcome, IngestError> {
    Ingestor::new(metadata, source, extractor, store, config)
        .ingest_track(spotify_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FileFormat;
    use crate::storage_backend::FilesystemBackend;
    use async_trait::async_trait;
    use std::path::Path;

    struct FixedMetadata;

    #[async_trait]
    impl MetadataResolver for FixedMetadata {
        async fn track(&self, track_id: &str) -> anyhow::Result<TrackMetadata> {
            Ok(TrackMetadata {
                spotify_track_id: track_id.to_string(),
                title: "Karma Police".to_string(),
                artist: "Radiohead".to_string(),
                album: Some("OK Computer".to_string()),
                release_date: Some("1997-05-21".to_string()),
                duration_ms: Some(264_066),
                spotify_url: None,
                album_cover: None,
            })
        }
    }

    struct FakeSource {
        found: bool,
    }

    #[async_trait]
    impl AudioSourceResolver for FakeSource {
        async fn search(&self, query: &str) -> anyhow::Result<Option<String>> {
            assert_eq!(query, "Karma Police Radiohead OK Computer audio");
            Ok(self
                .found
                .then(|| "https://www.youtube.com/watch?v=kp1".to_string()))
        }

        async fn download(
            &self,
            _url: &str,
            dest_dir: &Path,
            _max_duration_s: Option<u64>,
        ) -> anyhow::Result<DownloadedAudio> {
            std::fs::create_dir_all(dest_dir)?;
            let path = dest_dir.join("kp1.m4a");
            std::fs::write(&path, b"fake m4a bytes")?;
            Ok(DownloadedAudio {
                path,
                info: DownloadInfo {
                    id: "kp1".to_string(),
                    ext: Some("m4a".to_string()),
                    ..Default::default()
                },
            })
        }
    }

    struct FixedExtractor(Vec<u32>);

    #[async_trait]
    impl FingerprintExtractor for FixedExtractor {
        async fn extract(&self, _path: &Path) -> Result<Vec<u32>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: FilesystemBackend,
        config: IngestConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBackend::from_path(dir.path().join("catalog"), FileFormat::Json);
        let config = IngestConfig {
            download_dir: dir.path().join("downloads").display().to_string(),
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            store,
            config,
        }
    }

    const TRACK_URL: &str = "https://open.spotify.com/track/63OQupATfueTdZMWTxW03A";

    #[test]
    fn test_build_search_query() {
        assert_eq!(
            build_search_query("Title", "A, B", Some("Album")),
            "Title A, B Album audio"
        );
        assert_eq!(build_search_query("Title", "Artist", None), "Title Artist audio");
        assert_eq!(build_search_query("Title", "", Some("")), "Title audio");
    }

    #[tokio::test]
    async fn test_ingest_stores_song_with_audio() {
        let fx = fixture();
        let extractor = FixedExtractor(vec![10, 20, 30]);
        let outcome = ingest_track(
            TRACK_URL,
            &FixedMetadata,
            &FakeSource { found: true },
            &extractor,
            &fx.store,
            &fx.config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.id, "spotify-63OQupATfueTdZMWTxW03A");
        assert_eq!(outcome.fingerprint_len, 3);

        let stored = fx.store.get_song(&outcome.id).await.unwrap().unwrap();
        assert_eq!(stored.entry.fingerprint, vec![10, 20, 30]);
        assert_eq!(stored.entry.title(), Some("Karma Police"));
        assert_eq!(stored.entry.metadata["artist"], "Radiohead");
        assert_eq!(
            stored.source_url.as_deref(),
            Some("https://www.youtube.com/watch?v=kp1")
        );
        let audio = stored.audio.unwrap();
        assert_eq!(audio.content_type, "audio/mp4");
        assert_eq!(audio.size, b"fake m4a bytes".len() as u64);

        // Same track again
        let err = ingest_track(
            TRACK_URL,
            &FixedMetadata,
            &FakeSource { found: true },
            &extractor,
            &fx.store,
            &fx.config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_invalid_link_is_rejected() {
        let fx = fixture();
        let extractor = FixedExtractor(vec![1]);
        let source = FakeSource { found: true };
        let ingestor = Ingestor::new(&FixedMetadata, &source, &extractor, &fx.store, &fx.config);

        let err = ingestor
            .ingest_track("https://open.spotify.com/album/xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidTrackUrl(_)));
    }

    #[tokio::test]
    async fn test_no_source_found() {
        let fx = fixture();
        let extractor = FixedExtractor(vec![1]);
        let source = FakeSource { found: false };
        let ingestor = Ingestor::new(&FixedMetadata, &source, &extractor, &fx.store, &fx.config);

        match ingestor.ingest_track(TRACK_URL).await {
            Err(IngestError::NoSourceFound(query)) => {
                assert_eq!(query, "Karma Police Radiohead OK Computer audio")
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.id)),
        }
        assert!(fx.store.song_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_fingerprint_is_not_stored() {
        let fx = fixture();
        let extractor = FixedExtractor(vec![]);
        let source = FakeSource { found: true };
        let ingestor = Ingestor::new(&FixedMetadata, &source, &extractor, &fx.store, &fx.config);

        let err = ingestor.ingest_track(TRACK_URL).await.unwrap_err();
        assert!(matches!(err, IngestError::Extraction(_)));
        assert!(fx.store.song_ids().await.unwrap().is_empty());
    }
}
