//! Copy a catalog from one store to another
//!
//! Songs whose id already exists in the destination are skipped, so a migration can
//! be re-run after a partial failure.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;

use crate::storage_backend::{AudioUpload, CatalogStore, NewSong};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Copy every song, with its reference audio, from `source` to `dest`.
///
/// With `dry_run` nothing is written; `migrated` then counts what would be copied.
pub async fn migrate_catalog(
    source: &dyn CatalogStore,
    dest: &dyn CatalogStore,
    dry_run: bool,
) -> Result<MigrationStats> {
    let ids = source
        .song_ids()
        .await
        .context("Failed to list songs in source")?;
    let existing: HashSet<String> = dest
        .song_ids()
        .await
        .context("Failed to list songs in destination")?
        .into_iter()
        .collect();

    let mut stats = MigrationStats {
        total: ids.len(),
        ..Default::default()
    };
    log::info!("Found {} songs to migrate", stats.total);

    for id in ids {
        if existing.contains(&id) {
            log::debug!("Skipping {} (already exists)", id);
            stats.skipped += 1;
            continue;
        }

        if dry_run {
            log::info!("Would migrate {}", id);
            stats.migrated += 1;
            continue;
        }

        match copy_song(source, dest, &id).await {
            Ok(()) => {
                log::debug!("Migrated {}", id);
                stats.migrated += 1;
            }
            Err(e) => {
                log::error!("Failed to migrate {}: {:#}", id, e);
                stats.failed += 1;
            }
        }
    }

    log::info!(
        "Migration finished: {} migrated, {} skipped, {} failed",
        stats.migrated,
        stats.skipped,
        stats.failed
    );
    Ok(stats)
}

async fn copy_song(source: &dyn CatalogStore, dest: &dyn CatalogStore, id: &str) -> Result<()> {
    let song = source
        .get_song(id)
        .await?
        .with_context(|| format!("{} disappeared from source", id))?;

    let audio = match source.open_audio(id).await? {
        Some(stream) => {
            let info = stream.info.clone();
            let bytes = stream.read_to_end().await?;
            Some(AudioUpload {
                filename: info.filename,
                content_type: info.content_type,
                bytes,
            })
        }
        None => None,
    };

    dest.save_song(NewSong {
        id: song.entry.id,
        metadata: song.entry.metadata,
        fingerprint: song.entry.fingerprint,
        source_url: song.source_url,
        audio,
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SongMetadata;
    use crate::settings::FileFormat;
    use crate::storage_backend::FilesystemBackend;

    fn song(id: &str, audio: Option<&[u8]>) -> NewSong {
        NewSong {
            id: id.to_string(),
            metadata: SongMetadata::new(),
            fingerprint: vec![1, 2, 3],
            source_url: Some(format!("https://www.youtube.com/watch?v={}", id)),
            audio: audio.map(|bytes| AudioUpload {
                filename: format!("{}.m4a", id),
                content_type: "audio/mp4".to_string(),
                bytes: bytes.to_vec(),
            }),
        }
    }

    #[tokio::test]
    async fn test_migrate_copies_missing_songs() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = FilesystemBackend::from_path(src_dir.path(), FileFormat::Json);
        let dest = FilesystemBackend::from_path(dst_dir.path(), FileFormat::Binary);

        source.save_song(song("a", Some(b"audio-a"))).await.unwrap();
        source.save_song(song("b", None)).await.unwrap();
        source.save_song(song("c", None)).await.unwrap();
        dest.save_song(song("b", None)).await.unwrap();

        let dry = migrate_catalog(&source, &dest, true).await.unwrap();
        assert_eq!(
            dry,
            MigrationStats {
                total: 3,
                migrated: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(dest.song_ids().await.unwrap(), vec!["b"]);

        let stats = migrate_catalog(&source, &dest, false).await.unwrap();
        assert_eq!(stats.migrated, 2);
        assert_eq!(dest.song_ids().await.unwrap(), vec!["a", "b", "c"]);

        let copied = dest.get_song("a").await.unwrap().unwrap();
        assert_eq!(copied.entry.fingerprint, vec![1, 2, 3]);
        assert_eq!(
            copied.source_url.as_deref(),
            Some("https://www.youtube.com/watch?v=a")
        );
        let audio = dest.open_audio("a").await.unwrap().unwrap();
        assert_eq!(audio.read_to_end().await.unwrap(), b"audio-a".to_vec());

        // Re-running is a no-op
        let again = migrate_catalog(&source, &dest, false).await.unwrap();
        assert_eq!(again.skipped, 3);
        assert_eq!(again.migrated, 0);
    }
}
