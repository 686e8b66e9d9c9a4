use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::models::*;

const SONG_COLUMNS: &str =
    "id, catalog_id, meta, source_url, fingerprint, audio_id, created_at";

fn song_from_row(r: &Row) -> Song {
    Song {
        id: r.get(0),
        catalog_id: r.get(1),
        meta: r.get(2),
        source_url: r.get(3),
        fingerprint: r.get(4),
        audio_id: r.get(5),
        created_at: r.get(6),
    }
}

/// Insert a new song, returning its database id
pub async fn insert_song(pool: &Pool, song: &NewSong) -> Result<i32> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "INSERT INTO songs
             (catalog_id, meta, source_url, fingerprint, audio_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
            &[
                &song.catalog_id,
                &song.meta,
                &song.source_url,
                &song.fingerprint,
                &song.audio_id,
            ],
        )
        .await
        .context("Failed to insert song")?;

    Ok(row.get(0))
}

/// Store a reference audio file, returning its blob id
pub async fn insert_audio_blob(pool: &Pool, blob: &NewAudioBlob) -> Result<i32> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "INSERT INTO audio_blobs (filename, content_type, data)
             VALUES ($1, $2, $3)
             RETURNING id",
            &[&blob.filename, &blob.content_type, &blob.data],
        )
        .await
        .context("Failed to insert audio blob")?;

    Ok(row.get(0))
}

/// Get song by catalog identifier
pub async fn get_song_by_catalog_id(pool: &Pool, catalog_id: &str) -> Result<Option<Song>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM songs WHERE catalog_id = $1", SONG_COLUMNS),
            &[&catalog_id],
        )
        .await
        .context("Failed to get song by catalog id")?;

    Ok(row.as_ref().map(song_from_row))
}

/// Get all songs in insertion order
pub async fn get_all_songs(pool: &Pool) -> Result<Vec<Song>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            &format!("SELECT {} FROM songs ORDER BY id", SONG_COLUMNS),
            &[],
        )
        .await
        .context("Failed to get all songs")?;

    Ok(rows.iter().map(song_from_row).collect())
}

/// Describe an audio blob without fetching its payload
pub async fn get_audio_blob_info(pool: &Pool, audio_id: i32) -> Result<Option<AudioBlobInfo>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, filename, content_type, octet_length(data)::BIGINT
             FROM audio_blobs
             WHERE id = $1",
            &[&audio_id],
        )
        .await
        .context("Failed to get audio blob")?;

    Ok(row.map(|r| AudioBlobInfo {
        id: r.get(0),
        filename: r.get(1),
        content_type: r.get(2),
        size: r.get(3),
    }))
}

/// Read one chunk of an audio blob. `offset` is zero-based.
pub async fn read_audio_chunk(pool: &Pool, audio_id: i32, offset: i64, len: i32) -> Result<Vec<u8>> {
    let client = pool.get().await?;

    // substring() on bytea is 1-based
    let start = (offset + 1) as i32;
    let row = client
        .query_opt(
            "SELECT substring(data FROM $2 FOR $3) FROM audio_blobs WHERE id = $1",
            &[&audio_id, &start, &len],
        )
        .await
        .context("Failed to read audio chunk")?;

    match row {
        Some(r) => Ok(r.get(0)),
        None => anyhow::bail!("Audio blob not found: {}", audio_id),
    }
}

/// Get summary information for all songs
pub async fn get_song_summaries(pool: &Pool) -> Result<Vec<SongSummary>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, catalog_id, meta->>'title',
                    COALESCE(array_length(fingerprint, 1), 0),
                    audio_id IS NOT NULL
             FROM songs
             ORDER BY id",
            &[],
        )
        .await
        .context("Failed to get song summaries")?;

    Ok(rows
        .iter()
        .map(|r| SongSummary {
            id: r.get(0),
            catalog_id: r.get(1),
            title: r.get(2),
            fingerprint_len: r.get(3),
            has_audio: r.get(4),
        })
        .collect())
}
