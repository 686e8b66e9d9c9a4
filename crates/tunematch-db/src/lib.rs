//! tunematch database layer
//!
//! PostgreSQL storage for the song catalog and reference audio blobs

pub mod connection;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use connection::{create_pool, run_migrations, test_connection};
pub use models::{AudioBlobInfo, NewAudioBlob, NewSong, Song, SongSummary};
pub use operations::{
    get_all_songs, get_audio_blob_info, get_song_by_catalog_id, get_song_summaries,
    insert_audio_blob, insert_song, read_audio_chunk,
};
