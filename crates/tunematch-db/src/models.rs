use serde::{Deserialize, Serialize};

/// A catalog song stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: i32,
    /// Stable catalog identifier shared with the filesystem backend
    pub catalog_id: String,
    pub meta: serde_json::Value,
    pub source_url: Option<String>,
    /// Sub-fingerprints as stored by PostgreSQL (`INTEGER[]`)
    pub fingerprint: Vec<i32>,
    pub audio_id: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Song {
    /// Sub-fingerprints reinterpreted as unsigned 32-bit values
    pub fn sub_fingerprints(&self) -> Vec<u32> {
        self.fingerprint.iter().map(|&v| v as u32).collect()
    }
}

/// Input structure for creating a new song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSong {
    pub catalog_id: String,
    pub meta: serde_json::Value,
    pub source_url: Option<String>,
    pub fingerprint: Vec<i32>,
    pub audio_id: Option<i32>,
}

impl NewSong {
    /// Build from unsigned sub-fingerprints; values keep their bit pattern
    pub fn from_sub_fingerprints(
        catalog_id: String,
        meta: serde_json::Value,
        source_url: Option<String>,
        fingerprint: &[u32],
        audio_id: Option<i32>,
    ) -> Self {
        Self {
            catalog_id,
            meta,
            source_url,
            fingerprint: fingerprint.iter().map(|&v| v as i32).collect(),
            audio_id,
        }
    }
}

/// Input structure for storing a reference audio file
#[derive(Debug, Clone)]
pub struct NewAudioBlob {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Audio blob description without its payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlobInfo {
    pub id: i32,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

/// Summary information about a catalog song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongSummary {
    pub id: i32,
    pub catalog_id: String,
    pub title: Option<String>,
    pub fingerprint_len: i32,
    pub has_audio: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_fingerprints_keep_bit_pattern() {
        let new_song = NewSong::from_sub_fingerprints(
            "s".to_string(),
            serde_json::json!({}),
            None,
            &[0, 1, 0xFFFF_FFFF, 0x8000_0000],
            None,
        );
        assert_eq!(new_song.fingerprint, vec![0, 1, -1, i32::MIN]);

        let song = Song {
            id: 1,
            catalog_id: new_song.catalog_id,
            meta: new_song.meta,
            source_url: None,
            fingerprint: new_song.fingerprint,
            audio_id: None,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(song.sub_fingerprints(), vec![0, 1, 0xFFFF_FFFF, 0x8000_0000]);
    }
}
