//! Track metadata from the Spotify Web API
//!
//! Uses the client-credentials flow. The access token is cached together with its
//! expiry and refreshed on demand.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::SongMetadata;
use crate::settings::SpotifyConfig;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Tokens are treated as expired this long before the server says they are
const EXPIRY_MARGIN_S: i64 = 60;

static TRACK_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://open\.spotify\.com/track/|spotify:track:)([a-zA-Z0-9]+)")
        .expect("track link pattern is valid")
});

/// Track id from an `open.spotify.com/track/<id>` URL or a `spotify:track:<id>` URI
pub fn extract_track_id(url_or_uri: &str) -> Option<String> {
    TRACK_LINK_RE
        .captures(url_or_uri.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Cached access token and the instant it stops being usable
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenCache {
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn store(&mut self, token: String, expires_in_s: i64, now: DateTime<Utc>) {
        let lifetime = (expires_in_s - EXPIRY_MARGIN_S).max(0);
        self.expires_at = Some(now + Duration::seconds(lifetime));
        self.token = Some(token);
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Metadata recorded for every ingested track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub spotify_track_id: String,
    pub title: String,
    /// Comma-joined artist names
    pub artist: String,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: Option<u64>,
    pub spotify_url: Option<String>,
    pub album_cover: Option<String>,
}

impl TrackMetadata {
    pub fn into_metadata(self) -> SongMetadata {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => SongMetadata::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    duration_ms: Option<u64>,
    #[serde(default)]
    external_urls: ApiExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl From<ApiTrack> for TrackMetadata {
    fn from(track: ApiTrack) -> Self {
        let artist = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let (album, release_date, album_cover) = match track.album {
            Some(album) => (
                album.name,
                album.release_date,
                album.images.into_iter().next().map(|i| i.url),
            ),
            None => (None, None, None),
        };

        Self {
            spotify_track_id: track.id,
            title: track.name,
            artist,
            album,
            release_date,
            duration_ms: track.duration_ms,
            spotify_url: track.external_urls.spotify,
            album_cover,
        }
    }
}

/// Parse a `GET /v1/tracks/{id}` response body
pub fn parse_track_response(body: &str) -> Result<TrackMetadata> {
    let track: ApiTrack = serde_json::from_str(body).context("Unexpected track response")?;
    Ok(track.into())
}

/// Looks up metadata for a track id
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn track(&self, track_id: &str) -> Result<TrackMetadata>;
}

/// Spotify Web API client
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: tokio::sync::Mutex<TokenCache>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            token: tokio::sync::Mutex::new(TokenCache::default()),
        })
    }

    /// Read credentials from the environment variables named in the config
    pub fn from_env(config: &SpotifyConfig) -> Result<Self> {
        let client_id = std::env::var(&config.client_id_env)
            .with_context(|| format!("{} is not set", config.client_id_env))?;
        let client_secret = std::env::var(&config.client_secret_env)
            .with_context(|| format!("{} is not set", config.client_secret_env))?;
        Self::new(client_id, client_secret)
    }

    async fn access_token(&self) -> Result<String> {
        let mut cache = self.token.lock().await;
        if let Some(token) = cache.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }

        log::debug!("Requesting Spotify access token");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token request rejected ({}): {}", status, body);
        }

        let token: TokenResponse = response.json().await.context("Unexpected token response")?;
        cache.store(token.access_token.clone(), token.expires_in, Utc::now());
        Ok(token.access_token)
    }

    async fn fetch_track(&self, track_id: &str) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        self.http
            .get(format!("{}/tracks/{}", API_BASE, track_id))
            .bearer_auth(token)
            .send()
            .await
            .context("Track request failed")
    }
}

#[async_trait]
impl MetadataResolver for SpotifyClient {
    async fn track(&self, track_id: &str) -> Result<TrackMetadata> {
        let mut response = self.fetch_track(track_id).await?;

        // Revoked before its expiry: refresh once
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.token.lock().await.clear();
            response = self.fetch_track(track_id).await?;
        }

        let status = response.status();
        let body = response.text().await.context("Failed to read track response")?;
        if !status.is_success() {
            anyhow::bail!("Track lookup for {} failed ({}): {}", track_id, status, body);
        }

        let metadata = parse_track_response(&body)?;
        log::info!("Resolved track {}: {} - {}", track_id, metadata.artist, metadata.title);
        Ok(metadata)
    }
}
