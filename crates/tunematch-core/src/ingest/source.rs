//! Reference audio acquisition
//!
//! The resolver backend is chosen once at startup from `[ingest] source`; the rest of
//! the ingestion flow only sees the [`AudioSourceResolver`] trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::settings::{IngestConfig, SourceKind};

/// Finds and downloads audio for a search query
#[async_trait]
pub trait AudioSourceResolver: Send + Sync {
    /// URL of the best candidate for `query`, if any
    async fn search(&self, query: &str) -> Result<Option<String>>;

    /// Download the best available audio of `url` into `dest_dir`.
    ///
    /// Candidates longer than `max_duration_s` are rejected.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        max_duration_s: Option<u64>,
    ) -> Result<DownloadedAudio>;
}

/// Fields of the yt-dlp info document that ingestion uses
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DownloadInfo {
    pub id: String,
    pub title: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
    pub ext: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub path: PathBuf,
    pub info: DownloadInfo,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    webpage_url: Option<String>,
    url: Option<String>,
}

/// Parse `yt-dlp --dump-single-json ytsearch1:...` output
pub fn parse_search_output(stdout: &str) -> Result<Option<String>> {
    let result: SearchResult =
        serde_json::from_str(stdout.trim()).context("Unexpected yt-dlp search output")?;
    Ok(result
        .entries
        .into_iter()
        .find_map(|e| e.webpage_url.or(e.url)))
}

/// Parse the info line yt-dlp prints for a download.
///
/// Returns `None` when nothing was printed, which is what happens when a match
/// filter rejects the video.
pub fn parse_download_info(stdout: &str) -> Result<Option<DownloadInfo>> {
    match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => Ok(Some(
            serde_json::from_str(line).context("Unexpected yt-dlp info output")?,
        )),
        None => Ok(None),
    }
}

/// Where the downloaded audio ended up; the m4a conversion wins if present
pub fn resolve_download_path(dest_dir: &Path, info: &DownloadInfo) -> Option<PathBuf> {
    let m4a = dest_dir.join(format!("{}.m4a", info.id));
    if m4a.is_file() {
        return Some(m4a);
    }
    let ext = info.ext.as_deref()?;
    let original = dest_dir.join(format!("{}.{}", info.id, ext));
    original.is_file().then_some(original)
}

/// Resolver backed by the `yt-dlp` command-line tool
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
    cookie_file: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            program: config.yt_dlp_path.clone(),
            cookie_file: config.cookie_file.as_ref().map(PathBuf::from),
        }
    }

    /// Cookies are only passed once the file has been written
    fn cookie_args(&self) -> Vec<String> {
        match &self.cookie_file {
            Some(path) if path.is_file() => {
                vec!["--cookies".to_string(), path.display().to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn search_args(&self, query: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(self.cookie_args());
        args.push(format!("ytsearch1:{}", query));
        args
    }

    fn download_args(&self, url: &str, dest_dir: &Path, max_duration_s: Option<u64>) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            "--output".to_string(),
            dest_dir.join("%(id)s.%(ext)s").display().to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "m4a".to_string(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-warnings".to_string(),
        ];
        if let Some(max) = max_duration_s {
            args.push("--match-filter".to_string());
            args.push(format!("duration <= {}", max));
        }
        args.extend(self.cookie_args());
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        log::debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl AudioSourceResolver for YtDlpResolver {
    async fn search(&self, query: &str) -> Result<Option<String>> {
        let stdout = self.run(&self.search_args(query)).await?;
        let url = parse_search_output(&stdout)?;
        match &url {
            Some(url) => log::info!("Found {} for {:?}", url, query),
            None => log::info!("No results for {:?}", query),
        }
        Ok(url)
    }

    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        max_duration_s: Option<u64>,
    ) -> Result<DownloadedAudio> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

        let stdout = self
            .run(&self.download_args(url, dest_dir, max_duration_s))
            .await?;

        let Some(info) = parse_download_info(&stdout)? else {
            match max_duration_s {
                Some(max) => anyhow::bail!("{} skipped: longer than {} s", url, max),
                None => anyhow::bail!("{} produced no download", url),
            }
        };

        let path = resolve_download_path(dest_dir, &info).with_context(|| {
            format!("Download of {} succeeded but no file found in {}", url, dest_dir.display())
        })?;

        log::info!("Downloaded {} to {}", url, path.display());
        Ok(DownloadedAudio { path, info })
    }
}

/// Resolver selected by the configuration
pub fn create_resolver(config: &IngestConfig) -> Box<dyn AudioSourceResolver> {
    match config.source {
        SourceKind::YtDlp => Box::new(YtDlpResolver::new(config)),
    }
}

/// Outcome of [`init_cookie_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieFileStatus {
    Written,
    AlreadyPresent,
    /// No cookie file configured, or the variable is unset
    NotConfigured,
}

/// Write the yt-dlp cookie file from `cookie_env` if it is configured and absent.
///
/// Call once at startup. Safe to call again: an existing non-empty file is kept.
pub fn init_cookie_file(config: &IngestConfig) -> Result<CookieFileStatus> {
    let value = std::env::var(&config.cookie_env).ok();
    write_cookie_file(config, value.as_deref())
}

fn write_cookie_file(config: &IngestConfig, value: Option<&str>) -> Result<CookieFileStatus> {
    let Some(path) = config.cookie_file.as_deref().map(Path::new) else {
        return Ok(CookieFileStatus::NotConfigured);
    };

    if std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
        log::debug!("Cookie file {} already present", path.display());
        return Ok(CookieFileStatus::AlreadyPresent);
    }

    let contents = match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            log::warn!(
                "Cookie file {} configured but {} is not set",
                path.display(),
                config.cookie_env
            );
            return Ok(CookieFileStatus::NotConfigured);
        }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write cookie file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    log::info!("Wrote cookie file {}", path.display());
    Ok(CookieFileStatus::Written)
}
