//! tmadd - add a song to the catalog from a Spotify track link
//!
//! Usage:
//!   tmadd https://open.spotify.com/track/<id>
//!   tmadd --config <path> spotify:track:<id>
//!
//! Spotify credentials are read from the environment variables named in the
//! `[spotify]` config section (SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET by default).

use anyhow::Result;
use clap::Parser;
use tunematch_cli::output::print_json_added;
use tunematch_cli::{init_logging, load_config, use_catalog_dir};
use tunematch_core::ingest::{create_resolver, ingest_track, init_cookie_file, SpotifyClient};
use tunematch_core::{create_backend, FpcalcExtractor};

#[derive(Parser, Debug)]
#[command(name = "tmadd")]
#[command(about = "Add a Spotify track to the song catalog", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses config.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Filesystem catalog directory (overrides the configured backend)
    #[arg(long)]
    catalog_dir: Option<String>,

    /// Directory for downloaded audio (overrides the config)
    #[arg(long)]
    download_dir: Option<String>,

    /// Reject source audio longer than this many seconds
    #[arg(long)]
    max_duration: Option<u64>,

    /// Spotify track URL or URI
    track: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = &args.catalog_dir {
        use_catalog_dir(&mut config, dir);
    }
    if let Some(dir) = &args.download_dir {
        config.ingest.download_dir = dir.clone();
    }
    if args.max_duration.is_some() {
        config.ingest.max_audio_duration_s = args.max_duration;
    }

    let cookies = init_cookie_file(&config.ingest)?;
    log::info!("Cookie file: {:?}", cookies);

    let spotify = SpotifyClient::from_env(&config.spotify)?;
    let resolver = create_resolver(&config.ingest);
    let extractor = FpcalcExtractor::new(config.extraction.clone());
    let store = create_backend(&config.storage).await?;

    let outcome = ingest_track(
        &args.track,
        &spotify,
        resolver.as_ref(),
        &extractor,
        store.as_ref(),
        &config.ingest,
    )
    .await?;

    print_json_added(&outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "tmadd",
            "--max-duration",
            "600",
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
        ])
        .unwrap();
        assert_eq!(args.max_duration, Some(600));
        assert!(args.config.is_none());
        assert_eq!(
            args.track,
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"
        );

        assert!(Args::try_parse_from(["tmadd", "--max-duration", "ten", "x"]).is_err());
    }
}
