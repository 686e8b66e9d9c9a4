//! tmrecognize - identify an audio clip against the catalog
//!
//! Usage:
//!   tmrecognize <audio_file>                          # Uses config.toml
//!   tmrecognize --config <path> <audio_file>
//!   tmrecognize --catalog-dir ./catalog <audio_file>  # Filesystem catalog
//!   tmrecognize --fingerprint <record_or_json>        # Skip extraction

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tunematch_cli::output::print_json_match;
use tunematch_cli::{init_logging, load_config, use_catalog_dir};
use tunematch_core::{
    create_backend, recognize_file, recognize_fingerprint, CatalogScanner, FpcalcExtractor,
    ScorerKind,
};
use tunematch_fp::SongRecord;

#[derive(Parser, Debug)]
#[command(name = "tmrecognize")]
#[command(about = "Identify an audio clip against the song catalog", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses config.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Filesystem catalog directory (overrides the configured backend)
    #[arg(long)]
    catalog_dir: Option<String>,

    /// Treat the input as an already extracted fingerprint: a catalog record or a
    /// JSON array of sub-fingerprints
    #[arg(long)]
    fingerprint: bool,

    /// Use the legacy tolerance scorer instead of bitwise similarity
    #[arg(long)]
    legacy_scorer: bool,

    /// Audio clip (or fingerprint file with --fingerprint)
    input: String,

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
    if args.legacy_scorer {
        config.matching.scorer = ScorerKind::Tolerance;
    }

    let input = Path::new(&args.input);
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let store = create_backend(&config.storage).await?;
    let scanner = CatalogScanner::from_config(&config.matching);

    let result = if args.fingerprint {
        let query = load_query_fingerprint(input)?;
        log::info!("Loaded {} sub-fingerprints from {}", query.len(), input.display());
        recognize_fingerprint(&query, store.as_ref(), &scanner).await?
    } else {
        let extractor = FpcalcExtractor::new(config.extraction.clone());
        recognize_file(input, &extractor, store.as_ref(), &scanner).await?
    };

    print_json_match(&args.input, result.as_ref());
    Ok(())
}

/// Query fingerprint from a bare JSON array or any catalog record format
fn load_query_fingerprint(path: &Path) -> Result<Vec<u32>> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if let Ok(raw) = serde_json::from_str::<Vec<u32>>(&content) {
            return Ok(raw);
        }
    }
    Ok(SongRecord::load_auto(path)?.fingerprint)
}
