//! tmmigrate - copy a filesystem catalog into PostgreSQL
//!
//! Usage:
//!   tmmigrate --source-dir ./catalog --dest-config config.postgresql.toml
//!   tmmigrate --source-config config.toml --dest-config config.postgresql.toml

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tunematch_cli::output::print_json_migration;
use tunematch_core::migration::migrate_catalog;
use tunematch_core::settings::{BackendKind, FileFormat};
use tunematch_core::storage_backend::{FilesystemBackend, PostgresqlBackend};
use tunematch_core::TuneMatchConfig;

#[derive(Parser, Debug)]
#[command(name = "tmmigrate")]
#[command(about = "Migrate a filesystem catalog to PostgreSQL", long_about = None)]
struct Args {
    /// Source catalog directory (any record format)
    #[arg(long, conflicts_with = "source_config", required_unless_present = "source_config")]
    source_dir: Option<String>,

    /// Source configuration file (filesystem backend)
    #[arg(long, conflicts_with = "source_dir")]
    source_config: Option<String>,

    /// Destination configuration file (PostgreSQL backend)
    #[arg(long, required = true)]
    dest_config: String,

    /// Show what would be migrated without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let source = create_source_backend(&args)?;
    log::info!("Source catalog: {}", source.base_dir().display());

    let dest_config = TuneMatchConfig::load(Path::new(&args.dest_config))?;
    if dest_config.storage.backend != BackendKind::Postgresql {
        anyhow::bail!("Destination config must use the postgresql backend");
    }
    let dest = PostgresqlBackend::new(&dest_config.storage.postgresql)
        .await
        .context("Failed to connect to destination database")?;

    if args.dry_run {
        log::info!("Dry run, nothing will be written");
    }

    let stats = migrate_catalog(&source, &dest, args.dry_run).await?;
    print_json_migration(&stats, args.dry_run);

    if stats.failed > 0 {
        anyhow::bail!("{} songs failed to migrate", stats.failed);
    }
    Ok(())
}

fn create_source_backend(args: &Args) -> Result<FilesystemBackend> {
    if let Some(dir) = &args.source_dir {
        return Ok(FilesystemBackend::from_path(dir, FileFormat::Auto));
    }

    let path = args
        .source_config
        .as_deref()
        .context("Either --source-dir or --source-config is required")?;
    let config = TuneMatchConfig::load(Path::new(path))?;
    if config.storage.backend != BackendKind::Filesystem {
        anyhow::bail!("Source config must use the filesystem backend");
    }
    Ok(FilesystemBackend::new(&config.storage.filesystem))
}
