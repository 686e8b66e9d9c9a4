//! Shared plumbing for the tunematch command line tools

pub mod output;

use anyhow::Result;
use std::path::Path;
use tunematch_core::settings::{BackendKind, FileFormat, FilesystemConfig};
use tunematch_core::TuneMatchConfig;

/// Config file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Log filter used when `RUST_LOG` is unset. Output stays quiet so stdout carries only
/// JSON.
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "info"
    } else {
        "off"
    }
}

/// Initialize env_logger. `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(verbose)),
    )
    .init();
}

/// Load the configuration for a tool run.
///
/// An explicit path must exist. Without one, `config.toml` is used when present and
/// the filesystem defaults otherwise.
pub fn load_config(path: Option<&str>) -> Result<TuneMatchConfig> {
    match path {
        Some(path) => TuneMatchConfig::load(Path::new(path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            TuneMatchConfig::load(Path::new(DEFAULT_CONFIG_PATH))
        }
        None => {
            log::info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
            Ok(TuneMatchConfig::default_filesystem())
        }
    }
}

/// Point the config at a filesystem catalog directory
pub fn use_catalog_dir(config: &mut TuneMatchConfig, dir: &str) {
    config.storage.backend = BackendKind::Filesystem;
    config.storage.filesystem = FilesystemConfig {
        base_directory: dir.to_string(),
        format: FileFormat::Auto,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_must_exist() {
        assert!(load_config(Some("/nonexistent/tunematch.toml")).is_err());
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[storage]\nbackend = \"postgresql\"\n\n[matching]\naccept_threshold = 0.7\n",
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Postgresql);
        assert_eq!(config.matching.accept_threshold, 0.7);
    }

    #[test]
    fn test_default_log_filter() {
        assert_eq!(default_log_filter(true), "info");
        assert_eq!(default_log_filter(false), "off");
    }

    #[test]
    fn test_catalog_dir_override() {
        let mut config = TuneMatchConfig::default_postgresql();
        use_catalog_dir(&mut config, "/srv/catalog");
        assert_eq!(config.storage.backend, BackendKind::Filesystem);
        assert_eq!(config.storage.filesystem.base_directory, "/srv/catalog");
        assert_eq!(config.storage.filesystem.format, FileFormat::Auto);
    }
}
