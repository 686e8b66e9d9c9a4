//! tunematch core - audio fingerprint matching
//!
//! Identifies a recorded audio clip by comparing its Chromaprint fingerprint against
//! every song in a catalog with a sliding-window bitwise similarity search.

pub mod alignment;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extraction;
pub mod ingest;
pub mod matching;
pub mod migration;
pub mod settings;
pub mod similarity;
pub mod storage_backend;

use std::path::Path;

pub use alignment::{Alignment, AlignmentSearch};
pub use catalog::{CatalogEntry, SongMetadata};
pub use config::{MatchConfig, ScorerKind};
pub use error::{ExtractionError, IngestError, RecognizeError};
pub use extraction::{FingerprintExtractor, FpcalcExtractor};
pub use matching::{CatalogScanner, ScanReport, SongMatch};
pub use settings::TuneMatchConfig;
pub use similarity::{
    element_similarity, sequence_similarity, HammingScorer, ScorerStrategy, SequenceScorer,
    ToleranceScorer,
};
pub use storage_backend::{create_backend, CatalogStore};

/// Identify an audio file against the catalog.
///
/// `Ok(None)` means the catalog was searched and nothing cleared the acceptance
/// threshold; an `Err` means the search could not be carried out.
pub async fn recognize_file<S: SequenceScorer>(
    path: &Path,
    extractor: &dyn FingerprintExtractor,
    store: &dyn CatalogStore,
    scanner: &CatalogScanner<S>,
) -> Result<Option<SongMatch>, RecognizeError> {
    let query = extractor.extract(path).await?;
    log::debug!("{}: {} sub-fingerprints", path.display(), query.len());
    recognize_fingerprint(&query, store, scanner).await
}

/// Identify an already extracted fingerprint against the catalog
pub async fn recognize_fingerprint<S: SequenceScorer>(
    query: &[u32],
    store: &dyn CatalogStore,
    scanner: &CatalogScanner<S>,
) -> Result<Option<SongMatch>, RecognizeError> {
    if query.is_empty() {
        log::info!("Empty query fingerprint, no match");
        return Ok(None);
    }

    let catalog = store
        .load_catalog()
        .await
        .map_err(RecognizeError::CatalogUnavailable)?;

    Ok(scanner.find_best_match(query, &catalog))
}
