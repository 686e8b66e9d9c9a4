//! Error types at the recognition and ingestion boundaries

use std::path::PathBuf;
use thiserror::Error;

/// Audio could not be normalised or fingerprinted
#[derive(Debug, Error)]
#[error("failed to fingerprint {}: {reason}", path.display())]
pub struct ExtractionError {
    pub path: PathBuf,
    pub reason: String,
}

impl ExtractionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Why a recognition request could not be answered.
///
/// Finding no match is not an error; see [`crate::recognize_file`].
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("extraction failure: {0}")]
    ExtractionFailure(#[from] ExtractionError),

    #[error("catalog unavailable")]
    CatalogUnavailable(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid track URL or URI: {0}")]
    InvalidTrackUrl(String),

    #[error("metadata lookup failed")]
    Metadata(#[source] anyhow::Error),

    #[error("no audio source found for query: {0}")]
    NoSourceFound(String),

    #[error("audio download failed")]
    Download(#[source] anyhow::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("catalog write failed")]
    Catalog(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_extraction_error_message() {
        let err = ExtractionError::new("/tmp/clip.wav", "fpcalc exited with status 2");
        assert_eq!(
            err.to_string(),
            "failed to fingerprint /tmp/clip.wav: fpcalc exited with status 2"
        );

        let err = RecognizeError::from(err);
        assert!(matches!(err, RecognizeError::ExtractionFailure(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_catalog_unavailable_keeps_cause() {
        let err = RecognizeError::CatalogUnavailable(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "catalog unavailable");
        assert_eq!(err.source().map(|e| e.to_string()), Some("connection refused".to_string()));
    }
}
