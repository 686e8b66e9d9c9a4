//! Catalog scan and match results
//!
//! A query fingerprint is aligned against every catalog entry in turn; the entry
//! with the highest aligned similarity wins if it clears the acceptance threshold.

use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentSearch;
use crate::catalog::{CatalogEntry, SongMetadata};
use crate::config::MatchConfig;
use crate::similarity::{HammingScorer, ScorerStrategy, SequenceScorer};

#[cfg(test)]
mod tests;

/// Positive identification of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongMatch {
    pub id: String,
    pub metadata: SongMetadata,
    /// Best aligned similarity, in `[accept_threshold, 1]`
    pub score: f64,
    /// Offset into the reference fingerprint of the best alignment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Full account of one catalog scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Accepted match, if any
    pub best: Option<SongMatch>,
    /// Highest score seen, accepted or not
    pub best_score: f64,
    pub entries_scanned: usize,
    /// Entries with an empty fingerprint
    pub entries_skipped: usize,
    pub offsets_evaluated: usize,
}

/// Linear scan of a catalog for the best-aligned song
#[derive(Debug, Clone)]
pub struct CatalogScanner<S = HammingScorer> {
    search: AlignmentSearch<S>,
    accept_threshold: f64,
    coarse_step_min_len: usize,
    coarse_step: usize,
}

impl CatalogScanner<HammingScorer> {
    pub fn new() -> Self {
        Self::with_scorer(HammingScorer, &MatchConfig::default())
    }
}

impl Default for CatalogScanner<HammingScorer> {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogScanner<ScorerStrategy> {
    /// Scanner using whichever scorer the configuration selects
    pub fn from_config(config: &MatchConfig) -> Self {
        Self::with_scorer(ScorerStrategy::from_config(config), config)
    }
}

impl<S: SequenceScorer> CatalogScanner<S> {
    pub fn with_scorer(scorer: S, config: &MatchConfig) -> Self {
        Self {
            search: AlignmentSearch::with_scorer(scorer, config),
            accept_threshold: config.accept_threshold,
            coarse_step_min_len: config.coarse_step_min_len,
            coarse_step: config.coarse_step,
        }
    }

    pub fn scorer(&self) -> &S {
        self.search.scorer()
    }

    pub fn accept_threshold(&self) -> f64 {
        self.accept_threshold
    }

    /// Offset step for a query of `query_len` sub-fingerprints
    pub fn step_for(&self, query_len: usize) -> usize {
        if query_len < self.coarse_step_min_len {
            1
        } else {
            self.coarse_step.max(1)
        }
    }

    /// Best catalog match for `query`, or `None` if nothing clears the threshold
    pub fn find_best_match<'a, I>(&self, query: &[u32], catalog: I) -> Option<SongMatch>
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        self.scan(query, catalog).best
    }

    /// Scan the whole catalog in iteration order.
    ///
    /// Entries with an empty fingerprint are skipped. A later entry replaces the
    /// current best only on a strictly greater score, so ties keep the earliest.
    pub fn scan<'a, I>(&self, query: &[u32], catalog: I) -> ScanReport
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        let mut report = ScanReport {
            best: None,
            best_score: 0.0,
            entries_scanned: 0,
            entries_skipped: 0,
            offsets_evaluated: 0,
        };

        if query.is_empty() {
            log::debug!("Empty query fingerprint, nothing to match");
            return report;
        }

        let step = self.step_for(query.len());
        let mut best: Option<(&CatalogEntry, f64, Option<usize>)> = None;

        for entry in catalog {
            if entry.fingerprint.is_empty() {
                report.entries_skipped += 1;
                log::trace!("Skipping {}: empty fingerprint", entry.id);
                continue;
            }

            let alignment = self.search.align(query, &entry.fingerprint, None, step);
            report.entries_scanned += 1;
            report.offsets_evaluated += alignment.offsets_evaluated;

            log::debug!(
                "{}: score {:.4} at offset {:?} ({} offsets)",
                entry.id,
                alignment.score,
                alignment.offset,
                alignment.offsets_evaluated
            );

            if alignment.score > report.best_score {
                report.best_score = alignment.score;
                best = Some((entry, alignment.score, alignment.offset));
            }
        }

        match best {
            Some((entry, score, offset)) if score >= self.accept_threshold => {
                log::info!(
                    "Matched {} ({}) with score {:.4}",
                    entry.id,
                    entry.title().unwrap_or("untitled"),
                    score
                );
                report.best = Some(SongMatch {
                    id: entry.id.clone(),
                    metadata: entry.metadata.clone(),
                    score,
                    offset,
                });
            }
            _ => {
                log::info!(
                    "No match above {:.2} (best {:.4} over {} songs)",
                    self.accept_threshold,
                    report.best_score,
                    report.entries_scanned
                );
            }
        }

        report
    }
}
