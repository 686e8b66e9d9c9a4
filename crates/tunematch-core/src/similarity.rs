//! Similarity between sub-fingerprint sequences
//!
//! A sub-fingerprint is a 32-bit summary of a short audio slice. Two slices are
//! compared by the fraction of bits they share; two aligned sequences by the mean of
//! that over index-paired elements.

use crate::config::{MatchConfig, ScorerKind};

pub use tunematch_fp::mask_sub_fingerprint;

/// Width of one sub-fingerprint
pub const SUB_FINGERPRINT_BITS: u32 = 32;


/// Fraction of matching bits between two sub-fingerprints, in `[0, 1]`
#[inline]
pub fn element_similarity(a: u32, b: u32) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / SUB_FINGERPRINT_BITS as f64
}

/// Mean element similarity over the first `min(a.len(), b.len())` positions.
///
/// The sequences are assumed to be aligned already; trailing elements of the longer
/// one are ignored. Returns `0.0` if either sequence is empty.
pub fn sequence_similarity(a: &[u32], b: &[u32]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| element_similarity(x, y))
        .sum();
    total / n as f64
}

/// Scores two sequences that are already aligned at index 0
pub trait SequenceScorer {
    /// Similarity in `[0, 1]`
    fn score(&self, a: &[u32], b: &[u32]) -> f64;
}

impl<T: SequenceScorer + ?Sized> SequenceScorer for &T {
    fn score(&self, a: &[u32], b: &[u32]) -> f64 {
        (**self).score(a, b)
    }
}

/// Default scorer: bitwise Hamming similarity
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingScorer;

impl SequenceScorer for HammingScorer {
    fn score(&self, a: &[u32], b: &[u32]) -> f64 {
        sequence_similarity(a, b)
    }
}

/// Legacy scorer, kept as an opt-in alternative. Not the default.
///
/// Counts positions whose absolute numeric difference is within `tolerance`,
/// normalised by the shorter length. The shorter sequence is slid over every
/// single-element offset of the longer one and the best offset wins; a perfect
/// score stops the slide.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceScorer {
    pub tolerance: u32,
}

impl Default for ToleranceScorer {
    fn default() -> Self {
        Self { tolerance: 1 }
    }
}

impl SequenceScorer for ToleranceScorer {
    fn score(&self, a: &[u32], b: &[u32]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let (short, long) = if a.len() > b.len() { (b, a) } else { (a, b) };

        let mut max_score = 0.0;
        for offset in 0..=(long.len() - short.len()) {
            let matches = short
                .iter()
                .zip(&long[offset..])
                .filter(|&(&x, &y)| x.abs_diff(y) <= self.tolerance)
                .count();
            let score = matches as f64 / short.len() as f64;
            if score > max_score {
                max_score = score;
            }
            if max_score == 1.0 {
                break;
            }
        }
        max_score
    }
}

/// Scorer selected from configuration
#[derive(Debug, Clone, Copy)]
pub enum ScorerStrategy {
    Hamming(HammingScorer),
    Tolerance(ToleranceScorer),
}

impl ScorerStrategy {
    pub fn from_config(config: &MatchConfig) -> Self {
        match config.scorer {
            ScorerKind::Hamming => ScorerStrategy::Hamming(HammingScorer),
            ScorerKind::Tolerance => ScorerStrategy::Tolerance(ToleranceScorer {
                tolerance: config.tolerance,
            }),
        }
    }
}

impl Default for ScorerStrategy {
    fn default() -> Self {
        ScorerStrategy::Hamming(HammingScorer)
    }
}

impl SequenceScorer for ScorerStrategy {
    fn score(&self, a: &[u32], b: &[u32]) -> f64 {
        match self {
            ScorerStrategy::Hamming(s) => s.score(a, b),
            ScorerStrategy::Tolerance(s) => s.score(a, b),
        }
    }
}
