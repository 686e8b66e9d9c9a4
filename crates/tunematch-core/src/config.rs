//! Matching parameters
//!
//! Defaults are the values the recognition service has always shipped with.

use serde::{Deserialize, Serialize};

/// Which sequence scorer drives the alignment search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Bitwise Hamming similarity of index-paired sub-fingerprints
    #[default]
    Hamming,
    /// Legacy absolute-difference scorer. Not used unless explicitly selected.
    Tolerance,
}

/// Matching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum best score for a positive identification
    pub accept_threshold: f64,
    /// Stop scanning offsets of one song once this score is reached
    pub early_exit_score: f64,
    /// Smallest alignment window, in sub-fingerprints
    pub min_window: usize,
    /// Queries at least this long use `coarse_step`
    pub coarse_step_min_len: usize,
    pub coarse_step: usize,
    pub scorer: ScorerKind,
    /// Allowed absolute difference for the tolerance scorer
    pub tolerance: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.55,
            early_exit_score: 0.98,
            min_window: 32,
            coarse_step_min_len: 400,
            coarse_step: 2,
            scorer: ScorerKind::Hamming,
            tolerance: 1,
        }
    }
}

impl MatchConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            anyhow::bail!("accept_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.early_exit_score) {
            anyhow::bail!("early_exit_score must be within [0, 1]");
        }
        if self.min_window == 0 {
            anyhow::bail!("min_window must be > 0");
        }
        if self.coarse_step == 0 {
            anyhow::bail!("coarse_step must be > 0");
        }
        Ok(())
    }
}
