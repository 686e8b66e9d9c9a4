//! Sliding-window alignment of a short clip against a longer reference

use crate::config::MatchConfig;
use crate::similarity::{HammingScorer, SequenceScorer};

/// Outcome of aligning one clip against one reference
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Best similarity found, in `[0, 1]`
    pub score: f64,
    /// Offset into the longer sequence where `score` was reached
    pub offset: Option<usize>,
    /// Window length after clamping
    pub window: usize,
    /// Number of offsets scored
    pub offsets_evaluated: usize,
}

impl Alignment {
    fn empty() -> Self {
        Self {
            score: 0.0,
            offset: None,
            window: 0,
            offsets_evaluated: 0,
        }
    }
}

/// Finds the offset at which a clip best matches a reference fingerprint
#[derive(Debug, Clone)]
pub struct AlignmentSearch<S = HammingScorer> {
    scorer: S,
    min_window: usize,
    early_exit_score: f64,
}

impl AlignmentSearch<HammingScorer> {
    pub fn new() -> Self {
        Self::with_scorer(HammingScorer, &MatchConfig::default())
    }
}

impl Default for AlignmentSearch<HammingScorer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SequenceScorer> AlignmentSearch<S> {
    pub fn with_scorer(scorer: S, config: &MatchConfig) -> Self {
        Self {
            scorer,
            min_window: config.min_window,
            early_exit_score: config.early_exit_score,
        }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Best similarity of `clip` against `song` over all scanned offsets
    pub fn aligned_similarity(
        &self,
        clip: &[u32],
        song: &[u32],
        window: Option<usize>,
        step: usize,
    ) -> f64 {
        self.align(clip, song, window, step).score
    }

    /// Align `clip` against `song`.
    ///
    /// The shorter input is treated as the clip, so argument order does not matter.
    /// The window defaults to the clip length and is clamped to
    /// `[min_window, clip_len]`, with `min_window` taking precedence; the clip segment
    /// is the trailing `window` elements of the clip. Offsets `0, step, 2*step, ...`
    /// are scanned until the best score reaches `early_exit_score`. A song shorter
    /// than the window is scored once at offset 0 without scanning.
    pub fn align(
        &self,
        clip: &[u32],
        song: &[u32],
        window: Option<usize>,
        step: usize,
    ) -> Alignment {
        if clip.is_empty() || song.is_empty() {
            return Alignment::empty();
        }

        let (clip, song) = if clip.len() > song.len() {
            (song, clip)
        } else {
            (clip, song)
        };

        let clip_len = clip.len();
        let window = window.unwrap_or(clip_len).min(clip_len).max(self.min_window);
        // Trailing segment; shorter than `window` when the clip is below `min_window`
        let clip_seg = &clip[clip_len.saturating_sub(window)..];

        if song.len() < window {
            let n = clip_seg.len().min(song.len());
            let score = self.scorer.score(&clip_seg[..n], &song[..n]);
            log::trace!(
                "song shorter than window ({} < {}), scored directly: {:.4}",
                song.len(),
                window,
                score
            );
            return Alignment {
                score,
                offset: Some(0),
                window,
                offsets_evaluated: 1,
            };
        }

        let max_offset = song.len() - window;
        let step = step.max(1);

        let mut best = 0.0;
        let mut best_offset = None;
        let mut offsets_evaluated = 0;

        for offset in (0..=max_offset).step_by(step) {
            let song_seg = &song[offset..offset + window];
            let sim = self.scorer.score(clip_seg, song_seg);
            offsets_evaluated += 1;

            if sim > best {
                best = sim;
                best_offset = Some(offset);
                if best >= self.early_exit_score {
                    log::trace!("early exit at offset {} with {:.4}", offset, best);
                    break;
                }
            }
        }

        Alignment {
            score: best,
            offset: best_offset,
            window,
            offsets_evaluated,
        }
    }
}
