//! Tests for the catalog scanner

use super::*;
use crate::config::ScorerKind;
use crate::similarity::sequence_similarity;
use approx::assert_relative_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hamming scorer that counts invocations
#[derive(Default)]
struct CountingScorer {
    calls: AtomicUsize,
}

impl CountingScorer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SequenceScorer for CountingScorer {
    fn score(&self, a: &[u32], b: &[u32]) -> f64 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        sequence_similarity(a, b)
    }
}

fn noise(seed: u64, len: usize) -> Vec<u32> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 16) as u32
        })
        .collect()
}

fn entry(id: &str, title: &str, fingerprint: Vec<u32>) -> CatalogEntry {
    let mut meta = SongMetadata::new();
    meta.insert("title".to_string(), json!(title));
    CatalogEntry::new(id, meta, fingerprint)
}

#[test]
fn test_exact_copy_matches() {
    let song: Vec<u32> = (1..=50).collect();
    let catalog = vec![entry("s1", "Counting", song.clone())];

    let result = CatalogScanner::new().find_best_match(&song, &catalog).unwrap();
    assert_eq!(result.id, "s1");
    assert_eq!(result.score, 1.0);
    assert_eq!(result.metadata["title"], json!("Counting"));
}

#[test]
fn test_inverted_bits_do_not_match() {
    let catalog = vec![entry("s1", "Ones", vec![u32::MAX; 50])];
    let report = CatalogScanner::new().scan(&[0u32; 50], &catalog);

    assert!(report.best.is_none());
    assert_eq!(report.best_score, 0.0);
    assert_eq!(report.entries_scanned, 1);
}

#[test]
fn test_shifted_excerpt_is_found() {
    let song = noise(1, 200);
    let mut query = noise(2, 5);
    query.extend_from_slice(&song[10..110]);

    let catalog = vec![
        entry("other", "Other", noise(3, 200)),
        entry("target", "Target", song),
    ];
    let result = CatalogScanner::new().find_best_match(&query, &catalog).unwrap();

    assert_eq!(result.id, "target");
    assert_eq!(result.offset, Some(5));
    assert!(result.score > 0.9);
}

#[test]
fn test_step_switches_at_400() {
    let catalog = vec![entry("s1", "Ones", vec![u32::MAX; 800])];

    let scanner = CatalogScanner::with_scorer(CountingScorer::default(), &MatchConfig::default());
    let report = scanner.scan(&[0u32; 399], &catalog);
    assert_eq!(report.offsets_evaluated, 402);
    assert_eq!(scanner.scorer().calls(), 402);

    let scanner = CatalogScanner::with_scorer(CountingScorer::default(), &MatchConfig::default());
    let report = scanner.scan(&[0u32; 400], &catalog);
    assert_eq!(report.offsets_evaluated, 201);
    assert_eq!(scanner.scorer().calls(), 201);
}

#[test]
fn test_step_for_boundaries() {
    let scanner = CatalogScanner::new();
    assert_eq!(scanner.step_for(0), 1);
    assert_eq!(scanner.step_for(399), 1);
    assert_eq!(scanner.step_for(400), 2);

    let unvalidated = MatchConfig {
        coarse_step: 0,
        ..Default::default()
    };
    assert_eq!(CatalogScanner::from_config(&unvalidated).step_for(1000), 1);
}

#[test]
fn test_threshold_is_inclusive() {
    // 15 bits set: 17/32 similar; 14 bits set: 18/32 similar
    let mut query = vec![(1u32 << 15) - 1; 16];
    query.extend(vec![(1u32 << 14) - 1; 24]);
    let catalog = vec![entry("zeros", "Silence", vec![0; 40])];
    let scanner = CatalogScanner::new();

    let result = scanner.find_best_match(&query, &catalog).unwrap();
    assert_relative_eq!(result.score, 0.55);

    // One element with 16 bits set drops the mean just below the threshold
    query[0] = (1u32 << 16) - 1;
    let report = scanner.scan(&query, &catalog);
    assert!(report.best.is_none());
    assert_relative_eq!(report.best_score, 0.549_218_75);
}

#[test]
fn test_empty_inputs() {
    let scanner = CatalogScanner::new();
    let catalog = vec![entry("s1", "One", noise(4, 64))];

    assert!(scanner.find_best_match(&[], &catalog).is_none());
    assert!(scanner
        .find_best_match(&noise(4, 64), &Vec::<CatalogEntry>::new())
        .is_none());

    let empties = vec![entry("e1", "Empty", vec![]), entry("e2", "Empty", vec![])];
    let report = scanner.scan(&noise(4, 64), &empties);
    assert!(report.best.is_none());
    assert_eq!(report.entries_skipped, 2);
    assert_eq!(report.entries_scanned, 0);
}

#[test]
fn test_empty_entries_are_skipped_not_fatal() {
    let song = noise(5, 120);
    let catalog = vec![
        entry("empty", "Empty", vec![]),
        entry("real", "Real", song.clone()),
    ];
    let report = CatalogScanner::new().scan(&song[20..80], &catalog);

    assert_eq!(report.entries_skipped, 1);
    assert_eq!(report.best.map(|m| m.id), Some("real".to_string()));
}

#[test]
fn test_ties_keep_first_entry() {
    let song = noise(6, 100);
    let catalog = vec![
        entry("first", "Dup", song.clone()),
        entry("second", "Dup", song.clone()),
    ];
    let result = CatalogScanner::new().find_best_match(&song, &catalog).unwrap();
    assert_eq!(result.id, "first");
}

#[test]
fn test_query_longer_than_song() {
    let song = noise(7, 60);
    let mut query = noise(8, 30);
    query.extend_from_slice(&song);
    query.extend(noise(9, 30));

    let catalog = vec![entry("short", "Short", song)];
    let result = CatalogScanner::new().find_best_match(&query, &catalog).unwrap();
    assert_eq!(result.id, "short");
    assert_eq!(result.offset, Some(30));
    assert_eq!(result.score, 1.0);
}

#[test]
fn test_config_selects_tolerance_scorer() {
    let config = MatchConfig {
        scorer: ScorerKind::Tolerance,
        tolerance: 1,
        ..Default::default()
    };
    let scanner = CatalogScanner::from_config(&config);
    assert!(matches!(scanner.scorer(), ScorerStrategy::Tolerance(_)));

    let song: Vec<u32> = (0..64).map(|i| i * 100).collect();
    let query: Vec<u32> = song.iter().map(|v| v + 1).collect();
    let catalog = vec![entry("s1", "Steps", song)];
    let result = scanner.find_best_match(&query, &catalog).unwrap();
    assert_eq!(result.score, 1.0);
}

#[test]
fn test_match_serializes_without_missing_offset() {
    let m = SongMatch {
        id: "s1".to_string(),
        metadata: SongMetadata::new(),
        score: 0.75,
        offset: None,
    };
    let value = serde_json::to_value(&m).unwrap();
    assert_eq!(value, json!({"id": "s1", "metadata": {}, "score": 0.75}));
}
