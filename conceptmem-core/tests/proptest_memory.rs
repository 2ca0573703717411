//! Property-based tests for the concept memory core.
//!
//! Normalization, similarity ordering, growth identity, eviction bounds and
//! the promotion threshold under random inputs.

use std::collections::HashMap;

use proptest::prelude::*;

use conceptmem_core::config::SegmentationConfig;
use conceptmem_core::registry::ConceptMetadata;
use conceptmem_core::segmentation::SegmentInput;
use conceptmem_core::store::GrowthStrategy;
use conceptmem_core::types::magnitude;
use conceptmem_core::{ConceptRegistry, Modality, PatternTracker, Segmenter, VectorStore};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_vector(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-100.0..100.0f32, 0..max_len)
}

fn arb_positive_vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(prop::collection::vec(0.1..1.0f32, 8), 1..20)
}

fn arb_keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-f]{1,2}", 1..200)
}

/// Every tracked pattern with its utility (min_frequency must be 1).
fn utilities(tracker: &PatternTracker) -> HashMap<String, f64> {
    tracker
        .frequent_patterns(usize::MAX, None, true)
        .into_iter()
        .filter_map(|(key, _)| tracker.pattern(&key).map(|p| (key, p.utility)))
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn embeddings_are_zero_or_unit_length(vectors in prop::collection::vec(arb_vector(40), 1..10)) {
        let mut reg = ConceptRegistry::new(16, 2, GrowthStrategy::Fixed { increment: 3 });
        for v in &vectors {
            let id = reg.add_semantic_concept(v, Modality::Text, false, &[], ConceptMetadata::new());
            let e = reg.get_embedding(id).expect("just created");
            let m = magnitude(&e);
            prop_assert!(m == 0.0 || (m - 1.0).abs() < 1e-4, "magnitude {}", m);
        }
    }
}

proptest! {
    #[test]
    fn similarity_is_sorted_and_self_first(vectors in arb_positive_vectors(), pick in any::<prop::sample::Index>()) {
        let mut reg = ConceptRegistry::new(8, 4, GrowthStrategy::Multiplicative { factor: 1.5 });
        let ids: Vec<_> = vectors
            .iter()
            .map(|v| reg.add_semantic_concept(v, Modality::Text, false, &[], ConceptMetadata::new()))
            .collect();
        let target = ids[pick.index(ids.len())];
        let query = reg.get_embedding(target).expect("stored");

        let hits = reg.find_similar(&query, ids.len(), None);
        prop_assert_eq!(hits.len(), ids.len());
        prop_assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
        prop_assert!((hits[0].1 - 1.0).abs() < 1e-5);
        prop_assert!(hits.iter().any(|&(id, sim)| id == target && (sim - 1.0).abs() < 1e-5));
        prop_assert_eq!(reg.find_similar(&query, ids.len(), None), hits);
    }
}

// ---------------------------------------------------------------------------
// Vector store
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn growth_preserves_every_slot(
        vectors in prop::collection::vec(arb_vector(12), 1..16),
        extra in 1u32..64,
    ) {
        let count = u32::try_from(vectors.len()).expect("small");
        let mut store = VectorStore::allocate(count, 6);
        for (slot, v) in (0..count).zip(&vectors) {
            store.write(slot, v).expect("in bounds");
        }
        let before: Vec<_> = (0..count).map(|s| store.read(s)).collect();

        store.grow(extra);
        prop_assert_eq!(store.capacity(), count + extra);
        let after: Vec<_> = (0..count).map(|s| store.read(s)).collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(store.read(count), Some(vec![0.0; 6]));
    }
}

// ---------------------------------------------------------------------------
// Pattern tracker
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn pattern_count_never_exceeds_capacity(keys in arb_keys(), capacity in 1usize..12) {
        let mut tracker = PatternTracker::new(capacity, 1);
        for key in &keys {
            tracker.observe(key, Some("ctx"), false, Modality::Text);
            prop_assert!(tracker.len() <= capacity);
        }
    }
}

proptest! {
    #[test]
    fn evicted_patterns_had_the_lowest_utility(keys in arb_keys(), capacity in 1usize..8) {
        let mut tracker = PatternTracker::new(capacity, 1);
        for key in &keys {
            let mut before = utilities(&tracker);
            // Utility the observed key carries at eviction time.
            let updated = match tracker.pattern(key) {
                Some(p) => 0.9 * p.utility + 0.1 * (f64::from(p.frequency) + 2.0),
                None => 2.0,
            };
            before.insert(key.clone(), updated);

            tracker.observe(key, None, false, Modality::Text);
            let after = utilities(&tracker);

            let floor = after.values().copied().fold(f64::INFINITY, f64::min);
            for (gone, utility) in before.iter().filter(|(k, _)| !after.contains_key(*k)) {
                prop_assert!(*utility <= floor + 1e-12, "{} ({}) evicted above {}", gone, utility, floor);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn promotion_needs_exactly_min_frequency(min in 2u32..7, sightings in 1u32..10) {
        let registry = ConceptRegistry::new(16, 8, GrowthStrategy::default()).into_shared();
        let patterns = PatternTracker::new(100, min).into_shared();
        let config = SegmentationConfig { min_segment_frequency: min, ..SegmentationConfig::default() };
        let mut segmenter = Segmenter::new(registry.clone(), patterns, config);

        let units = vec!["wo".to_string(), "rd".to_string()];
        for _ in 0..sightings {
            segmenter.segment(SegmentInput::Units(&units), None, false);
        }
        let promoted = registry.read().find_by_source("word").is_some();
        prop_assert_eq!(promoted, sightings >= min);
    }
}
