//! Concept memory benchmark suite.
//!
//! Hot paths:
//!   find_similar_top10_from_5000 ...... linear cosine scan, 768 dims
//!   pattern_observe_at_capacity ....... observe with an eviction pass
//!   segment_cold_sentence ............. boundary scoring + resolution
//!   segment_cached_sentence ........... LRU hit

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conceptmem_core::registry::ConceptMetadata;
use conceptmem_core::store::GrowthStrategy;
use conceptmem_core::{ConceptMemory, ConceptMemoryConfig, ConceptRegistry, Modality, PatternTracker};

const DIM: u32 = 768;

fn random_vector(rng: &mut StdRng, dim: u32) -> Vec<f32> {
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn populated_registry(count: usize) -> ConceptRegistry {
    let mut rng = StdRng::seed_from_u64(7);
    let mut registry = ConceptRegistry::new(DIM, 1000, GrowthStrategy::Fixed { increment: 1000 });
    for i in 0..count {
        let modality = if i % 4 == 0 { Modality::Image } else { Modality::Text };
        let v = random_vector(&mut rng, DIM);
        registry.add_semantic_concept(&v, modality, false, &[], ConceptMetadata::new());
    }
    registry
}

/// Benchmark: top-10 similarity over 5000 concepts.
fn bench_find_similar(c: &mut Criterion) {
    let registry = populated_registry(5000);
    let mut rng = StdRng::seed_from_u64(11);
    let query = random_vector(&mut rng, DIM);

    c.bench_function("find_similar_top10_from_5000", |b| {
        b.iter(|| black_box(registry.find_similar(black_box(&query), 10, None)));
    });
    c.bench_function("find_similar_top10_image_only", |b| {
        b.iter(|| black_box(registry.find_similar(black_box(&query), 10, Some(Modality::Image))));
    });
}

/// Benchmark: observing new keys into a full tracker.
fn bench_pattern_observe(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let keys: Vec<String> = (0..4096).map(|i| format!("k{i}-{}", rng.gen_range(0..64))).collect();

    c.bench_function("pattern_observe_at_capacity", |b| {
        b.iter_batched(
            || {
                let mut tracker = PatternTracker::new(1000, 5);
                for key in keys.iter().take(1000) {
                    tracker.observe(key, None, false, Modality::Text);
                }
                tracker
            },
            |mut tracker| {
                for key in keys.iter().skip(1000).take(64) {
                    tracker.observe(black_box(key), Some("bench"), false, Modality::Text);
                }
                tracker
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: segmenting a sentence cold and from cache.
fn bench_segment(c: &mut Criterion) {
    let sentence = "the quick brown fox jumps over the lazy dog, again and again";

    c.bench_function("segment_cold_sentence", |b| {
        b.iter_batched(
            || ConceptMemory::new(ConceptMemoryConfig::default()).expect("default config is valid"),
            |mut memory| black_box(memory.process_text(black_box(sentence))),
            BatchSize::LargeInput,
        );
    });

    let mut memory = ConceptMemory::new(ConceptMemoryConfig::default()).expect("default config is valid");
    memory.process_text(sentence);
    c.bench_function("segment_cached_sentence", |b| {
        b.iter(|| black_box(memory.process_text(black_box(sentence))));
    });
}

criterion_group!(
    benches,
    bench_find_similar,
    bench_pattern_observe,
    bench_segment
);
criterion_main!(benches);
