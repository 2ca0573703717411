//! Runtime counters and tracing span names.
//!
//! Counters are plain `AtomicU64`s incremented on the hot path and read on
//! export. One [`ConceptCounters`] is shared via `Arc` by every component of
//! a [`crate::ConceptMemory`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for high-frequency events.
#[derive(Debug)]
pub struct ConceptCounters {
    /// Concepts allocated (all kinds, merges included).
    pub concepts_created: AtomicU64,
    /// Concepts produced by a merge.
    pub concepts_merged: AtomicU64,
    /// Vector store growth steps.
    pub store_growths: AtomicU64,
    /// Pattern observations.
    pub patterns_observed: AtomicU64,
    /// Patterns removed by capacity eviction.
    pub patterns_evicted: AtomicU64,
    /// Compound patterns committed by a merge.
    pub patterns_merged: AtomicU64,
    /// Patterns removed by utility pruning.
    pub patterns_pruned: AtomicU64,
    /// Segmentations actually computed (cache misses).
    pub segmentations: AtomicU64,
    /// Segmentations answered from the result cache.
    pub cache_hits: AtomicU64,
    /// Consolidation cycles completed.
    pub consolidation_cycles: AtomicU64,
}

impl ConceptCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            concepts_created: AtomicU64::new(0),
            concepts_merged: AtomicU64::new(0),
            store_growths: AtomicU64::new(0),
            patterns_observed: AtomicU64::new(0),
            patterns_evicted: AtomicU64::new(0),
            patterns_merged: AtomicU64::new(0),
            patterns_pruned: AtomicU64::new(0),
            segmentations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            consolidation_cycles: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            concepts_created: self.concepts_created.load(Ordering::Relaxed),
            concepts_merged: self.concepts_merged.load(Ordering::Relaxed),
            store_growths: self.store_growths.load(Ordering::Relaxed),
            patterns_observed: self.patterns_observed.load(Ordering::Relaxed),
            patterns_evicted: self.patterns_evicted.load(Ordering::Relaxed),
            patterns_merged: self.patterns_merged.load(Ordering::Relaxed),
            patterns_pruned: self.patterns_pruned.load(Ordering::Relaxed),
            segmentations: self.segmentations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            consolidation_cycles: self.consolidation_cycles.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConceptCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Concepts allocated.
    pub concepts_created: u64,
    /// Merged concepts.
    pub concepts_merged: u64,
    /// Vector store growth steps.
    pub store_growths: u64,
    /// Pattern observations.
    pub patterns_observed: u64,
    /// Patterns evicted.
    pub patterns_evicted: u64,
    /// Pattern merges committed.
    pub patterns_merged: u64,
    /// Patterns pruned.
    pub patterns_pruned: u64,
    /// Segmentations computed.
    pub segmentations: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Consolidation cycles.
    pub consolidation_cycles: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 10] = [
            ("conceptmem_concepts_created_total", "Concepts allocated", self.concepts_created),
            ("conceptmem_concepts_merged_total", "Concepts produced by merges", self.concepts_merged),
            ("conceptmem_store_growths_total", "Vector store growth steps", self.store_growths),
            ("conceptmem_patterns_observed_total", "Pattern observations", self.patterns_observed),
            ("conceptmem_patterns_evicted_total", "Patterns evicted at capacity", self.patterns_evicted),
            ("conceptmem_patterns_merged_total", "Compound patterns committed", self.patterns_merged),
            ("conceptmem_patterns_pruned_total", "Patterns pruned for low utility", self.patterns_pruned),
            ("conceptmem_segmentations_total", "Segmentations computed", self.segmentations),
            ("conceptmem_cache_hits_total", "Segmentations served from cache", self.cache_hits),
            ("conceptmem_consolidation_cycles_total", "Consolidation cycles run", self.consolidation_cycles),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Segmentation of one input.
    pub const SEGMENT: &str = "conceptmem::segment";
    /// Similarity scan over the registry.
    pub const FIND_SIMILAR: &str = "conceptmem::find_similar";
    /// Pattern eviction pass.
    pub const EVICT: &str = "conceptmem::evict";
    /// Consolidation cycle.
    pub const CONSOLIDATE: &str = "conceptmem::consolidate";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
