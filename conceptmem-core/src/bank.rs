//! The `ConceptMemory` facade: one explicitly owned instance per host.
//!
//! Wires a registry, a pattern tracker, a segmenter and a consolidation
//! engine around one set of counters. The registry and tracker live behind
//! shared handles so a host can hand them to other threads (exporters,
//! schedulers) while keeping the segmenter local.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConceptMemoryConfig;
use crate::consolidation::{ConsolidationEngine, ConsolidationReport};
use crate::error::Result;
use crate::metrics::{ConceptCounters, CounterSnapshot};
use crate::patterns::{PatternSyncRecord, PatternTracker, SharedPatterns};
use crate::registry::{ConceptRegistry, ConceptSyncRecord, RegistryStats, SharedRegistry};
use crate::segmentation::{SegmentInput, SegmentationResult, Segmenter, SegmenterStats};
use crate::types::{ConceptId, ConceptRef, Modality};

/// Combined statistics of every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Registry summary.
    pub registry: RegistryStats,
    /// Segmenter summary.
    pub segmenter: SegmenterStats,
    /// Tracked patterns.
    pub patterns: usize,
    /// Patterns awaiting export.
    pub patterns_sync_pending: usize,
    /// Counter values.
    pub counters: CounterSnapshot,
}

/// An adaptive concept memory.
#[derive(Debug)]
pub struct ConceptMemory {
    config: ConceptMemoryConfig,
    registry: SharedRegistry,
    patterns: SharedPatterns,
    segmenter: Segmenter,
    consolidation: ConsolidationEngine,
    counters: Arc<ConceptCounters>,
}

impl ConceptMemory {
    /// Build a memory from validated configuration.
    ///
    /// # Errors
    /// Returns `ConceptError::Config` if the configuration is invalid.
    pub fn new(config: ConceptMemoryConfig) -> Result<Self> {
        config.validate()?;
        let counters = Arc::new(ConceptCounters::new());

        let registry = ConceptRegistry::from_config(&config.storage)
            .with_counters(Arc::clone(&counters))
            .into_shared();
        let patterns = PatternTracker::from_config(&config.patterns, &config.segmentation)
            .with_counters(Arc::clone(&counters))
            .into_shared();
        let segmenter = Segmenter::new(
            Arc::clone(&registry),
            Arc::clone(&patterns),
            config.segmentation.clone(),
        )
        .with_counters(Arc::clone(&counters));
        let consolidation =
            ConsolidationEngine::from_config(&config.consolidation, &config.patterns).with_counters(Arc::clone(&counters));

        info!(
            dim = config.storage.concept_dim,
            capacity = config.storage.initial_capacity,
            pattern_capacity = config.patterns.pattern_capacity,
            "Concept memory initialised"
        );
        Ok(Self {
            config,
            registry,
            patterns,
            segmenter,
            consolidation,
            counters,
        })
    }

    /// The configuration this memory was built with.
    #[must_use]
    pub fn config(&self) -> &ConceptMemoryConfig {
        &self.config
    }

    /// Shared registry handle.
    #[must_use]
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Shared pattern tracker handle.
    #[must_use]
    pub fn patterns(&self) -> SharedPatterns {
        Arc::clone(&self.patterns)
    }

    /// Counters shared by every component.
    #[must_use]
    pub fn counters(&self) -> Arc<ConceptCounters> {
        Arc::clone(&self.counters)
    }

    /// The segmenter.
    #[must_use]
    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// The segmenter, for modality and private-context changes.
    pub fn segmenter_mut(&mut self) -> &mut Segmenter {
        &mut self.segmenter
    }

    // -- input ------------------------------------------------------------------

    /// Segment raw text in the current modality and return its concept refs.
    pub fn process_text(&mut self, text: &str) -> Vec<ConceptRef> {
        self.segmenter.segment(SegmentInput::Text(text), None, false).concept_refs
    }

    /// Full segmentation call. See [`Segmenter::segment`].
    pub fn segment(
        &mut self,
        input: SegmentInput<'_>,
        modality: Option<Modality>,
        return_segments: bool,
    ) -> SegmentationResult {
        self.segmenter.segment(input, modality, return_segments)
    }

    /// Nearest concepts to `query`. See [`ConceptRegistry::find_similar`].
    #[must_use]
    pub fn find_similar(&self, query: &[f32], top_k: usize, modality: Option<Modality>) -> Vec<(ConceptId, f64)> {
        self.registry.read().find_similar(query, top_k, modality)
    }

    // -- maintenance --------------------------------------------------------------

    /// Run one consolidation cycle.
    pub fn consolidate(&self) -> ConsolidationReport {
        self.consolidation.run_shared(&self.registry, &self.patterns)
    }

    // -- sync -------------------------------------------------------------------

    /// Pending shared concepts, ascending by id.
    #[must_use]
    pub fn concepts_for_sync(&self, limit: usize) -> Vec<ConceptSyncRecord> {
        self.registry.read().concepts_for_sync(limit)
    }

    /// Pending shared patterns, ascending by key.
    #[must_use]
    pub fn patterns_for_sync(&self, limit: usize) -> Vec<PatternSyncRecord> {
        self.patterns.read().patterns_for_sync(limit)
    }

    /// Acknowledge exported concepts.
    pub fn mark_concepts_synced(&self, ids: &[ConceptId]) -> usize {
        self.registry.write().mark_synced(ids)
    }

    /// Acknowledge exported patterns.
    pub fn mark_patterns_synced(&self, keys: &[String]) -> usize {
        self.patterns.write().mark_synced(keys)
    }

    /// Snapshot of every component.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let registry = self.registry.read().stats();
        let (patterns, patterns_sync_pending) = {
            let tracker = self.patterns.read();
            (tracker.len(), tracker.pending_sync_count())
        };
        MemoryStats {
            registry,
            segmenter: self.segmenter.stats(),
            patterns,
            patterns_sync_pending,
            counters: self.counters.snapshot(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
