//! Consolidation: the periodic merge and prune pass.
//!
//! Nothing in the core schedules this. A host calls
//! [`ConsolidationEngine::run_cycle`] (or [`run_shared`](ConsolidationEngine::run_shared))
//! on whatever cadence suits it; each call is one bounded cycle:
//!
//!   1. rank live concepts by frequency and take the top `candidate_pool`
//!   2. merge each candidate with its nearest untouched neighbour in the same
//!      modality when cosine similarity clears `similarity_threshold`
//!   3. concatenate pairs of frequent patterns into compound patterns
//!   4. decay every pattern utility, then prune the ones that fell too low
//!
//! Merging is one-way. Parents keep their ids and embeddings; with
//! `retire_merged_parents` their frequency drops to zero so they leave the
//! candidate ranking. A concept that already has a merged child is never
//! merged again, even after later usage revives its frequency.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, Level};

use crate::config::{ConsolidationConfig, PatternConfig};
use crate::metrics::{spans, ConceptCounters};
use crate::patterns::{PatternTracker, SharedPatterns};
use crate::registry::{ConceptRegistry, SharedRegistry};
use crate::types::ConceptId;

/// What one cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// `(parent_a, parent_b, merged)` per concept merge.
    pub merged_concepts: Vec<(ConceptId, ConceptId, ConceptId)>,
    /// Compound pattern keys committed.
    pub merged_patterns: Vec<String>,
    /// Patterns removed by the utility floor.
    pub patterns_pruned: usize,
}

impl ConsolidationReport {
    /// Whether the cycle changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.merged_concepts.is_empty() && self.merged_patterns.is_empty() && self.patterns_pruned == 0
    }
}

/// Runs consolidation cycles with fixed tuning.
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    config: ConsolidationConfig,
    utility_decay: f64,
    counters: Arc<ConceptCounters>,
}

impl ConsolidationEngine {
    /// Create an engine. `utility_decay` is applied to every pattern once
    /// per cycle.
    #[must_use]
    pub fn new(config: ConsolidationConfig, utility_decay: f64) -> Self {
        Self {
            config,
            utility_decay,
            counters: Arc::new(ConceptCounters::new()),
        }
    }

    /// Create an engine from the `[consolidation]` and `[patterns]` sections.
    #[must_use]
    pub fn from_config(consolidation: &ConsolidationConfig, patterns: &PatternConfig) -> Self {
        Self::new(consolidation.clone(), patterns.utility_decay)
    }

    /// Report into a shared set of counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ConceptCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// The tuning in use.
    #[must_use]
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Run one cycle on shared handles, write-locking the registry first.
    pub fn run_shared(&self, registry: &SharedRegistry, patterns: &SharedPatterns) -> ConsolidationReport {
        let mut registry = registry.write();
        let mut patterns = patterns.write();
        self.run_cycle(&mut registry, &mut patterns)
    }

    /// Run one cycle.
    pub fn run_cycle(&self, registry: &mut ConceptRegistry, patterns: &mut PatternTracker) -> ConsolidationReport {
        let _span = span!(Level::DEBUG, spans::CONSOLIDATE).entered();

        let merged_concepts = self.merge_concepts(registry);
        let merged_patterns = self.merge_patterns(patterns);
        patterns.decay_utilities(self.utility_decay);
        let patterns_pruned = patterns.prune(self.config.prune_utility_threshold);

        ConceptCounters::bump(&self.counters.consolidation_cycles);
        info!(
            concept_merges = merged_concepts.len(),
            pattern_merges = merged_patterns.len(),
            patterns_pruned,
            concepts = registry.len(),
            patterns = patterns.len(),
            "Consolidation cycle complete"
        );

        ConsolidationReport {
            merged_concepts,
            merged_patterns,
            patterns_pruned,
        }
    }

    fn merge_concepts(&self, registry: &mut ConceptRegistry) -> Vec<(ConceptId, ConceptId, ConceptId)> {
        let mut merges = Vec::new();
        if self.config.max_concept_merges == 0 {
            return merges;
        }

        let candidates = registry.most_frequent(self.config.candidate_pool);
        let mut touched: HashSet<ConceptId> = HashSet::new();

        for (candidate, _) in candidates {
            if merges.len() >= self.config.max_concept_merges {
                break;
            }
            if touched.contains(&candidate) || registry.was_merged(candidate) {
                continue;
            }
            let (Some(query), Some(modality)) = (registry.get_embedding(candidate), registry.modality(candidate)) else {
                continue;
            };

            let partner = registry
                .find_similar(&query, registry.len(), Some(modality))
                .into_iter()
                .take_while(|&(_, sim)| sim >= self.config.similarity_threshold)
                .map(|(id, _)| id)
                .find(|&id| {
                    id != candidate
                        && !touched.contains(&id)
                        && !registry.was_merged(id)
                        && registry.frequency(id).unwrap_or(0) > 0
                });
            let Some(partner) = partner else {
                continue;
            };

            let Some(merged) = registry.merge(candidate, partner, false, None) else {
                continue;
            };
            if self.config.retire_merged_parents {
                registry.retire(candidate);
                registry.retire(partner);
            }
            touched.extend([candidate, partner, merged]);
            debug!(a = candidate.0, b = partner.0, merged = merged.0, "Consolidated concepts");
            merges.push((candidate, partner, merged));
        }
        merges
    }

    fn merge_patterns(&self, patterns: &mut PatternTracker) -> Vec<String> {
        let limit = self.config.max_pattern_merges.saturating_mul(2);
        let frequent = patterns.frequent_patterns(limit, None, true);

        frequent
            .chunks_exact(2)
            .filter_map(|pair| patterns.merge(&pair[0].0, &pair[1].0, false, None))
            .take(self.config.max_pattern_merges)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConceptMetadata;
    use crate::store::GrowthStrategy;
    use crate::types::Modality;

    fn registry() -> ConceptRegistry {
        ConceptRegistry::new(4, 8, GrowthStrategy::Fixed { increment: 8 })
    }

    fn semantic(reg: &mut ConceptRegistry, v: &[f32], modality: Modality) -> ConceptId {
        reg.add_semantic_concept(v, modality, false, &[], ConceptMetadata::new())
    }

    fn engine(config: ConsolidationConfig) -> ConsolidationEngine {
        ConsolidationEngine::new(config, 0.95)
    }

    #[test]
    fn merges_near_duplicates_and_retires_parents() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        let a = semantic(&mut reg, &[1.0, 0.0, 0.0, 0.0], Modality::Text);
        let b = semantic(&mut reg, &[1.0, 0.01, 0.0, 0.0], Modality::Text);
        let c = semantic(&mut reg, &[0.0, 1.0, 0.0, 0.0], Modality::Text);

        let report = engine(ConsolidationConfig::default()).run_cycle(&mut reg, &mut pats);
        assert_eq!(report.merged_concepts.len(), 1);
        let (pa, pb, merged) = report.merged_concepts[0];
        assert_eq!((pa, pb), (a, b));
        assert_eq!(reg.frequency(a), Some(0));
        assert_eq!(reg.frequency(b), Some(0));
        assert_eq!(reg.frequency(c), Some(1));
        assert_eq!(reg.frequency(merged), Some(2));
        assert_eq!(reg.concept(merged).expect("exists").parents, Some((a, b)));
    }

    #[test]
    fn respects_modality_and_threshold() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        semantic(&mut reg, &[1.0, 0.0, 0.0, 0.0], Modality::Text);
        semantic(&mut reg, &[1.0, 0.0, 0.0, 0.0], Modality::Image);
        semantic(&mut reg, &[0.0, 0.0, 1.0, 0.0], Modality::Text);

        let report = engine(ConsolidationConfig::default()).run_cycle(&mut reg, &mut pats);
        assert!(report.merged_concepts.is_empty());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn keeps_parents_live_when_not_retiring() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        let a = semantic(&mut reg, &[0.0, 1.0, 0.0, 0.0], Modality::Audio);
        semantic(&mut reg, &[0.0, 1.0, 0.0, 0.0], Modality::Audio);

        let config = ConsolidationConfig {
            retire_merged_parents: false,
            ..ConsolidationConfig::default()
        };
        let report = engine(config).run_cycle(&mut reg, &mut pats);
        assert_eq!(report.merged_concepts.len(), 1);
        assert_eq!(reg.frequency(a), Some(1));
    }

    #[test]
    fn revived_parent_does_not_remerge_with_its_child() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        let a = semantic(&mut reg, &[1.0, 0.0, 0.0, 0.0], Modality::Text);
        semantic(&mut reg, &[1.0, 0.01, 0.0, 0.0], Modality::Text);
        let engine = engine(ConsolidationConfig::default());

        let first = engine.run_cycle(&mut reg, &mut pats);
        assert_eq!(first.merged_concepts.len(), 1);
        assert_eq!(reg.len(), 3);

        for _ in 0..4 {
            // Segmentation resolving the parent's source bumps it back to life.
            reg.update_usage(a, None);
            assert!(reg.frequency(a).unwrap_or(0) > 0);
            let report = engine.run_cycle(&mut reg, &mut pats);
            assert!(report.merged_concepts.is_empty());
            assert_eq!(reg.len(), 3);
        }
    }

    #[test]
    fn merged_parents_stay_out_without_retiring() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        semantic(&mut reg, &[0.0, 0.0, 1.0, 0.0], Modality::Text);
        semantic(&mut reg, &[0.0, 0.0, 1.0, 0.0], Modality::Text);
        let engine = engine(ConsolidationConfig {
            retire_merged_parents: false,
            ..ConsolidationConfig::default()
        });

        assert_eq!(engine.run_cycle(&mut reg, &mut pats).merged_concepts.len(), 1);
        assert!(engine.run_cycle(&mut reg, &mut pats).merged_concepts.is_empty());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn caps_concept_merges_per_cycle() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 5);
        for _ in 0..6 {
            semantic(&mut reg, &[0.0, 0.0, 0.0, 1.0], Modality::Text);
        }
        let config = ConsolidationConfig {
            max_concept_merges: 2,
            ..ConsolidationConfig::default()
        };
        let report = engine(config).run_cycle(&mut reg, &mut pats);
        assert_eq!(report.merged_concepts.len(), 2);
        assert_eq!(reg.len(), 8);
    }

    #[test]
    fn merges_frequent_patterns_then_decays_and_prunes() {
        let mut reg = registry();
        let mut pats = PatternTracker::new(100, 2);
        for (key, n) in [("x", 3), ("y", 2), ("z", 2), ("w", 1)] {
            for _ in 0..n {
                pats.observe(key, None, false, Modality::Text);
            }
        }
        let config = ConsolidationConfig {
            prune_utility_threshold: 1.95,
            ..ConsolidationConfig::default()
        };

        let report = engine(config).run_cycle(&mut reg, &mut pats);
        assert_eq!(report.merged_patterns, vec!["xy".to_string()]);
        // w: 2.0 * 0.95 = 1.9 falls under the floor.
        assert_eq!(report.patterns_pruned, 1);
        assert!(pats.pattern("w").is_none());
        assert_eq!(pats.frequency_of("xy"), 2);
        let x = pats.pattern("x").expect("kept");
        // 0.9 * (0.9 * 2 + 0.3) + 0.4 = 2.29, decayed once.
        assert!((x.utility - 2.29 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn shared_handles_run_the_same_cycle() {
        let mut reg = registry();
        semantic(&mut reg, &[1.0, 1.0, 0.0, 0.0], Modality::Text);
        semantic(&mut reg, &[1.0, 1.0, 0.0, 0.0], Modality::Text);
        let reg = reg.into_shared();
        let pats = PatternTracker::new(10, 5).into_shared();

        let report = engine(ConsolidationConfig::default()).run_shared(&reg, &pats);
        assert_eq!(report.merged_concepts.len(), 1);
        assert!(!report.is_empty());
        assert_eq!(reg.read().len(), 3);
    }
}
