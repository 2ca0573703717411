//! Segmenter: cuts unit sequences into segments and resolves each segment to
//! a [`ConceptRef`].
//!
//! Pipeline for one input:
//!
//! 1. cache lookup (plain text, no raw segments requested)
//! 2. split into units and encode each with the [`UnitEncoder`]
//! 3. score adjacent gaps with the [`BoundaryScorer`]
//! 4. cut where the score exceeds `boundary_threshold`; chop spans longer
//!    than `max_segment_length` into fixed chunks
//! 5. observe every segment in the pattern tracker, then resolve it:
//!    existing concept, promotion, or per-unit fallback
//!
//! The segmenter holds clones of the shared registry and tracker handles.
//! Both write locks are held for the resolution step, registry first.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, span, warn, Level};

use crate::config::SegmentationConfig;
use crate::encoding::{BoundaryScorer, CosineBoundaryScorer, UnitEncoder};
use crate::metrics::{spans, ConceptCounters};
use crate::patterns::SharedPatterns;
use crate::registry::SharedRegistry;
use crate::types::{mean_pool, ConceptRef, Modality};

/// Input to [`Segmenter::segment`].
#[derive(Debug, Clone, Copy)]
pub enum SegmentInput<'a> {
    /// Raw text; every `char` is one unit. Eligible for the result cache.
    Text(&'a str),
    /// Pre-tokenized units. Never cached.
    Units(&'a [String]),
}

impl<'a> From<&'a str> for SegmentInput<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a [String]> for SegmentInput<'a> {
    fn from(units: &'a [String]) -> Self {
        Self::Units(units)
    }
}

/// Output of [`Segmenter::segment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// One reference per segment, in input order.
    pub concept_refs: Vec<ConceptRef>,
    /// The segment strings, when requested.
    pub segments: Option<Vec<String>>,
    /// Whether this came from the result cache.
    pub cached: bool,
}

/// Segmenter summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmenterStats {
    /// Segmentations computed (cache misses).
    pub total_segmentations: u64,
    /// Segmentations answered from the cache.
    pub cache_hits: u64,
    /// `cache_hits / (cache_hits + total_segmentations)`, 0 before any call.
    pub cache_hit_rate: f64,
    /// Entries currently cached.
    pub cached_entries: usize,
    /// Patterns at or above the promotion frequency, private included.
    pub distinct_frequent_patterns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    modality: Modality,
    private_context: Option<String>,
}

/// Boundary-driven segmenter with concept resolution and a result cache.
pub struct Segmenter {
    registry: SharedRegistry,
    patterns: SharedPatterns,
    encoder: Arc<dyn UnitEncoder>,
    scorer: Arc<dyn BoundaryScorer>,
    config: SegmentationConfig,
    cache: LruCache<CacheKey, Vec<ConceptRef>>,
    modality: Modality,
    private_context: Option<String>,
    total_segmentations: u64,
    cache_hits: u64,
    counters: Arc<ConceptCounters>,
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("encoder", &self.encoder.name())
            .field("modality", &self.modality)
            .field("private_context", &self.private_context)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Segmenter {
    /// Create a segmenter over shared components.
    ///
    /// Uses the registry's encoder and the default [`CosineBoundaryScorer`].
    #[must_use]
    pub fn new(registry: SharedRegistry, patterns: SharedPatterns, config: SegmentationConfig) -> Self {
        let encoder = registry.read().encoder();
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            patterns,
            encoder,
            scorer: Arc::new(CosineBoundaryScorer),
            config,
            cache: LruCache::new(capacity),
            modality: Modality::Text,
            private_context: None,
            total_segmentations: 0,
            cache_hits: 0,
            counters: Arc::new(ConceptCounters::new()),
        }
    }

    /// Replace the unit encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn UnitEncoder>) -> Self {
        self.encoder = encoder;
        self.cache.clear();
        self
    }

    /// Replace the boundary scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn BoundaryScorer>) -> Self {
        self.scorer = scorer;
        self.cache.clear();
        self
    }

    /// Report into a shared set of counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ConceptCounters>) -> Self {
        self.counters = counters;
        self
    }

    // -- state ------------------------------------------------------------------

    /// Current default modality.
    #[must_use]
    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Set the default modality by name. Unknown names are rejected and
    /// leave the state unchanged.
    pub fn set_modality(&mut self, name: &str) -> bool {
        match name.parse::<Modality>() {
            Ok(modality) => {
                self.modality = modality;
                true
            }
            Err(e) => {
                warn!(error = %e, "Modality change rejected");
                false
            }
        }
    }

    /// Mark everything created or observed from now on as private, tallied
    /// under `name`.
    pub fn set_private_context(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(context = %name, "Private context set");
        self.private_context = Some(name);
    }

    /// Leave the private context.
    pub fn clear_private_context(&mut self) {
        self.private_context = None;
    }

    /// Active private context, if any.
    #[must_use]
    pub fn private_context(&self) -> Option<&str> {
        self.private_context.as_deref()
    }

    /// Drop every cached result.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    // -- segmentation -------------------------------------------------------------

    /// Segment `input` and resolve every segment to a concept reference.
    ///
    /// `modality` defaults to the segmenter's current modality. Raw segment
    /// strings are returned when `return_segments` is set; such calls, and
    /// [`SegmentInput::Units`] calls, bypass the cache. Empty input yields an
    /// empty result.
    pub fn segment(
        &mut self,
        input: SegmentInput<'_>,
        modality: Option<Modality>,
        return_segments: bool,
    ) -> SegmentationResult {
        let modality = modality.unwrap_or(self.modality);

        let cache_key = match input {
            SegmentInput::Text(text) if !return_segments => Some(CacheKey {
                text: text.to_string(),
                modality,
                private_context: self.private_context.clone(),
            }),
            _ => None,
        };
        if let Some(key) = &cache_key {
            if let Some(refs) = self.cache.get(key) {
                self.cache_hits += 1;
                ConceptCounters::bump(&self.counters.cache_hits);
                return SegmentationResult {
                    concept_refs: refs.clone(),
                    segments: None,
                    cached: true,
                };
            }
        }

        let units: Vec<String> = match input {
            SegmentInput::Text(text) => text.chars().map(String::from).collect(),
            SegmentInput::Units(units) => units.to_vec(),
        };
        let _span = span!(Level::DEBUG, spans::SEGMENT, units = units.len(), %modality).entered();

        let embeddings = self.embed(&units);
        let ranges = self.extract(&units, &embeddings);
        let concept_refs = self.resolve(&units, &embeddings, &ranges, modality);

        self.total_segmentations += 1;
        ConceptCounters::bump(&self.counters.segmentations);
        debug!(units = units.len(), segments = ranges.len(), "Input segmented");

        if let Some(key) = cache_key {
            self.cache.put(key, concept_refs.clone());
        }
        let segments = return_segments.then(|| ranges.iter().map(|&(s, e)| units[s..e].concat()).collect());
        SegmentationResult {
            concept_refs,
            segments,
            cached: false,
        }
    }

    fn embed(&self, units: &[String]) -> Vec<Vec<f32>> {
        let dim = self.registry.read().dim();
        units
            .iter()
            .enumerate()
            .map(|(i, u)| self.encoder.encode_unit(u, i, dim))
            .collect()
    }

    /// Segment spans as `[start, end)` unit ranges.
    fn extract(&self, units: &[String], embeddings: &[Vec<f32>]) -> Vec<(usize, usize)> {
        if units.is_empty() {
            return Vec::new();
        }
        let scores = self.scorer.score(units, embeddings);
        let gaps = units.len() - 1;
        if scores.len() != gaps {
            warn!(expected = gaps, got = scores.len(), "Boundary scorer returned a mismatched score count");
        }

        let mut cuts = vec![0];
        cuts.extend(
            scores
                .iter()
                .take(gaps)
                .enumerate()
                .filter(|&(_, &s)| s > self.config.boundary_threshold)
                .map(|(i, _)| i + 1),
        );
        cuts.push(units.len());

        let max = self.config.max_segment_length.max(1);
        let mut ranges = Vec::new();
        for pair in cuts.windows(2) {
            let (mut start, end) = (pair[0], pair[1]);
            while start < end {
                let stop = (start + max).min(end);
                ranges.push((start, stop));
                start = stop;
            }
        }
        ranges
    }

    fn resolve(
        &self,
        units: &[String],
        embeddings: &[Vec<f32>],
        ranges: &[(usize, usize)],
        modality: Modality,
    ) -> Vec<ConceptRef> {
        if ranges.is_empty() {
            return Vec::new();
        }
        let context = self.private_context.as_deref();
        let private = context.is_some();

        let mut registry = self.registry.write();
        let mut patterns = self.patterns.write();
        let dim = registry.dim();

        ranges
            .iter()
            .map(|&(start, end)| {
                let key = units[start..end].concat();
                patterns.observe(&key, context, private, modality);

                if let Some(id) = registry.find_by_source(&key) {
                    registry.update_usage(id, context);
                    return ConceptRef::Single(id);
                }

                if patterns.frequency_of(&key) >= self.config.min_segment_frequency {
                    let pooled = mean_pool(&embeddings[start..end], dim);
                    let id = registry.add_segment_concept(&key, &pooled, modality, private);
                    debug!(id = id.0, key = %key, "Segment promoted");
                    return ConceptRef::Single(id);
                }

                ConceptRef::Sequence(
                    units[start..end]
                        .iter()
                        .map(|unit| registry.add_character_concept(unit, modality, private))
                        .collect(),
                )
            })
            .collect()
    }

    /// Counters and cache occupancy.
    #[must_use]
    pub fn stats(&self) -> SegmenterStats {
        let requests = self.cache_hits + self.total_segmentations;
        let cache_hit_rate = if requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / requests as f64
        };
        SegmenterStats {
            total_segmentations: self.total_segmentations,
            cache_hits: self.cache_hits,
            cache_hit_rate,
            cached_entries: self.cache.len(),
            distinct_frequent_patterns: self.patterns.read().frequent_patterns(usize::MAX, None, true).len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
