//! Concept Registry: stable ids for recurring units of input.
//!
//! The registry owns one [`VectorStore`] and all concept metadata. Concept
//! ids are dense slot indices into that store, assigned in creation order
//! and never reclaimed: consolidation "retires" a concept by zeroing its
//! frequency but the id stays valid, because callers may hold it.
//!
//! Indexes kept alongside the metadata:
//!
//! - `source key -> id` for character-sequence concepts
//! - `modality -> ids` for scoped similarity search
//! - the private id set and the pending-sync set
//!
//! Unknown ids are never an error. Reads return `None`, usage updates are
//! ignored.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, span, Level};

use crate::config::StorageConfig;
use crate::encoding::{SinusoidalEncoder, UnitEncoder};
use crate::metrics::{spans, ConceptCounters};
use crate::store::{GrowthStrategy, VectorStore};
use crate::types::{cosine_similarity, fit_to_dim, l2_normalize, now_millis, ConceptId, ConceptKind, Modality, Visibility};

/// How many concepts [`ConceptRegistry::stats`] lists by frequency.
pub const TOP_CONCEPTS: usize = 10;

/// A registry behind a read-write lock, shared between the segmenter, the
/// consolidation pass and any sync exporter.
pub type SharedRegistry = Arc<RwLock<ConceptRegistry>>;

/// Free-form metadata attached to semantic and merged concepts.
pub type ConceptMetadata = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ConceptMeta {
    kind: ConceptKind,
    source_key: Option<String>,
    modality: Modality,
    visibility: Visibility,
    parents: Option<(ConceptId, ConceptId)>,
    merged_into: Vec<ConceptId>,
    created_at: f64,
    contexts: BTreeMap<String, u32>,
    related_sources: Vec<String>,
    metadata: ConceptMetadata,
}

impl ConceptMeta {
    fn new(kind: ConceptKind, modality: Modality, visibility: Visibility) -> Self {
        Self {
            kind,
            source_key: None,
            modality,
            visibility,
            parents: None,
            merged_into: Vec::new(),
            created_at: now_millis(),
            contexts: BTreeMap::new(),
            related_sources: Vec::new(),
            metadata: ConceptMetadata::new(),
        }
    }
}

/// Owned snapshot of one concept's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptInfo {
    /// The concept's id.
    pub id: ConceptId,
    /// How the concept was created.
    pub kind: ConceptKind,
    /// Source string, for character-sequence concepts.
    pub source_key: Option<String>,
    /// Content modality.
    pub modality: Modality,
    /// Export visibility.
    pub visibility: Visibility,
    /// The two concepts a merged concept was built from.
    pub parents: Option<(ConceptId, ConceptId)>,
    /// Merged concepts this one contributed to.
    pub merged_into: Vec<ConceptId>,
    /// Usage count (0 once retired).
    pub frequency: u32,
    /// Creation time, epoch milliseconds.
    pub created_at: f64,
    /// Last use, epoch milliseconds.
    pub last_used_at: f64,
    /// Per-context usage tallies.
    pub contexts: BTreeMap<String, u32>,
    /// Source keys a semantic concept was derived from.
    pub related_sources: Vec<String>,
    /// Free-form metadata.
    pub metadata: ConceptMetadata,
}

/// One pending concept, as pulled by an external sync collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSyncRecord {
    /// Registry-local id; pass back to [`ConceptRegistry::mark_synced`].
    pub local_id: ConceptId,
    /// Source string, if any.
    pub source: Option<String>,
    /// Concept kind.
    pub kind: ConceptKind,
    /// Usage count at export time.
    pub frequency: u32,
    /// Unit-length embedding.
    pub embedding: Vec<f32>,
    /// Creation time, epoch milliseconds.
    pub created_at: f64,
    /// Content modality.
    pub modality: Modality,
}

/// Concept counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    /// Character-sequence concepts (single characters and promoted segments).
    pub character_sequence: usize,
    /// Semantic concepts.
    pub semantic: usize,
    /// Merged concepts.
    pub merged: usize,
}

/// Registry summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Concepts allocated.
    pub total: usize,
    /// Counts by kind.
    pub by_kind: KindCounts,
    /// Counts by modality.
    pub by_modality: BTreeMap<Modality, usize>,
    /// Most used concepts: id, source key, frequency.
    pub top_by_frequency: Vec<(ConceptId, Option<String>, u32)>,
    /// Concepts awaiting export.
    pub sync_pending: usize,
    /// Private concepts.
    pub private: usize,
    /// Allocated vector store slots.
    pub capacity: u32,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps source keys and semantic vectors to stable concept ids.
pub struct ConceptRegistry {
    store: VectorStore,
    growth: GrowthStrategy,
    encoder: Arc<dyn UnitEncoder>,
    concepts: Vec<ConceptMeta>,
    by_source: HashMap<String, ConceptId>,
    by_modality: HashMap<Modality, BTreeSet<ConceptId>>,
    private: HashSet<ConceptId>,
    pending_sync: BTreeSet<ConceptId>,
    counters: Arc<ConceptCounters>,
}

impl fmt::Debug for ConceptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConceptRegistry")
            .field("concepts", &self.concepts.len())
            .field("capacity", &self.store.capacity())
            .field("dim", &self.store.dim())
            .field("encoder", &self.encoder.name())
            .finish_non_exhaustive()
    }
}

impl ConceptRegistry {
    /// Create an empty registry with `initial_capacity` preallocated slots.
    #[must_use]
    pub fn new(dim: u32, initial_capacity: u32, growth: GrowthStrategy) -> Self {
        Self {
            store: VectorStore::allocate(initial_capacity, dim),
            growth,
            encoder: Arc::new(SinusoidalEncoder),
            concepts: Vec::new(),
            by_source: HashMap::new(),
            by_modality: HashMap::new(),
            private: HashSet::new(),
            pending_sync: BTreeSet::new(),
            counters: Arc::new(ConceptCounters::new()),
        }
    }

    /// Create a registry from the `[storage]` config section.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.concept_dim, config.initial_capacity, config.growth())
    }

    /// Replace the key encoder used by [`add_character_concept`](Self::add_character_concept).
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn UnitEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Report into a shared set of counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ConceptCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Wrap in a [`SharedRegistry`] handle.
    #[must_use]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.store.dim()
    }

    /// Number of concepts allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Whether no concept has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Allocated vector store slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.store.capacity()
    }

    /// The encoder shared with segmenters built on this registry.
    #[must_use]
    pub fn encoder(&self) -> Arc<dyn UnitEncoder> {
        Arc::clone(&self.encoder)
    }

    fn meta(&self, id: ConceptId) -> Option<&ConceptMeta> {
        self.concepts.get(id.index())
    }

    // -- creation -----------------------------------------------------------

    /// Allocate the next id, store its normalized embedding and index it.
    #[allow(clippy::cast_possible_truncation)]
    fn allocate(&mut self, embedding: &[f32], meta: ConceptMeta) -> ConceptId {
        debug_assert!(self.concepts.len() < u32::MAX as usize, "concept id space exhausted");
        let slot = self.concepts.len() as u32;
        if slot >= self.store.capacity() {
            let extra = self.growth.extra_for(self.store.capacity());
            self.store.grow(extra);
            ConceptCounters::bump(&self.counters.store_growths);
        }

        let written = self
            .store
            .write(slot, embedding)
            .and_then(|()| self.store.normalize(slot));
        debug_assert!(written.is_ok(), "slot {slot} out of bounds after growth");
        self.store.set_frequency(slot, 1);
        self.store.touch(slot, meta.created_at);

        let id = ConceptId(slot);
        if let Some(key) = &meta.source_key {
            self.by_source.insert(key.clone(), id);
        }
        self.by_modality.entry(meta.modality).or_default().insert(id);
        if meta.visibility.is_private() {
            self.private.insert(id);
        } else {
            self.pending_sync.insert(id);
        }
        debug!(
            id = id.0,
            kind = ?meta.kind,
            modality = %meta.modality,
            source = meta.source_key.as_deref().unwrap_or(""),
            "Concept created"
        );
        self.concepts.push(meta);
        ConceptCounters::bump(&self.counters.concepts_created);
        id
    }

    fn add_keyed(&mut self, key: &str, embedding: &[f32], modality: Modality, private: bool) -> ConceptId {
        let mut meta = ConceptMeta::new(ConceptKind::CharacterSequence, modality, Visibility::from_private(private));
        meta.source_key = Some(key.to_string());
        self.allocate(embedding, meta)
    }

    /// Find or create the character-sequence concept for `key`.
    ///
    /// Idempotent: an existing key returns its id with no mutation at all
    /// (frequency, embedding and visibility are untouched). New concepts get
    /// the encoder's deterministic key encoding, normalized.
    pub fn add_character_concept(&mut self, key: &str, modality: Modality, private: bool) -> ConceptId {
        if let Some(&id) = self.by_source.get(key) {
            return id;
        }
        let embedding = self.encoder.encode_key(key, self.dim());
        self.add_keyed(key, &embedding, modality, private)
    }

    /// Find or create the character-sequence concept for a promoted segment.
    ///
    /// Same idempotent semantics as
    /// [`add_character_concept`](Self::add_character_concept), but a new
    /// concept is seeded with `pooled`, the segment's mean-pooled unit
    /// embedding.
    pub fn add_segment_concept(&mut self, key: &str, pooled: &[f32], modality: Modality, private: bool) -> ConceptId {
        if let Some(&id) = self.by_source.get(key) {
            return id;
        }
        self.add_keyed(key, pooled, modality, private)
    }

    /// Create a semantic concept from a caller-supplied vector.
    ///
    /// The vector is truncated or zero-padded to the registry dimension, then
    /// normalized. Never deduplicated: every call allocates a new id.
    pub fn add_semantic_concept(
        &mut self,
        vector: &[f32],
        modality: Modality,
        private: bool,
        related_sources: &[String],
        metadata: ConceptMetadata,
    ) -> ConceptId {
        let embedding = fit_to_dim(vector, self.dim());
        let mut meta = ConceptMeta::new(ConceptKind::Semantic, modality, Visibility::from_private(private));
        meta.related_sources = related_sources.to_vec();
        meta.metadata = metadata;
        self.allocate(&embedding, meta)
    }

    // -- usage --------------------------------------------------------------

    /// Record one use of `id`, optionally tallied under `context`.
    ///
    /// Ignored for unknown ids. Shared concepts are re-queued for export.
    pub fn update_usage(&mut self, id: ConceptId, context: Option<&str>) {
        let Some(meta) = self.concepts.get_mut(id.index()) else {
            return;
        };
        if let Some(ctx) = context {
            *meta.contexts.entry(ctx.to_string()).or_insert(0) += 1;
        }
        let private = meta.visibility.is_private();
        self.store.increment_frequency(id.0);
        self.store.touch(id.0, now_millis());
        if !private {
            self.pending_sync.insert(id);
        }
    }

    /// Zero the frequency of `id`, marking it as merged away.
    ///
    /// The id, slot and embedding stay allocated. Ignored for unknown ids.
    pub fn retire(&mut self, id: ConceptId) {
        if id.index() >= self.concepts.len() {
            return;
        }
        self.store.set_frequency(id.0, 0);
        debug!(id = id.0, "Concept retired");
    }

    // -- lookup -------------------------------------------------------------

    /// Owned copy of the embedding of `id`.
    #[must_use]
    pub fn get_embedding(&self, id: ConceptId) -> Option<Vec<f32>> {
        self.meta(id)?;
        self.store.read(id.0)
    }

    /// Id of the character-sequence concept for `key`.
    #[must_use]
    pub fn find_by_source(&self, key: &str) -> Option<ConceptId> {
        self.by_source.get(key).copied()
    }

    /// Usage count of `id`.
    #[must_use]
    pub fn frequency(&self, id: ConceptId) -> Option<u32> {
        self.meta(id)?;
        self.store.frequency(id.0)
    }

    /// Whether `id` is already a parent of some merged concept.
    #[must_use]
    pub fn was_merged(&self, id: ConceptId) -> bool {
        self.meta(id).is_some_and(|m| !m.merged_into.is_empty())
    }

    /// Modality of `id`.
    #[must_use]
    pub fn modality(&self, id: ConceptId) -> Option<Modality> {
        self.meta(id).map(|m| m.modality)
    }

    /// All concepts by descending frequency, ties by lower id.
    fn ranked_by_frequency(&self, live_only: bool) -> Vec<(ConceptId, u32)> {
        let mut ranked: Vec<(ConceptId, u32)> = (0..self.concepts.len())
            .filter_map(|i| {
                let id = ConceptId(u32::try_from(i).ok()?);
                Some((id, self.store.frequency(id.0)?))
            })
            .filter(|&(_, freq)| !live_only || freq > 0)
            .collect();
        ranked.sort_by_key(|&(id, freq)| (std::cmp::Reverse(freq), id));
        ranked
    }

    /// Up to `limit` live (non-retired) concepts, most used first.
    #[must_use]
    pub fn most_frequent(&self, limit: usize) -> Vec<(ConceptId, u32)> {
        let mut ranked = self.ranked_by_frequency(true);
        ranked.truncate(limit);
        ranked
    }

    /// Snapshot of everything known about `id`.
    #[must_use]
    pub fn concept(&self, id: ConceptId) -> Option<ConceptInfo> {
        let meta = self.meta(id)?;
        Some(ConceptInfo {
            id,
            kind: meta.kind,
            source_key: meta.source_key.clone(),
            modality: meta.modality,
            visibility: meta.visibility,
            parents: meta.parents,
            merged_into: meta.merged_into.clone(),
            frequency: self.store.frequency(id.0).unwrap_or(0),
            created_at: meta.created_at,
            last_used_at: self.store.timestamp(id.0).unwrap_or(meta.created_at),
            contexts: meta.contexts.clone(),
            related_sources: meta.related_sources.clone(),
            metadata: meta.metadata.clone(),
        })
    }

    /// Up to `top_k` concepts most similar to `query`, best first.
    ///
    /// A linear scan over every concept, or over one modality when
    /// `modality` is given. Ties keep ascending id order, so repeated calls
    /// on an unchanged registry return identical orderings. A zero query
    /// scores 0 against everything.
    #[must_use]
    pub fn find_similar(&self, query: &[f32], top_k: usize, modality: Option<Modality>) -> Vec<(ConceptId, f64)> {
        let _span = span!(Level::DEBUG, spans::FIND_SIMILAR, top_k).entered();
        if top_k == 0 || self.concepts.is_empty() {
            return Vec::new();
        }

        let mut normalized = fit_to_dim(query, self.dim());
        l2_normalize(&mut normalized);

        let score = |id: ConceptId| {
            let sim = self
                .store
                .view(id.0)
                .map_or(0.0, |stored| cosine_similarity(&normalized, stored));
            (id, sim)
        };

        let mut scored: Vec<(ConceptId, f64)> = match modality {
            Some(m) => self
                .by_modality
                .get(&m)
                .map(|ids| ids.iter().copied().map(score).collect())
                .unwrap_or_default(),
            None => (0..self.concepts.len())
                .map(|i| score(ConceptId(u32::try_from(i).unwrap_or(u32::MAX))))
                .collect(),
        };

        // Stable: equal similarities keep ascending id order.
        scored.sort_by_key(|&(_, sim)| std::cmp::Reverse(OrderedFloat(sim)));
        scored.truncate(top_k);
        scored
    }

    // -- merging ------------------------------------------------------------

    /// Create a merged concept whose embedding is the normalized element-wise
    /// mean of `a` and `b`.
    ///
    /// Returns `None` if either id is unknown. The result is private if
    /// either parent is private or `force_private` is set. Its modality is
    /// `modality_override`, else the parents' shared modality, else
    /// [`Modality::Multimodal`]. Its frequency starts at the sum of the
    /// parents'. Parents are linked for provenance only; they are not
    /// modified apart from recording the child.
    pub fn merge(
        &mut self,
        a: ConceptId,
        b: ConceptId,
        force_private: bool,
        modality_override: Option<Modality>,
    ) -> Option<ConceptId> {
        let (meta_a, meta_b) = (self.meta(a)?, self.meta(b)?);
        let emb_a = self.store.read(a.0)?;
        let emb_b = self.store.read(b.0)?;

        let private = force_private || meta_a.visibility.is_private() || meta_b.visibility.is_private();
        let modality = modality_override.unwrap_or(if meta_a.modality == meta_b.modality {
            meta_a.modality
        } else {
            Modality::Multimodal
        });

        let mean: Vec<f32> = emb_a.iter().zip(emb_b.iter()).map(|(x, y)| (x + y) / 2.0).collect();

        let mut related: Vec<String> = Vec::new();
        for meta in [meta_a, meta_b] {
            if let Some(src) = &meta.source_key {
                related.push(src.clone());
            }
            related.extend(meta.related_sources.iter().cloned());
        }

        let mut meta = ConceptMeta::new(ConceptKind::Merged, modality, Visibility::from_private(private));
        meta.parents = Some((a, b));
        meta.related_sources = related;
        meta.metadata
            .insert("merged_from".to_string(), serde_json::json!([a.0, b.0]));

        let inherited = self
            .store
            .frequency(a.0)
            .unwrap_or(0)
            .saturating_add(self.store.frequency(b.0).unwrap_or(0));

        let id = self.allocate(&mean, meta);
        self.store.set_frequency(id.0, inherited.max(1));
        for parent in [a, b] {
            if let Some(p) = self.concepts.get_mut(parent.index()) {
                if !p.merged_into.contains(&id) {
                    p.merged_into.push(id);
                }
            }
        }
        ConceptCounters::bump(&self.counters.concepts_merged);
        debug!(a = a.0, b = b.0, merged = id.0, %modality, private, "Concepts merged");
        Some(id)
    }

    // -- stats & sync -------------------------------------------------------

    /// Summary counts plus the [`TOP_CONCEPTS`] most used concepts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut by_kind = KindCounts::default();
        for meta in &self.concepts {
            match meta.kind {
                ConceptKind::CharacterSequence => by_kind.character_sequence += 1,
                ConceptKind::Semantic => by_kind.semantic += 1,
                ConceptKind::Merged => by_kind.merged += 1,
            }
        }

        let by_modality = self
            .by_modality
            .iter()
            .map(|(m, ids)| (*m, ids.len()))
            .collect();

        let top_by_frequency = self
            .ranked_by_frequency(false)
            .into_iter()
            .take(TOP_CONCEPTS)
            .map(|(id, freq)| {
                let source = self.meta(id).and_then(|m| m.source_key.clone());
                (id, source, freq)
            })
            .collect();

        RegistryStats {
            total: self.concepts.len(),
            by_kind,
            by_modality,
            top_by_frequency,
            sync_pending: self.pending_sync.len(),
            private: self.private.len(),
            capacity: self.store.capacity(),
        }
    }

    /// Concepts awaiting export.
    #[must_use]
    pub fn pending_sync_count(&self) -> usize {
        self.pending_sync.len()
    }

    /// Up to `limit` pending shared concepts, ascending by id.
    ///
    /// Does not clear anything; acknowledge with
    /// [`mark_synced`](Self::mark_synced).
    #[must_use]
    pub fn concepts_for_sync(&self, limit: usize) -> Vec<ConceptSyncRecord> {
        self.pending_sync
            .iter()
            .filter(|id| !self.private.contains(id))
            .filter_map(|&id| {
                let meta = self.meta(id)?;
                Some(ConceptSyncRecord {
                    local_id: id,
                    source: meta.source_key.clone(),
                    kind: meta.kind,
                    frequency: self.store.frequency(id.0)?,
                    embedding: self.store.read(id.0)?,
                    created_at: meta.created_at,
                    modality: meta.modality,
                })
            })
            .take(limit)
            .collect()
    }

    /// Acknowledge exported concepts. Returns how many were pending.
    pub fn mark_synced(&mut self, ids: &[ConceptId]) -> usize {
        ids.iter().filter(|id| self.pending_sync.remove(id)).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::magnitude;

    fn registry() -> ConceptRegistry {
        ConceptRegistry::new(16, 4, GrowthStrategy::Fixed { increment: 4 })
    }

    #[test]
    fn character_concept_is_idempotent() {
        let mut reg = registry();
        let a = reg.add_character_concept("cat", Modality::Text, false);
        let before = reg.concept(a).expect("exists");
        let again = reg.add_character_concept("cat", Modality::Image, true);

        assert_eq!(a, again);
        assert_eq!(reg.len(), 1);
        let after = reg.concept(a).expect("exists");
        assert_eq!(before.frequency, after.frequency);
        assert_eq!(after.visibility, Visibility::Shared);
        assert_eq!(after.modality, Modality::Text);
        assert_eq!(reg.find_by_source("cat"), Some(a));
    }

    #[test]
    fn ids_are_dense_and_monotonic() {
        let mut reg = registry();
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|k| reg.add_character_concept(k, Modality::Text, false))
            .collect();
        assert_eq!(ids, vec![ConceptId(0), ConceptId(1), ConceptId(2)]);
    }

    #[test]
    fn embeddings_are_unit_length() {
        let mut reg = registry();
        let a = reg.add_character_concept("hello", Modality::Text, false);
        let s = reg.add_semantic_concept(&[3.0, 4.0], Modality::Text, false, &[], ConceptMetadata::new());
        for id in [a, s] {
            let e = reg.get_embedding(id).expect("exists");
            assert_eq!(e.len(), 16);
            assert!((magnitude(&e) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_semantic_vector_stays_zero() {
        let mut reg = registry();
        let id = reg.add_semantic_concept(&[], Modality::Audio, false, &[], ConceptMetadata::new());
        let e = reg.get_embedding(id).expect("exists");
        assert!(e.iter().all(|&x| x == 0.0));
        let hits = reg.find_similar(&e, 5, None);
        assert_eq!(hits, vec![(id, 0.0)]);
    }

    #[test]
    fn grows_past_initial_capacity_keeping_vectors() {
        let mut reg = registry();
        let first = reg.add_character_concept("first", Modality::Text, false);
        let before = reg.get_embedding(first).expect("exists");
        for i in 0..10 {
            reg.add_character_concept(&format!("k{i}"), Modality::Text, false);
        }
        assert!(reg.capacity() >= 11);
        assert_eq!(reg.get_embedding(first), Some(before));
    }

    #[test]
    fn update_usage_counts_and_tallies_context() {
        let mut reg = registry();
        let id = reg.add_character_concept("x", Modality::Text, false);
        reg.update_usage(id, Some("chat"));
        reg.update_usage(id, Some("chat"));
        reg.update_usage(id, None);

        let info = reg.concept(id).expect("exists");
        assert_eq!(info.frequency, 4);
        assert_eq!(info.contexts.get("chat"), Some(&2));
        assert!(info.last_used_at >= info.created_at);

        // Unknown ids are ignored.
        reg.update_usage(ConceptId(99), Some("chat"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_ids_return_none() {
        let reg = registry();
        assert!(reg.get_embedding(ConceptId(0)).is_none());
        assert!(reg.concept(ConceptId(3)).is_none());
        assert!(reg.find_by_source("nope").is_none());
    }

    #[test]
    fn find_similar_orders_descending_and_finds_self_first() {
        let mut reg = registry();
        let ids: Vec<_> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|k| reg.add_character_concept(k, Modality::Text, false))
            .collect();
        let query = reg.get_embedding(ids[2]).expect("exists");

        let hits = reg.find_similar(&query, 10, None);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].0, ids[2]);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));

        assert_eq!(reg.find_similar(&query, 2, None).len(), 2);
        assert!(reg.find_similar(&query, 0, None).is_empty());
    }

    #[test]
    fn find_similar_breaks_ties_by_lower_id() {
        let mut reg = registry();
        let a = reg.add_semantic_concept(&[1.0], Modality::Text, false, &[], ConceptMetadata::new());
        let b = reg.add_semantic_concept(&[1.0], Modality::Text, false, &[], ConceptMetadata::new());
        let hits = reg.find_similar(&[1.0], 2, None);
        assert_eq!(hits[0].0, a);
        assert_eq!(hits[1].0, b);
        assert_eq!(reg.find_similar(&[1.0], 2, None), hits);
    }

    #[test]
    fn find_similar_respects_modality_filter() {
        let mut reg = registry();
        reg.add_semantic_concept(&[1.0, 0.0], Modality::Text, false, &[], ConceptMetadata::new());
        let img = reg.add_semantic_concept(&[0.0, 1.0], Modality::Image, false, &[], ConceptMetadata::new());
        let hits = reg.find_similar(&[1.0, 0.0], 5, Some(Modality::Image));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, img);
        assert!(reg.find_similar(&[1.0], 5, Some(Modality::Audio)).is_empty());
    }

    #[test]
    fn merge_averages_and_links_parents() {
        let mut reg = registry();
        let a = reg.add_semantic_concept(&[1.0, 0.0], Modality::Text, false, &[], ConceptMetadata::new());
        let b = reg.add_semantic_concept(&[0.0, 1.0], Modality::Image, false, &[], ConceptMetadata::new());
        let m = reg.merge(a, b, false, None).expect("both exist");

        let info = reg.concept(m).expect("exists");
        assert_eq!(info.kind, ConceptKind::Merged);
        assert_eq!(info.modality, Modality::Multimodal);
        assert_eq!(info.parents, Some((a, b)));
        assert_eq!(info.frequency, 2);
        assert_eq!(reg.concept(a).expect("exists").merged_into, vec![m]);
        assert!(reg.was_merged(a) && reg.was_merged(b));
        assert!(!reg.was_merged(m));

        let e = reg.get_embedding(m).expect("exists");
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((e[0] - h).abs() < 1e-6 && (e[1] - h).abs() < 1e-6);
    }

    #[test]
    fn merge_visibility_and_overrides() {
        let mut reg = registry();
        let shared = reg.add_character_concept("s", Modality::Text, false);
        let hidden = reg.add_character_concept("p", Modality::Text, true);

        let m1 = reg.merge(shared, hidden, false, None).expect("exists");
        assert_eq!(reg.concept(m1).expect("exists").visibility, Visibility::Private);

        let m2 = reg.merge(shared, shared, true, Some(Modality::Audio)).expect("exists");
        let info = reg.concept(m2).expect("exists");
        assert_eq!(info.visibility, Visibility::Private);
        assert_eq!(info.modality, Modality::Audio);

        assert!(reg.merge(shared, ConceptId(999), false, None).is_none());
    }

    #[test]
    fn retire_zeroes_frequency_but_keeps_slot() {
        let mut reg = registry();
        let id = reg.add_character_concept("gone", Modality::Text, false);
        reg.retire(id);
        assert_eq!(reg.frequency(id), Some(0));
        assert!(reg.get_embedding(id).is_some());
        assert_eq!(reg.find_by_source("gone"), Some(id));
        assert!(reg.most_frequent(10).is_empty());
    }

    #[test]
    fn most_frequent_ranks_live_concepts() {
        let mut reg = registry();
        let a = reg.add_character_concept("a", Modality::Text, false);
        let b = reg.add_character_concept("b", Modality::Text, false);
        let c = reg.add_character_concept("c", Modality::Text, false);
        reg.update_usage(c, None);
        reg.retire(b);
        assert_eq!(reg.most_frequent(10), vec![(c, 2), (a, 1)]);
        assert_eq!(reg.most_frequent(1), vec![(c, 2)]);
        assert_eq!(reg.modality(a), Some(Modality::Text));
    }

    #[test]
    fn sync_excludes_private_and_clears_on_ack() {
        let mut reg = registry();
        let shared = reg.add_character_concept("pub", Modality::Text, false);
        let private = reg.add_character_concept("secret", Modality::Text, true);
        reg.update_usage(private, None);

        let records = reg.concepts_for_sync(10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_id, shared);
        assert_eq!(records[0].source.as_deref(), Some("pub"));

        assert_eq!(reg.mark_synced(&[shared, private]), 1);
        assert!(reg.concepts_for_sync(10).is_empty());

        // Re-use re-queues it.
        reg.update_usage(shared, None);
        assert_eq!(reg.pending_sync_count(), 1);
    }

    #[test]
    fn stats_counts_kinds_and_top_frequency() {
        let mut reg = registry();
        let a = reg.add_character_concept("a", Modality::Text, false);
        let b = reg.add_character_concept("b", Modality::Image, true);
        reg.update_usage(b, None);
        reg.merge(a, b, false, None);

        let stats = reg.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_kind.character_sequence, 2);
        assert_eq!(stats.by_kind.merged, 1);
        assert_eq!(stats.by_modality.get(&Modality::Image), Some(&1));
        assert_eq!(stats.private, 2);
        // merged (3) > b (2) > a (1)
        assert_eq!(stats.top_by_frequency[0].2, 3);
        assert_eq!(stats.top_by_frequency[1].0, b);
    }
}
