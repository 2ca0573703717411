//! Pattern Tracker: frequency and utility statistics for recurring segments.
//!
//! A pattern exists independently of whether its key has been promoted to a
//! concept; it keeps accumulating statistics either way.
//!
//! Utility is an exponential moving average over the observation count:
//!
//! ```text
//! utility = 0.9 × utility + 0.1 × (frequency + 1)      (first sighting: frequency + 1)
//! ```
//!
//! Capacity is a soft bound checked after every insert. On overflow the
//! lowest-utility patterns are evicted from every index. Utility already
//! blends frequency and recency (it only grows on observation and is decayed
//! by consolidation), so there is no separate LRU pass.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, span, Level};

use crate::config::{PatternConfig, SegmentationConfig};
use crate::metrics::{spans, ConceptCounters};
use crate::types::{now_millis, Modality, Visibility};

/// EMA weight kept from the previous utility.
const UTILITY_RETAIN: f64 = 0.9;

/// A tracker behind a read-write lock, shared like
/// [`crate::registry::SharedRegistry`].
pub type SharedPatterns = Arc<RwLock<PatternTracker>>;

/// Statistics for one recurring segment key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInfo {
    /// The segment text.
    pub key: String,
    /// Observation count.
    pub frequency: u32,
    /// Exponential moving average of `frequency + 1`.
    pub utility: f64,
    /// Last observation, epoch milliseconds.
    pub last_seen_at: f64,
    /// Export visibility. Sticky once private.
    pub visibility: Visibility,
    /// Modality of the latest observation.
    pub modality: Modality,
    #[serde(skip)]
    first_seq: u64,
    #[serde(skip)]
    last_seq: u64,
}

/// One pending pattern, as pulled by an external sync collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSyncRecord {
    /// Pattern key; pass back to [`PatternTracker::mark_synced`].
    pub key: String,
    /// Observation count.
    pub frequency: u32,
    /// Current utility.
    pub utility: f64,
    /// Modality.
    pub modality: Modality,
    /// Last observation, epoch milliseconds.
    pub last_seen_at: f64,
}

/// Frequency/utility tracking of segment keys with least-utility eviction.
#[derive(Debug)]
pub struct PatternTracker {
    patterns: HashMap<String, PatternInfo>,
    capacity: usize,
    min_frequency: u32,
    contexts: HashMap<String, HashMap<String, u32>>,
    private: HashSet<String>,
    by_modality: HashMap<Modality, HashSet<String>>,
    pending_sync: BTreeSet<String>,
    seq: u64,
    counters: Arc<ConceptCounters>,
}

impl PatternTracker {
    /// Create an empty tracker.
    ///
    /// `min_frequency` is the floor for [`frequent_patterns`](Self::frequent_patterns)
    /// and, halved, for committing a [`merge`](Self::merge).
    #[must_use]
    pub fn new(capacity: usize, min_frequency: u32) -> Self {
        Self {
            patterns: HashMap::new(),
            capacity,
            min_frequency,
            contexts: HashMap::new(),
            private: HashSet::new(),
            by_modality: HashMap::new(),
            pending_sync: BTreeSet::new(),
            seq: 0,
            counters: Arc::new(ConceptCounters::new()),
        }
    }

    /// Create a tracker from the `[patterns]` and `[segmentation]` sections.
    #[must_use]
    pub fn from_config(patterns: &PatternConfig, segmentation: &SegmentationConfig) -> Self {
        Self::new(patterns.pattern_capacity, segmentation.min_segment_frequency)
    }

    /// Report into a shared set of counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ConceptCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Wrap in a [`SharedPatterns`] handle.
    #[must_use]
    pub fn into_shared(self) -> SharedPatterns {
        Arc::new(RwLock::new(self))
    }

    /// Number of tracked patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Soft capacity bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Minimum frequency for a pattern to count as frequent.
    #[must_use]
    pub fn min_frequency(&self) -> u32 {
        self.min_frequency
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn reindex_modality(&mut self, key: &str, old: Option<Modality>, new: Modality) {
        if old == Some(new) {
            return;
        }
        if let Some(old) = old {
            if let Some(set) = self.by_modality.get_mut(&old) {
                set.remove(key);
            }
        }
        self.by_modality.entry(new).or_default().insert(key.to_string());
    }

    // -- observation ----------------------------------------------------------

    /// Record one sighting of `key`.
    ///
    /// Bumps frequency, refreshes utility and timestamp, tallies `context`,
    /// then evicts if the tracker is over capacity. A private sighting makes
    /// the pattern private for good.
    pub fn observe(&mut self, key: &str, context: Option<&str>, private: bool, modality: Modality) {
        let seq = self.next_seq();
        let now = now_millis();

        let old_modality = match self.patterns.get_mut(key) {
            Some(p) => {
                p.frequency = p.frequency.saturating_add(1);
                p.utility = UTILITY_RETAIN * p.utility + (1.0 - UTILITY_RETAIN) * (f64::from(p.frequency) + 1.0);
                p.last_seen_at = now;
                p.last_seq = seq;
                if private {
                    p.visibility = Visibility::Private;
                }
                let old = p.modality;
                p.modality = modality;
                Some(old)
            }
            None => {
                self.patterns.insert(
                    key.to_string(),
                    PatternInfo {
                        key: key.to_string(),
                        frequency: 1,
                        utility: 2.0,
                        last_seen_at: now,
                        visibility: Visibility::from_private(private),
                        modality,
                        first_seq: seq,
                        last_seq: seq,
                    },
                );
                None
            }
        };
        self.reindex_modality(key, old_modality, modality);

        if let Some(ctx) = context {
            *self
                .contexts
                .entry(ctx.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert(0) += 1;
        }

        let is_private = self.patterns.get(key).is_some_and(|p| p.visibility.is_private());
        if is_private {
            self.private.insert(key.to_string());
            self.pending_sync.remove(key);
        } else {
            self.pending_sync.insert(key.to_string());
        }
        ConceptCounters::bump(&self.counters.patterns_observed);

        if self.patterns.len() > self.capacity {
            self.evict_overflow();
        }
    }

    /// Remove the `len - capacity` lowest-utility patterns.
    ///
    /// Ties go to the pattern seen least recently. Returns the evicted keys,
    /// lowest utility first.
    pub fn evict_overflow(&mut self) -> Vec<String> {
        let excess = self.patterns.len().saturating_sub(self.capacity);
        if excess == 0 {
            return Vec::new();
        }
        let _span = span!(Level::DEBUG, spans::EVICT, excess).entered();

        let mut ranked: Vec<(OrderedFloat<f64>, u64, &str)> = self
            .patterns
            .values()
            .map(|p| (OrderedFloat(p.utility), p.last_seq, p.key.as_str()))
            .collect();
        ranked.sort_unstable();
        let victims: Vec<String> = ranked
            .into_iter()
            .take(excess)
            .map(|(_, _, key)| key.to_string())
            .collect();

        for key in &victims {
            self.remove(key);
        }
        ConceptCounters::add(&self.counters.patterns_evicted, victims.len() as u64);
        debug!(evicted = victims.len(), remaining = self.patterns.len(), "Patterns evicted");
        victims
    }

    /// Drop `key` from every index. Returns whether it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(pattern) = self.patterns.remove(key) else {
            return false;
        };
        self.private.remove(key);
        self.pending_sync.remove(key);
        if let Some(set) = self.by_modality.get_mut(&pattern.modality) {
            set.remove(key);
        }
        self.contexts.retain(|_, counts| {
            counts.remove(key);
            !counts.is_empty()
        });
        true
    }

    // -- queries ----------------------------------------------------------------

    /// Observation count of `key`, 0 if untracked.
    #[must_use]
    pub fn frequency_of(&self, key: &str) -> u32 {
        self.patterns.get(key).map_or(0, |p| p.frequency)
    }

    /// Owned copy of the statistics for `key`.
    #[must_use]
    pub fn pattern(&self, key: &str) -> Option<PatternInfo> {
        self.patterns.get(key).cloned()
    }

    /// Patterns with frequency ≥ `min_frequency`, most frequent first.
    ///
    /// Ties keep first-seen order. Private patterns are skipped unless
    /// `include_private`.
    #[must_use]
    pub fn frequent_patterns(
        &self,
        limit: usize,
        modality: Option<Modality>,
        include_private: bool,
    ) -> Vec<(String, u32)> {
        let mut hits: Vec<&PatternInfo> = self
            .patterns
            .values()
            .filter(|p| p.frequency >= self.min_frequency)
            .filter(|p| modality.is_none_or(|m| p.modality == m))
            .filter(|p| include_private || !p.visibility.is_private())
            .collect();
        hits.sort_by_key(|p| (Reverse(p.frequency), p.first_seq));
        hits.into_iter()
            .take(limit)
            .map(|p| (p.key.clone(), p.frequency))
            .collect()
    }

    /// Patterns seen under `context`, by in-context count, highest first.
    #[must_use]
    pub fn context_patterns(&self, context: &str, limit: usize, modality: Option<Modality>) -> Vec<(String, u32)> {
        let Some(counts) = self.contexts.get(context) else {
            return Vec::new();
        };
        let mut hits: Vec<(&String, u32, u64)> = counts
            .iter()
            .filter_map(|(key, &count)| {
                let p = self.patterns.get(key)?;
                modality.is_none_or(|m| p.modality == m).then_some((key, count, p.first_seq))
            })
            .collect();
        hits.sort_by_key(|&(_, count, first)| (Reverse(count), first));
        hits.into_iter()
            .take(limit)
            .map(|(key, count, _)| (key.clone(), count))
            .collect()
    }

    // -- consolidation ------------------------------------------------------------

    /// Combine two patterns into the compound key `key_a + key_b`.
    ///
    /// The compound's frequency is the smaller parent frequency and its
    /// utility the parents' mean. Nothing is stored, and `None` returned, if
    /// either key is untracked or that frequency is below half the
    /// frequent-pattern floor. An existing compound keeps the larger
    /// frequency and utility of old and new.
    pub fn merge(
        &mut self,
        key_a: &str,
        key_b: &str,
        private: bool,
        modality_override: Option<Modality>,
    ) -> Option<String> {
        let (a, b) = (self.patterns.get(key_a)?, self.patterns.get(key_b)?);
        let frequency = a.frequency.min(b.frequency);
        if f64::from(frequency) < f64::from(self.min_frequency) / 2.0 {
            return None;
        }

        let compound = format!("{key_a}{key_b}");
        let utility = (a.utility + b.utility) / 2.0;
        let private = private || a.visibility.is_private() || b.visibility.is_private();
        let modality = modality_override.unwrap_or(if a.modality == b.modality {
            a.modality
        } else {
            Modality::Multimodal
        });

        let seq = self.next_seq();
        let now = now_millis();
        let old_modality = match self.patterns.get_mut(&compound) {
            Some(existing) => {
                existing.frequency = existing.frequency.max(frequency);
                existing.utility = existing.utility.max(utility);
                existing.last_seen_at = now;
                existing.last_seq = seq;
                if private {
                    existing.visibility = Visibility::Private;
                }
                let old = existing.modality;
                existing.modality = modality;
                Some(old)
            }
            None => {
                self.patterns.insert(
                    compound.clone(),
                    PatternInfo {
                        key: compound.clone(),
                        frequency,
                        utility,
                        last_seen_at: now,
                        visibility: Visibility::from_private(private),
                        modality,
                        first_seq: seq,
                        last_seq: seq,
                    },
                );
                None
            }
        };
        self.reindex_modality(&compound, old_modality, modality);

        let is_private = self.patterns.get(&compound).is_some_and(|p| p.visibility.is_private());
        if is_private {
            self.private.insert(compound.clone());
            self.pending_sync.remove(&compound);
        } else {
            self.pending_sync.insert(compound.clone());
        }
        ConceptCounters::bump(&self.counters.patterns_merged);
        debug!(a = key_a, b = key_b, compound = %compound, frequency, "Patterns merged");

        if self.patterns.len() > self.capacity {
            self.evict_overflow();
        }
        self.patterns.contains_key(&compound).then_some(compound)
    }

    /// Multiply every utility by `factor` (clamped to `[0, 1]`).
    pub fn decay_utilities(&mut self, factor: f64) {
        let factor = factor.clamp(0.0, 1.0);
        for p in self.patterns.values_mut() {
            p.utility *= factor;
        }
    }

    /// Remove every pattern with utility below `min_utility`. Returns how
    /// many were removed.
    pub fn prune(&mut self, min_utility: f64) -> usize {
        let doomed: Vec<String> = self
            .patterns
            .values()
            .filter(|p| p.utility < min_utility)
            .map(|p| p.key.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        if !doomed.is_empty() {
            ConceptCounters::add(&self.counters.patterns_pruned, doomed.len() as u64);
            debug!(pruned = doomed.len(), min_utility, "Patterns pruned");
        }
        doomed.len()
    }

    // -- sync -------------------------------------------------------------------

    /// Up to `limit` pending shared patterns, ascending by key.
    #[must_use]
    pub fn patterns_for_sync(&self, limit: usize) -> Vec<PatternSyncRecord> {
        self.pending_sync
            .iter()
            .filter(|key| !self.private.contains(*key))
            .filter_map(|key| {
                let p = self.patterns.get(key)?;
                Some(PatternSyncRecord {
                    key: p.key.clone(),
                    frequency: p.frequency,
                    utility: p.utility,
                    modality: p.modality,
                    last_seen_at: p.last_seen_at,
                })
            })
            .take(limit)
            .collect()
    }

    /// Patterns awaiting export.
    #[must_use]
    pub fn pending_sync_count(&self) -> usize {
        self.pending_sync.len()
    }

    /// Acknowledge exported patterns. Returns how many were pending.
    pub fn mark_synced(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|k| self.pending_sync.remove(*k)).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
