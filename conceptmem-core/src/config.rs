//! Configuration for the concept memory system.
//!
//! Maps directly to a TOML file with one table per component. Every field
//! has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! [storage]
//! concept_dim = 768
//! initial_capacity = 10000
//! growth_strategy = "fixed"
//! growth_increment = 1000
//!
//! [segmentation]
//! max_segment_length = 16
//! min_segment_frequency = 5
//!
//! [patterns]
//! pattern_capacity = 10000
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConceptError, Result};
use crate::store::GrowthStrategy;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptMemoryConfig {
    /// Vector store sizing and growth.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Segment extraction and promotion.
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    /// Pattern tracker capacity and utility decay.
    #[serde(default)]
    pub patterns: PatternConfig,
    /// Consolidation cycle tuning.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

impl ConceptMemoryConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConceptError::Config` if the TOML is invalid or fails
    /// [`validate`](Self::validate).
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConceptError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject settings the components cannot work with.
    ///
    /// # Errors
    /// Returns `ConceptError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ConceptError::Config(msg.to_string()));

        if self.storage.concept_dim == 0 {
            return invalid("storage.concept_dim must be > 0");
        }
        let factor = self.storage.growth_factor;
        if self.storage.growth_strategy == GrowthMode::Multiplicative && !(factor.is_finite() && factor > 1.0) {
            return invalid("storage.growth_factor must be finite and > 1.0 for multiplicative growth");
        }
        if self.segmentation.max_segment_length == 0 {
            return invalid("segmentation.max_segment_length must be > 0");
        }
        if !(0.0..=1.0).contains(&self.segmentation.boundary_threshold) {
            return invalid("segmentation.boundary_threshold must be in [0, 1]");
        }
        if self.segmentation.cache_capacity == 0 {
            return invalid("segmentation.cache_capacity must be > 0");
        }
        if self.patterns.pattern_capacity == 0 {
            return invalid("patterns.pattern_capacity must be > 0");
        }
        if !(0.0..=1.0).contains(&self.patterns.utility_decay) {
            return invalid("patterns.utility_decay must be in [0, 1]");
        }
        if !(-1.0..=1.0).contains(&self.consolidation.similarity_threshold) {
            return invalid("consolidation.similarity_threshold must be in [-1, 1]");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Which [`GrowthStrategy`] the vector store uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthMode {
    /// Add `growth_increment` slots per step.
    #[default]
    Fixed,
    /// Multiply capacity by `growth_factor` per step.
    Multiplicative,
}

/// Vector store sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Embedding dimension of every concept.
    #[serde(default = "default_768")]
    pub concept_dim: u32,
    /// Slots reserved up front.
    #[serde(default = "default_10000")]
    pub initial_capacity: u32,
    /// Growth mode: "fixed" or "multiplicative".
    #[serde(default)]
    pub growth_strategy: GrowthMode,
    /// Slots added per fixed growth step.
    #[serde(default = "default_1000")]
    pub growth_increment: u32,
    /// Capacity multiplier for multiplicative growth.
    #[serde(default = "default_1_5")]
    pub growth_factor: f32,
}

impl StorageConfig {
    /// The growth strategy these settings describe.
    #[must_use]
    pub fn growth(&self) -> GrowthStrategy {
        match self.growth_strategy {
            GrowthMode::Fixed => GrowthStrategy::Fixed {
                increment: self.growth_increment,
            },
            GrowthMode::Multiplicative => GrowthStrategy::Multiplicative {
                factor: self.growth_factor,
            },
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            concept_dim: 768,
            initial_capacity: 10_000,
            growth_strategy: GrowthMode::Fixed,
            growth_increment: 1000,
            growth_factor: 1.5,
        }
    }
}

/// Segment extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Longest segment kept intact; longer spans are chopped into chunks.
    #[serde(default = "default_16")]
    pub max_segment_length: usize,
    /// Occurrences a segment needs before it is promoted to a concept.
    #[serde(default = "default_5")]
    pub min_segment_frequency: u32,
    /// Boundary score above which a cut is made.
    #[serde(default = "default_0_5")]
    pub boundary_threshold: f64,
    /// Maximum number of cached segmentation results.
    #[serde(default = "default_10000_usize")]
    pub cache_capacity: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_segment_length: 16,
            min_segment_frequency: 5,
            boundary_threshold: 0.5,
            cache_capacity: 10_000,
        }
    }
}

/// Pattern tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Soft bound on tracked patterns; overflow evicts the lowest utility.
    #[serde(default = "default_10000_usize")]
    pub pattern_capacity: usize,
    /// Multiplier applied to every utility once per consolidation cycle.
    #[serde(default = "default_0_95")]
    pub utility_decay: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            pattern_capacity: 10_000,
            utility_decay: 0.95,
        }
    }
}

/// Consolidation cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Minimum cosine similarity for two concepts to be merged.
    #[serde(default = "default_0_95")]
    pub similarity_threshold: f64,
    /// How many of the most frequent concepts are considered per cycle.
    #[serde(default = "default_100_usize")]
    pub candidate_pool: usize,
    /// Upper bound on concept merges per cycle.
    #[serde(default = "default_8_usize")]
    pub max_concept_merges: usize,
    /// Upper bound on pattern merges per cycle.
    #[serde(default = "default_4_usize")]
    pub max_pattern_merges: usize,
    /// Patterns whose utility falls below this are pruned.
    #[serde(default = "default_0_5")]
    pub prune_utility_threshold: f64,
    /// Zero the frequency of both parents after a concept merge.
    #[serde(default = "default_true")]
    pub retire_merged_parents: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            candidate_pool: 100,
            max_concept_merges: 8,
            max_pattern_merges: 4,
            prune_utility_threshold: 0.5,
            retire_merged_parents: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_768() -> u32 { 768 }
fn default_10000() -> u32 { 10_000 }
fn default_1000() -> u32 { 1000 }
fn default_5() -> u32 { 5 }
fn default_16() -> usize { 16 }
fn default_4_usize() -> usize { 4 }
fn default_8_usize() -> usize { 8 }
fn default_100_usize() -> usize { 100 }
fn default_10000_usize() -> usize { 10_000 }
fn default_1_5() -> f32 { 1.5 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_95() -> f64 { 0.95 }

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
