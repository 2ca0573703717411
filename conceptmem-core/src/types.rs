//! Core type definitions for the concept memory system.
//!
//! Identity types, the closed enums that tag concepts and patterns, and the
//! small amount of vector math every component shares.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConceptError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Stable identifier of a concept.
///
/// Dense and monotonically assigned by a [`crate::ConceptRegistry`]; an id is
/// never reassigned or reclaimed within the registry's lifetime. It doubles as
/// the concept's slot in the backing [`crate::VectorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub u32);

impl ConceptId {
    /// The id as a `usize` index into per-concept vectors.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a segment resolved to concepts.
///
/// A segment that is itself a known concept resolves to a single id. A segment
/// that has not yet recurred often enough is resolved character by character,
/// yielding one id per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptRef {
    /// The whole segment maps to one concept.
    Single(ConceptId),
    /// The segment was resolved unit by unit.
    Sequence(Vec<ConceptId>),
}

impl ConceptRef {
    /// All concept ids referenced, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConceptId> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Sequence(ids) => ids.clone(),
        }
    }

    /// Whether this reference resolved to a single concept.
    #[must_use]
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Coarse content-type tag used to scope queries and indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Text content.
    #[default]
    Text,
    /// Image content.
    Image,
    /// Audio content.
    Audio,
    /// Content spanning several modalities (e.g. merges of differing parents).
    Multimodal,
}

impl Modality {
    /// Every modality, in declaration order.
    pub const ALL: [Self; 4] = [Self::Text, Self::Image, Self::Audio, Self::Multimodal];

    /// Lowercase name, as used in config and sync records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Multimodal => "multimodal",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ConceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| ConceptError::InvalidModality(s.to_string()))
    }
}

/// Whether an entry may leave the process through the sync export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Eligible for export.
    Shared,
    /// Never exported.
    Private,
}

impl Visibility {
    /// Map a `private` flag to a visibility.
    #[must_use]
    pub fn from_private(private: bool) -> Self {
        if private { Self::Private } else { Self::Shared }
    }

    /// Whether this is [`Visibility::Private`].
    #[must_use]
    pub fn is_private(self) -> bool {
        self == Self::Private
    }
}

/// Origin of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    /// Created from a source string (a character or a promoted segment).
    CharacterSequence,
    /// Created from a caller-supplied vector.
    Semantic,
    /// Created by averaging two existing concepts.
    Merged,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Wall-clock milliseconds since the Unix epoch, as stored in slot metadata.
#[must_use]
pub fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

// ---------------------------------------------------------------------------
// Vector math
// ---------------------------------------------------------------------------

/// Euclidean length of a vector.
#[must_use]
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize in place. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let mag = magnitude(v);
    if mag == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x /= mag;
    }
}

/// Cosine similarity between two vectors.
///
/// Compares the overlapping prefix when lengths differ. Returns `0.0` if
/// either vector has zero magnitude, never NaN.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut mag_a, mut mag_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Copy `values` into a vector of exactly `dim` elements, zero-padding or
/// truncating as needed.
#[must_use]
pub fn fit_to_dim(values: &[f32], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0; dim];
    let n = values.len().min(dim);
    out[..n].copy_from_slice(&values[..n]);
    out
}

/// Element-wise mean of a set of vectors, each fitted to `dim`.
///
/// Returns a zero vector for an empty input.
#[must_use]
pub fn mean_pool(vectors: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; dim];
    if vectors.is_empty() {
        return out;
    }
    for v in vectors {
        for (acc, x) in out.iter_mut().zip(v.iter()) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    for x in &mut out {
        *x /= n;
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
