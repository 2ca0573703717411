//! Unit encoding and boundary scoring.
//!
//! Two trait seams decouple the segmenter's contract (extraction, concept
//! resolution, caching) from the heuristics that drive it:
//!
//! - [`UnitEncoder`] turns atomic units and source keys into vectors
//! - [`BoundaryScorer`] scores the gap between adjacent units
//!
//! The defaults are deliberately simple and deterministic.
//! [`SinusoidalEncoder`] reserves the first [`CLASS_DIMS`] dimensions for a
//! character-class anchor and fills the remainder with sine/cosine features
//! of the code point and position:
//!
//! ```text
//! [ word | punct | other | sin cos sin cos ... ]
//!   ^^^^^^^^^^^^^^^^^^^^   ^^^^^^^^^^^^^^^^^^^
//!   anchor: 0.8 of |v|²    identity: 0.2 of |v|²
//! ```
//!
//! Two units of the same class always have cosine ≥ 0.6 and units of
//! different classes ≤ 0.2, so with the default 0.5 threshold
//! [`CosineBoundaryScorer`] cuts exactly at class changes and after
//! whitespace.

use crate::types::{cosine_similarity, l2_normalize};

/// Leading dimensions reserved for the character-class anchor.
pub const CLASS_DIMS: usize = 3;

/// Share of a unit vector's squared length carried by the class anchor.
const ANCHOR_SHARE: f32 = 0.8;

/// Phase shift per position, so anagrams encode differently.
const POSITION_PHASE: f32 = 0.37;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produce vectors for atomic units and for concept source keys.
///
/// Implementations must be deterministic and `Send + Sync`; the same
/// encoder is shared by the registry and the segmenter.
pub trait UnitEncoder: Send + Sync {
    /// Encode one unit found at `position` in its input.
    ///
    /// Returns exactly `dim` floats. Need not be normalized.
    fn encode_unit(&self, unit: &str, position: usize, dim: usize) -> Vec<f32>;

    /// Encode a whole source key (for character-sequence concepts).
    ///
    /// Returns exactly `dim` floats. An empty key may yield a zero vector.
    fn encode_key(&self, key: &str, dim: usize) -> Vec<f32>;

    /// Human-readable name, for logs.
    fn name(&self) -> &str;
}

/// Score the boundary between each pair of adjacent units.
pub trait BoundaryScorer: Send + Sync {
    /// One score per adjacent pair: `scores[i]` is the gap between
    /// `units[i]` and `units[i + 1]`. Higher means "more likely a boundary";
    /// scores are in `[0, 1]`.
    fn score(&self, units: &[String], embeddings: &[Vec<f32>]) -> Vec<f64>;
}

// ---------------------------------------------------------------------------
// Character classes
// ---------------------------------------------------------------------------

/// Coarse class of a unit, keyed off its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Alphanumerics and whitespace. Whitespace shares the word class so it
    /// stays attached to the word before it.
    Word,
    /// ASCII punctuation.
    Punctuation,
    /// Everything else (symbols, emoji, control characters).
    Other,
}

impl CharClass {
    /// Classify a unit.
    #[must_use]
    pub fn of(unit: &str) -> Self {
        match unit.chars().next() {
            Some(c) if c.is_alphanumeric() || c.is_whitespace() => Self::Word,
            Some(c) if c.is_ascii_punctuation() => Self::Punctuation,
            _ => Self::Other,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Word => 0,
            Self::Punctuation => 1,
            Self::Other => 2,
        }
    }
}

/// Whether a unit consists only of whitespace (and is non-empty).
#[must_use]
pub fn is_whitespace_unit(unit: &str) -> bool {
    !unit.is_empty() && unit.chars().all(char::is_whitespace)
}

/// Add sine/cosine features of one code point at `position` into `out`.
fn add_sinusoid(code_point: u32, position: usize, out: &mut [f32]) {
    let len = out.len().max(1) as f32;
    let base = code_point as f32 + 1.0;
    let phase = position as f32 * POSITION_PHASE;
    for (k, slot) in out.iter_mut().enumerate() {
        let exponent = (2 * (k / 2)) as f32 / len;
        let rate = 1.0 / 10_000_f32.powf(exponent);
        let angle = base * rate + phase;
        *slot += if k % 2 == 0 { angle.sin() } else { angle.cos() };
    }
}

// ---------------------------------------------------------------------------
// Default encoder
// ---------------------------------------------------------------------------

/// Class-anchored sine/cosine encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinusoidalEncoder;

impl UnitEncoder for SinusoidalEncoder {
    fn encode_unit(&self, unit: &str, position: usize, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; dim];
        if dim <= CLASS_DIMS {
            if let Some(slot) = v.get_mut(CharClass::of(unit).slot()) {
                *slot = 1.0;
            }
            return v;
        }

        let (anchor, identity) = v.split_at_mut(CLASS_DIMS);
        anchor[CharClass::of(unit).slot()] = ANCHOR_SHARE.sqrt();
        for (offset, c) in unit.chars().enumerate() {
            add_sinusoid(u32::from(c), position + offset, identity);
        }
        l2_normalize(identity);
        let scale = (1.0 - ANCHOR_SHARE).sqrt();
        for x in identity.iter_mut() {
            *x *= scale;
        }
        v
    }

    fn encode_key(&self, key: &str, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; dim];
        let mut count = 0_usize;
        for (position, c) in key.chars().enumerate() {
            add_sinusoid(u32::from(c), position, &mut v);
            count += 1;
        }
        if count > 1 {
            let n = count as f32;
            for x in &mut v {
                *x /= n;
            }
        }
        v
    }

    fn name(&self) -> &str {
        "sinusoidal-class-anchored"
    }
}

// ---------------------------------------------------------------------------
// Default boundary scorer
// ---------------------------------------------------------------------------

/// `1 - cosine(unit[i], unit[i + 1])`, with a forced boundary after
/// whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineBoundaryScorer;

impl BoundaryScorer for CosineBoundaryScorer {
    fn score(&self, units: &[String], embeddings: &[Vec<f32>]) -> Vec<f64> {
        let pairs = units.len().min(embeddings.len()).saturating_sub(1);
        (0..pairs)
            .map(|i| {
                if is_whitespace_unit(&units[i]) {
                    1.0
                } else {
                    (1.0 - cosine_similarity(&embeddings[i], &embeddings[i + 1])).clamp(0.0, 1.0)
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
