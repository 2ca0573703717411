//! Growable contiguous embedding storage.
//!
//! A [`VectorStore`] holds `capacity * dim` floats in one buffer plus two
//! parallel metadata arrays (usage frequency and last-use timestamp). Slots
//! are addressed by index and never move: growth reallocates the buffer but
//! keeps every existing slot at the same index with the same contents.
//!
//! ```text
//! data:      [ slot 0 (dim f32) | slot 1 | slot 2 | ... | slot cap-1 ]
//! frequency: [ u32              | u32    | u32    | ... | u32        ]
//! timestamp: [ f64              | f64    | f64    | ... | f64        ]
//! ```
//!
//! Reads hand out owned copies. A reference into the buffer would dangle
//! across a growth event.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConceptError, Result};
use crate::types::{l2_normalize, magnitude};

// ---------------------------------------------------------------------------
// Growth strategy
// ---------------------------------------------------------------------------

/// How many slots to add when the store runs out of capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum GrowthStrategy {
    /// Add a constant number of slots. Keeps memory growth predictable for
    /// long-running sessions.
    Fixed {
        /// Slots added per growth step.
        increment: u32,
    },
    /// Grow to `ceil(capacity * factor)` slots.
    Multiplicative {
        /// Capacity multiplier, expected to be > 1.
        factor: f32,
    },
}

impl GrowthStrategy {
    /// Number of slots to add to a store of `capacity` slots.
    ///
    /// Always at least 1, so a growth step makes progress even with a
    /// degenerate configuration.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn extra_for(self, capacity: u32) -> u32 {
        let extra = match self {
            Self::Fixed { increment } => increment,
            Self::Multiplicative { factor } => {
                let target = (f64::from(capacity) * f64::from(factor)).ceil();
                if target.is_finite() {
                    (target.min(f64::from(u32::MAX)) as u32).saturating_sub(capacity)
                } else {
                    0
                }
            }
        };
        extra.max(1)
    }
}

impl Default for GrowthStrategy {
    fn default() -> Self {
        Self::Fixed { increment: 1000 }
    }
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

/// Contiguous fixed-dimension embedding storage with per-slot metadata.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dim: usize,
    capacity: u32,
    data: Vec<f32>,
    frequency: Vec<u32>,
    timestamp: Vec<f64>,
}

impl VectorStore {
    /// Reserve `initial_capacity` zeroed slots of `dim` floats each.
    #[must_use]
    pub fn allocate(initial_capacity: u32, dim: u32) -> Self {
        debug_assert!(dim > 0, "vector store dimension must be non-zero");
        let dim = dim as usize;
        let cap = initial_capacity as usize;
        Self {
            dim,
            capacity: initial_capacity,
            data: vec![0.0; cap * dim],
            frequency: vec![0; cap],
            timestamp: vec![0.0; cap],
        }
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn check(&self, slot: u32) -> Result<usize> {
        if slot >= self.capacity {
            return Err(ConceptError::OutOfBounds {
                slot,
                capacity: self.capacity,
            });
        }
        Ok(slot as usize)
    }

    fn range(&self, idx: usize) -> std::ops::Range<usize> {
        idx * self.dim..(idx + 1) * self.dim
    }

    /// Copy `values` into `slot`.
    ///
    /// Longer inputs are truncated to `dim`; shorter ones leave the tail
    /// zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`ConceptError::OutOfBounds`] if `slot >= capacity`. Callers
    /// grow the store first.
    pub fn write(&mut self, slot: u32, values: &[f32]) -> Result<()> {
        let idx = self.check(slot)?;
        let range = self.range(idx);
        let dst = &mut self.data[range];
        let n = values.len().min(dst.len());
        dst[..n].copy_from_slice(&values[..n]);
        dst[n..].fill(0.0);
        Ok(())
    }

    /// L2-normalize `slot` in place. A zero vector stays zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConceptError::OutOfBounds`] if `slot >= capacity`.
    pub fn normalize(&mut self, slot: u32) -> Result<()> {
        let idx = self.check(slot)?;
        let range = self.range(idx);
        l2_normalize(&mut self.data[range]);
        Ok(())
    }

    /// Owned copy of the vector in `slot`, or `None` past capacity.
    #[must_use]
    pub fn read(&self, slot: u32) -> Option<Vec<f32>> {
        self.view(slot).map(<[f32]>::to_vec)
    }

    /// Borrowed view of `slot` for scans that run under the owner's lock.
    pub(crate) fn view(&self, slot: u32) -> Option<&[f32]> {
        let idx = self.check(slot).ok()?;
        Some(&self.data[self.range(idx)])
    }

    /// Euclidean length of the vector in `slot`.
    #[must_use]
    pub fn magnitude(&self, slot: u32) -> Option<f32> {
        self.view(slot).map(magnitude)
    }

    /// Append `extra` zeroed slots. Existing slots keep their index and data.
    pub fn grow(&mut self, extra: u32) {
        let old = self.capacity;
        let new_capacity = old.saturating_add(extra);
        let cap = new_capacity as usize;
        self.data.resize(cap * self.dim, 0.0);
        self.frequency.resize(cap, 0);
        self.timestamp.resize(cap, 0.0);
        self.capacity = new_capacity;
        info!(
            from = old,
            to = new_capacity,
            dim = self.dim,
            "Vector store grown"
        );
    }

    /// Usage frequency recorded for `slot`.
    #[must_use]
    pub fn frequency(&self, slot: u32) -> Option<u32> {
        self.frequency.get(slot as usize).copied()
    }

    /// Overwrite the usage frequency of `slot`. No-op past capacity.
    pub fn set_frequency(&mut self, slot: u32, value: u32) {
        if let Some(f) = self.frequency.get_mut(slot as usize) {
            *f = value;
        }
    }

    /// Bump the usage frequency of `slot`, saturating at `u32::MAX`.
    pub fn increment_frequency(&mut self, slot: u32) {
        if let Some(f) = self.frequency.get_mut(slot as usize) {
            *f = f.saturating_add(1);
        }
    }

    /// Last-use timestamp (epoch milliseconds) of `slot`.
    #[must_use]
    pub fn timestamp(&self, slot: u32) -> Option<f64> {
        self.timestamp.get(slot as usize).copied()
    }

    /// Record `at` as the last-use time of `slot`. No-op past capacity.
    pub fn touch(&mut self, slot: u32, at: f64) {
        if let Some(t) = self.timestamp.get_mut(slot as usize) {
            *t = at;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
