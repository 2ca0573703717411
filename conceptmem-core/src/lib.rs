//! # Concept Memory Core
//!
//! An in-process adaptive concept store: a small vector cache with
//! frequency tracking, utility-based eviction and provenance-aware merging.
//!
//! Components, leaf to root:
//!
//! - [`VectorStore`]: growable, contiguous fixed-dimension embeddings with
//!   per-slot frequency and timestamp metadata
//! - [`ConceptRegistry`]: maps source keys and semantic vectors to stable
//!   [`ConceptId`]s; similarity search and concept merging
//! - [`PatternTracker`]: frequency/utility statistics for recurring segment
//!   keys, capacity-bounded by least-utility eviction
//! - [`Segmenter`]: cuts input into segments and resolves each one to a
//!   [`ConceptRef`], promoting patterns into concepts once they recur
//!
//! [`ConceptMemory`] wires them together as an explicitly owned instance;
//! [`consolidation`] holds the periodic merge/prune pass that a host
//! scheduler drives.
//!
//! Nothing here is persisted. Ids are grow-only for the lifetime of a
//! registry.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod bank;
pub mod config;
pub mod consolidation;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod patterns;
pub mod registry;
pub mod segmentation;
pub mod store;
pub mod types;

pub use bank::ConceptMemory;
pub use config::ConceptMemoryConfig;
pub use error::{ConceptError, Result};
pub use patterns::PatternTracker;
pub use registry::ConceptRegistry;
pub use segmentation::Segmenter;
pub use store::VectorStore;
pub use types::*;
