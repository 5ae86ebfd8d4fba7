//! Project configuration model for trellis.
//!
//! A [`ProjectSnapshot`] is the input every classpath view is computed from:
//! - declared dependencies (scope + resolution state)
//! - source, resource and output roots
//! - compiler configuration (language level, boot-classpath override, processor path)
//! - the configured toolchain identifier
//!
//! Snapshots are plain values. Editing a project produces a new snapshot; the engine swaps
//! it in atomically and routes a [`ProjectMutation`] describing what changed.

mod coordinate;
mod model;
mod mutation;

pub use coordinate::*;
pub use model::*;
pub use mutation::*;
