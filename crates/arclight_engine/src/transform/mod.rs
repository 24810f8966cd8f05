//! Hierarchical spatial transform graph
//!
//! An arena of transform nodes with parent/child links, cached world
//! transforms, and dirty-flag propagation. Game code mutates local poses;
//! world transforms are recomputed lazily on read or eagerly by the
//! per-frame propagation task.

mod graph;

pub use graph::{NodeFlags, NodeHandle, TransformError, TransformGraph};
