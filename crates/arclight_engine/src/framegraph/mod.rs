//! Frame graph: declarative pass scheduling with hazard tracking
//!
//! Passes declare the resources they read and write during a setup phase;
//! the graph derives execution order from those declarations, inserts the
//! state transition barriers each hazard requires, and aliases transient
//! allocations whose lifetimes do not overlap. Execution then walks the
//! schedule, letting each pass record typed commands, and submits the
//! whole frame as one command list.
//!
//! Ordering is deterministic: dependency edges come from per-resource
//! event lists (a writer precedes its readers, readers precede the next
//! writer), and ties between independent passes fall back to declaration
//! order.

mod graph;

pub use graph::{
    FrameGraph, FrameGraphError, FrameResourceHandle, FrameResources, PassBuilder,
};
