//! Transform node arena and world-matrix propagation
//!
//! Nodes are allocated from a free-list backed arena and referenced by
//! generation-tagged handles, so operating on a released node is a
//! detectable error rather than undefined behavior.
//!
//! Dirty discipline: mutating a local pose floods the DIRTY bit down the
//! subtree. A world read recomputes by chain-walking up to the nearest
//! clean ancestor and composing downward, memoizing each node on the way.

use bitflags::bitflags;
use thiserror::Error;

use crate::core::config::SceneConfig;
use crate::foundation::collections::{Handle, HandleArena};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

/// Transform graph errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// Handle index was never allocated
    #[error("invalid node handle")]
    InvalidHandle,

    /// Handle generation does not match the slot; the node was released
    #[error("stale node handle: node was released")]
    StaleHandle,

    /// Node arena is at capacity and growth is disabled
    #[error("transform arena exhausted")]
    ArenaExhausted,

    /// Reparenting would create a cycle in the hierarchy
    #[error("reparenting would create a cycle")]
    CyclicHierarchy,
}

bitflags! {
    /// Per-node state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Cached world transform is stale
        const DIRTY   = 0b0001;
        /// Node carries a non-identity scale
        const SCALE   = 0b0010;
        /// World transform was recomputed this frame
        const UPDATED = 0b0100;
    }
}

/// Handle to a transform node
pub type NodeHandle = Handle<TransformNode>;

/// A single node in the transform hierarchy
#[derive(Debug)]
pub struct TransformNode {
    local: Transform,
    world: Transform,
    world_matrix: Mat4,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    flags: NodeFlags,
}

impl TransformNode {
    fn identity(parent: Option<NodeHandle>) -> Self {
        Self {
            local: Transform::identity(),
            world: Transform::identity(),
            world_matrix: Mat4::identity(),
            parent,
            children: Vec::new(),
            flags: NodeFlags::DIRTY,
        }
    }
}

/// Arena of hierarchical transform nodes
pub struct TransformGraph {
    nodes: HandleArena<TransformNode>,
    root: NodeHandle,
}

impl TransformGraph {
    /// Create a graph with a clean root node and unbounded capacity
    pub fn new() -> Self {
        Self::build(HandleArena::new())
    }

    /// Create a graph whose arena refuses to grow past `max_nodes`
    pub fn with_max_nodes(max_nodes: usize) -> Self {
        Self::build(HandleArena::with_max_slots(max_nodes))
    }

    /// Create a graph sized by the scene configuration's node cap
    pub fn from_config(config: &SceneConfig) -> Self {
        match config.max_nodes {
            Some(max_nodes) => Self::with_max_nodes(max_nodes),
            None => Self::new(),
        }
    }

    fn build(mut nodes: HandleArena<TransformNode>) -> Self {
        let mut root_node = TransformNode::identity(None);
        root_node.flags = NodeFlags::empty();
        // The arena is empty here, so the root insert cannot fail even
        // with a slot limit of zero... treat that degenerate case as one.
        let root = match nodes.insert(root_node) {
            Some(handle) => handle,
            None => unreachable!("empty arena rejected first insert"),
        };
        Self { nodes, root }
    }

    /// The implicit root every parentless node hangs off
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of live nodes, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate a node with identity pose under `parent` (root if `None`)
    pub fn create_node(&mut self, parent: Option<NodeHandle>) -> Result<NodeHandle, TransformError> {
        let parent = match parent {
            Some(p) => {
                self.node(p)?;
                p
            }
            None => self.root,
        };

        let handle = self
            .nodes
            .insert(TransformNode::identity(Some(parent)))
            .ok_or(TransformError::ArenaExhausted)?;

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(handle);
        }
        Ok(handle)
    }

    fn node(&self, handle: NodeHandle) -> Result<&TransformNode, TransformError> {
        if (handle.index() as usize) >= self.nodes_slot_count() {
            return Err(TransformError::InvalidHandle);
        }
        self.nodes.get(handle).ok_or(TransformError::StaleHandle)
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut TransformNode, TransformError> {
        if (handle.index() as usize) >= self.nodes_slot_count() {
            return Err(TransformError::InvalidHandle);
        }
        self.nodes.get_mut(handle).ok_or(TransformError::StaleHandle)
    }

    fn nodes_slot_count(&self) -> usize {
        self.nodes.slot_count()
    }

    /// Local position of a node
    pub fn local_position(&self, node: NodeHandle) -> Result<Vec3, TransformError> {
        Ok(self.node(node)?.local.position)
    }

    /// Local orientation of a node
    pub fn local_orientation(&self, node: NodeHandle) -> Result<Quat, TransformError> {
        Ok(self.node(node)?.local.rotation)
    }

    /// Local scale of a node
    pub fn local_scale(&self, node: NodeHandle) -> Result<Vec3, TransformError> {
        Ok(self.node(node)?.local.scale)
    }

    /// Parent of a node (`None` only for the root)
    pub fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, TransformError> {
        Ok(self.node(node)?.parent)
    }

    /// Children of a node
    pub fn children(&self, node: NodeHandle) -> Result<&[NodeHandle], TransformError> {
        Ok(&self.node(node)?.children)
    }

    /// Set the local position, dirtying the subtree
    pub fn set_local_position(&mut self, node: NodeHandle, position: Vec3) -> Result<(), TransformError> {
        self.node_mut(node)?.local.position = position;
        self.mark_dirty(node);
        Ok(())
    }

    /// Set the local orientation, dirtying the subtree
    pub fn set_local_orientation(&mut self, node: NodeHandle, rotation: Quat) -> Result<(), TransformError> {
        self.node_mut(node)?.local.rotation = rotation;
        self.mark_dirty(node);
        Ok(())
    }

    /// Set the local scale, dirtying the subtree
    pub fn set_local_scale(&mut self, node: NodeHandle, scale: Vec3) -> Result<(), TransformError> {
        let n = self.node_mut(node)?;
        n.local.scale = scale;
        n.flags.insert(NodeFlags::SCALE);
        self.mark_dirty(node);
        Ok(())
    }

    /// Set the world-space position by back-solving the local position
    /// through the parent's world transform
    pub fn set_world_position(&mut self, node: NodeHandle, position: Vec3) -> Result<(), TransformError> {
        let parent = self
            .node(node)?
            .parent
            .unwrap_or(self.root);
        let local = if node == self.root {
            position
        } else {
            let parent_world = self.world_transform(parent)?;
            parent_world.inverse().transform_point(position)
        };
        self.set_local_position(node, local)
    }

    fn mark_dirty(&mut self, node: NodeHandle) {
        let mut stack = vec![node];
        while let Some(handle) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(handle) {
                if n.flags.contains(NodeFlags::DIRTY) && handle != node {
                    // Subtree below is already marked
                    continue;
                }
                n.flags.insert(NodeFlags::DIRTY);
                stack.extend(n.children.iter().copied());
            }
        }
    }

    /// Full world transform of a node, recomputing stale ancestors
    pub fn world_transform(&mut self, node: NodeHandle) -> Result<Transform, TransformError> {
        self.update_node(node)?;
        Ok(self.node(node)?.world.clone())
    }

    /// Cached world matrix of a node, recomputing stale ancestors
    pub fn world_matrix(&mut self, node: NodeHandle) -> Result<Mat4, TransformError> {
        self.update_node(node)?;
        Ok(self.node(node)?.world_matrix)
    }

    /// World-space position of a node
    pub fn world_position(&mut self, node: NodeHandle) -> Result<Vec3, TransformError> {
        Ok(self.world_transform(node)?.position)
    }

    /// World-space orientation of a node
    pub fn world_orientation(&mut self, node: NodeHandle) -> Result<Quat, TransformError> {
        Ok(self.world_transform(node)?.rotation)
    }

    /// Transform a local-space point on `node` into world space
    pub fn local_to_global(&mut self, node: NodeHandle, point: Vec3) -> Result<Vec3, TransformError> {
        Ok(self.world_transform(node)?.transform_point(point))
    }

    /// Recompute the chain from the nearest clean ancestor down to `node`
    fn update_node(&mut self, node: NodeHandle) -> Result<(), TransformError> {
        // Collect the dirty chain walking rootward. A stale parent link
        // (released ancestor) surfaces here as an error.
        let mut chain = Vec::new();
        let mut current = node;
        loop {
            let n = self.node(current)?;
            if !n.flags.contains(NodeFlags::DIRTY) {
                break;
            }
            chain.push(current);
            match n.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }

        // Compose downward from the clean ancestor, memoizing as we go.
        for handle in chain.into_iter().rev() {
            let parent_world = match self.node(handle)?.parent {
                Some(parent) => self.node(parent)?.world.clone(),
                None => Transform::identity(),
            };
            let n = self.node_mut(handle)?;
            n.world = parent_world.combine(&n.local);
            n.world_matrix = n.world.to_matrix();
            n.flags.remove(NodeFlags::DIRTY);
            n.flags.insert(NodeFlags::UPDATED);
        }
        Ok(())
    }

    /// Recompute every dirty node reachable from the root
    ///
    /// Run once per frame by the update dispatcher before any read-only
    /// render-phase task touches world transforms.
    pub fn propagate(&mut self) -> Result<(), TransformError> {
        let mut stack = vec![self.root];
        while let Some(handle) = stack.pop() {
            self.update_node(handle)?;
            stack.extend(self.node(handle)?.children.iter().copied());
        }
        Ok(())
    }

    /// Clear the per-frame UPDATED bits
    pub fn clear_updated_flags(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.flags.remove(NodeFlags::UPDATED);
        }
    }

    /// Whether the node's world transform was recomputed since the last
    /// [`clear_updated_flags`](Self::clear_updated_flags)
    pub fn was_updated(&self, node: NodeHandle) -> Result<bool, TransformError> {
        Ok(self.node(node)?.flags.contains(NodeFlags::UPDATED))
    }

    /// Move `node` under `parent`, preserving its local pose
    pub fn set_parent(&mut self, parent: NodeHandle, node: NodeHandle) -> Result<(), TransformError> {
        if node == self.root {
            return Err(TransformError::CyclicHierarchy);
        }
        self.node(node)?;
        self.node(parent)?;

        // Walk the new parent's ancestry; finding `node` there means the
        // reparent would cut a cycle into the tree.
        let mut current = Some(parent);
        while let Some(handle) = current {
            if handle == node {
                return Err(TransformError::CyclicHierarchy);
            }
            current = self.node(handle)?.parent;
        }

        let old_parent = self.node(node)?.parent;
        if let Some(old) = old_parent {
            if let Some(old_node) = self.nodes.get_mut(old) {
                old_node.children.retain(|&c| c != node);
            }
        }

        self.node_mut(parent)?.children.push(node);
        self.node_mut(node)?.parent = Some(parent);
        self.mark_dirty(node);
        Ok(())
    }

    /// Release a node, returning its index to the free list
    ///
    /// Caller contract: children must already be reparented or released.
    /// The graph does not cascade-destroy; a child left attached keeps a
    /// stale parent handle and any later world read through it fails with
    /// [`TransformError::StaleHandle`].
    pub fn release_node(&mut self, node: NodeHandle) -> Result<(), TransformError> {
        if node == self.root {
            return Err(TransformError::InvalidHandle);
        }
        let parent = self.node(node)?.parent;
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|&c| c != node);
            }
        }
        self.nodes
            .remove(node)
            .map(|_| ())
            .ok_or(TransformError::StaleHandle)
    }
}

impl Default for TransformGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_composes_parent_chain() {
        let mut graph = TransformGraph::new();
        let a = graph.create_node(None).unwrap();
        let b = graph.create_node(Some(a)).unwrap();
        let c = graph.create_node(Some(b)).unwrap();

        graph.set_local_position(a, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        graph.set_local_position(b, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        graph.set_local_position(c, Vec3::new(0.0, 0.0, 3.0)).unwrap();

        let world = graph.world_position(c).unwrap();
        assert_relative_eq!(world, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_world_matches_parent_times_local() {
        let mut graph = TransformGraph::new();
        let parent = graph.create_node(None).unwrap();
        let child = graph.create_node(Some(parent)).unwrap();

        graph.set_local_position(parent, Vec3::new(5.0, -1.0, 2.0)).unwrap();
        graph
            .set_local_orientation(parent, Quat::from_euler_angles(0.0, std::f32::consts::FRAC_PI_2, 0.0))
            .unwrap();
        graph.set_local_position(child, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        let parent_world = graph.world_matrix(parent).unwrap();
        let child_local = Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).to_matrix();
        let child_world = graph.world_matrix(child).unwrap();
        assert_relative_eq!(child_world, parent_world * child_local, epsilon = 1e-5);
    }

    #[test]
    fn test_dirty_propagates_to_descendants() {
        let mut graph = TransformGraph::new();
        let a = graph.create_node(None).unwrap();
        let b = graph.create_node(Some(a)).unwrap();

        // Clean both
        graph.world_position(b).unwrap();
        graph.clear_updated_flags();

        // Moving the parent must dirty the child
        graph.set_local_position(a, Vec3::new(0.0, 7.0, 0.0)).unwrap();
        let world = graph.world_position(b).unwrap();
        assert_relative_eq!(world.y, 7.0, epsilon = 1e-6);
        assert!(graph.was_updated(b).unwrap());
    }

    #[test]
    fn test_reparent_changes_world() {
        let mut graph = TransformGraph::new();
        let a = graph.create_node(None).unwrap();
        let b = graph.create_node(None).unwrap();
        let child = graph.create_node(Some(a)).unwrap();

        graph.set_local_position(a, Vec3::new(10.0, 0.0, 0.0)).unwrap();
        graph.set_local_position(b, Vec3::new(0.0, 10.0, 0.0)).unwrap();
        graph.set_local_position(child, Vec3::new(1.0, 1.0, 1.0)).unwrap();

        assert_relative_eq!(
            graph.world_position(child).unwrap(),
            Vec3::new(11.0, 1.0, 1.0),
            epsilon = 1e-6
        );

        graph.set_parent(b, child).unwrap();
        assert_relative_eq!(
            graph.world_position(child).unwrap(),
            Vec3::new(1.0, 11.0, 1.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_reparent_under_descendant_rejected() {
        let mut graph = TransformGraph::new();
        let a = graph.create_node(None).unwrap();
        let b = graph.create_node(Some(a)).unwrap();
        assert_eq!(graph.set_parent(b, a), Err(TransformError::CyclicHierarchy));
    }

    #[test]
    fn test_release_does_not_cascade_and_children_detectably_orphaned() {
        let mut graph = TransformGraph::new();
        let parent = graph.create_node(None).unwrap();
        let child = graph.create_node(Some(parent)).unwrap();

        graph.release_node(parent).unwrap();

        // Child still exists, but reads through the stale parent fail
        assert!(graph.local_position(child).is_ok());
        assert_eq!(graph.world_position(child), Err(TransformError::StaleHandle));

        // Reparenting to the root repairs it
        let root = graph.root();
        graph.set_parent(root, child).unwrap();
        assert!(graph.world_position(child).is_ok());
    }

    #[test]
    fn test_stale_handle_after_release() {
        let mut graph = TransformGraph::new();
        let node = graph.create_node(None).unwrap();
        graph.release_node(node).unwrap();
        assert_eq!(graph.local_position(node), Err(TransformError::StaleHandle));

        // The recycled slot gets a fresh generation
        let node2 = graph.create_node(None).unwrap();
        assert_eq!(node.index(), node2.index());
        assert_ne!(node, node2);
    }

    #[test]
    fn test_from_config_applies_node_cap() {
        let config = SceneConfig {
            max_nodes: Some(2),
            ..SceneConfig::default()
        };
        let mut graph = TransformGraph::from_config(&config);
        assert!(graph.create_node(None).is_ok());
        assert_eq!(graph.create_node(None), Err(TransformError::ArenaExhausted));

        let unbounded = SceneConfig::default();
        let mut graph = TransformGraph::from_config(&unbounded);
        for _ in 0..64 {
            assert!(graph.create_node(None).is_ok());
        }
    }

    #[test]
    fn test_arena_exhaustion() {
        // Root occupies one slot
        let mut graph = TransformGraph::with_max_nodes(2);
        assert!(graph.create_node(None).is_ok());
        assert_eq!(graph.create_node(None), Err(TransformError::ArenaExhausted));
    }

    #[test]
    fn test_set_world_position_back_solves_local() {
        let mut graph = TransformGraph::new();
        let parent = graph.create_node(None).unwrap();
        let child = graph.create_node(Some(parent)).unwrap();
        graph.set_local_position(parent, Vec3::new(4.0, 0.0, 0.0)).unwrap();

        graph.set_world_position(child, Vec3::new(10.0, 5.0, 0.0)).unwrap();
        assert_relative_eq!(
            graph.local_position(child).unwrap(),
            Vec3::new(6.0, 5.0, 0.0),
            epsilon = 1e-5
        );
        assert_relative_eq!(
            graph.world_position(child).unwrap(),
            Vec3::new(10.0, 5.0, 0.0),
            epsilon = 1e-5
        );
    }
}
