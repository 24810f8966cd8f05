//! Quad-tree spatial partitioning structure
//!
//! Divides the scene into hierarchical XZ regions for fast visibility
//! queries. Each node subdivides into 4 quadrants when entity density
//! exceeds a threshold. An entity's coarse position determines a single
//! owning leaf; entities are never duplicated across nodes.

use crate::foundation::math::Vec3;
use crate::scene::bounds::{Frustum, AABB};
use crate::scene::registry::EntityHandle;

/// Configuration for quad-tree behavior
#[derive(Debug, Clone)]
pub struct QuadTreeConfig {
    /// Maximum entities per leaf before subdivision
    pub max_entities_per_node: usize,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Minimum node size (prevents excessive subdivision)
    pub min_node_size: f32,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            max_entities_per_node: 8,
            max_depth: 8,
            min_node_size: 1.0,
        }
    }
}

/// Entity stored in the quad-tree with position and bounding radius
#[derive(Debug, Clone, Copy)]
pub struct PartitionEntry {
    /// The owning entity
    pub entity: EntityHandle,
    /// Coarse world position
    pub position: Vec3,
    /// World-space bounding radius
    pub radius: f32,
}

/// Single node in the quad-tree hierarchy
#[derive(Debug)]
struct QuadTreeNode {
    bounds: AABB,
    entries: Vec<PartitionEntry>,
    children: Option<Box<[QuadTreeNode; 4]>>,
    depth: u32,
}

impl QuadTreeNode {
    fn new(bounds: AABB, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Quadrant index (0-3) for a position: bit 0 = +X, bit 1 = +Z
    fn quadrant_index(&self, position: Vec3) -> usize {
        let center = self.bounds.center();
        let x_bit = usize::from(position.x >= center.x);
        let z_bit = usize::from(position.z >= center.z);
        (z_bit << 1) | x_bit
    }

    fn subdivide(&mut self) {
        if self.children.is_some() {
            return;
        }

        let center = self.bounds.center();
        let (min, max) = (self.bounds.min, self.bounds.max);
        let depth = self.depth + 1;

        // Children keep the full vertical extent; the tree partitions XZ
        let make = |min_x: f32, min_z: f32, max_x: f32, max_z: f32| {
            QuadTreeNode::new(
                AABB::new(Vec3::new(min_x, min.y, min_z), Vec3::new(max_x, max.y, max_z)),
                depth,
            )
        };

        let children = Box::new([
            make(min.x, min.z, center.x, center.z),
            make(center.x, min.z, max.x, center.z),
            make(min.x, center.z, center.x, max.z),
            make(center.x, center.z, max.x, max.z),
        ]);

        let entries = std::mem::take(&mut self.entries);
        self.children = Some(children);
        for entry in entries {
            self.insert_into_child(entry);
        }
    }

    fn insert_into_child(&mut self, entry: PartitionEntry) {
        let index = self.quadrant_index(entry.position);
        if let Some(children) = self.children.as_mut() {
            children[index].insert(entry);
        }
    }

    /// Insert without split checks; used when redistributing entries
    /// into freshly created children
    fn insert(&mut self, entry: PartitionEntry) {
        if self.is_leaf() {
            self.entries.push(entry);
        } else {
            self.insert_into_child(entry);
        }
    }

    fn remove(&mut self, entity: EntityHandle) -> bool {
        if self.is_leaf() {
            let before = self.entries.len();
            self.entries.retain(|e| e.entity != entity);
            return self.entries.len() != before;
        }
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.remove(entity) {
                    return true;
                }
            }
        }
        false
    }

    fn query_frustum(&self, frustum: &Frustum, out: &mut Vec<PartitionEntry>) {
        if !frustum.intersects_aabb(&self.bounds) {
            return;
        }
        if self.is_leaf() {
            out.extend(self.entries.iter().copied());
            return;
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_frustum(frustum, out);
            }
        }
    }

    fn query_radius(&self, center: Vec3, radius: f32, out: &mut Vec<PartitionEntry>) {
        if !self.bounds.intersects_sphere(center, radius) {
            return;
        }
        if self.is_leaf() {
            for entry in &self.entries {
                if (entry.position - center).norm() <= radius + entry.radius {
                    out.push(*entry);
                }
            }
            return;
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_radius(center, radius, out);
            }
        }
    }

    fn count(&self) -> usize {
        if self.is_leaf() {
            return self.entries.len();
        }
        self.children
            .as_ref()
            .map(|c| c.iter().map(QuadTreeNode::count).sum())
            .unwrap_or(0)
    }
}

/// Quad-tree spatial partition over the scene's XZ extent
#[derive(Debug)]
pub struct QuadTree {
    root: QuadTreeNode,
    config: QuadTreeConfig,
}

impl QuadTree {
    /// Create a quad-tree covering `bounds`
    pub fn new(bounds: AABB, config: QuadTreeConfig) -> Self {
        Self {
            root: QuadTreeNode::new(bounds, 0),
            config,
        }
    }

    /// Insert an entity; positions outside the root bounds are clamped
    /// into the nearest edge leaf
    pub fn insert(&mut self, entity: EntityHandle, position: Vec3, radius: f32) {
        let entry = PartitionEntry {
            entity,
            position,
            radius,
        };
        Self::insert_rec(&mut self.root, entry, &self.config);
    }

    fn insert_rec(node: &mut QuadTreeNode, entry: PartitionEntry, config: &QuadTreeConfig) {
        if node.is_leaf() {
            node.entries.push(entry);

            let width = node.bounds.max.x - node.bounds.min.x;
            let should_split = node.entries.len() > config.max_entities_per_node
                && node.depth < config.max_depth
                && width * 0.5 >= config.min_node_size;
            if should_split {
                node.subdivide();
            }
            return;
        }

        let index = node.quadrant_index(entry.position);
        if let Some(children) = node.children.as_mut() {
            Self::insert_rec(&mut children[index], entry, config);
        }
    }

    /// Remove an entity; returns whether it was present
    pub fn remove(&mut self, entity: EntityHandle) -> bool {
        self.root.remove(entity)
    }

    /// Move an entity: remove and reinsert under its new position
    pub fn update(&mut self, entity: EntityHandle, position: Vec3, radius: f32) {
        self.remove(entity);
        self.insert(entity, position, radius);
    }

    /// Collect entries in leaves that intersect the frustum
    pub fn query_frustum(&self, frustum: &Frustum) -> Vec<PartitionEntry> {
        let mut out = Vec::new();
        self.root.query_frustum(frustum, &mut out);
        out
    }

    /// Collect entries within `radius` of `center`
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<PartitionEntry> {
        let mut out = Vec::new();
        self.root.query_radius(center, radius, &mut out);
        out
    }

    /// Total entries stored
    pub fn entity_count(&self) -> usize {
        self.root.count()
    }

    /// Whether the root has subdivided
    pub fn is_subdivided(&self) -> bool {
        !self.root.is_leaf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::Handle;

    fn handle(i: u32) -> EntityHandle {
        Handle::new(i, 0)
    }

    fn world_bounds() -> AABB {
        AABB::new(
            Vec3::new(-100.0, -100.0, -100.0),
            Vec3::new(100.0, 100.0, 100.0),
        )
    }

    #[test]
    fn test_basic_insertion() {
        let mut tree = QuadTree::new(world_bounds(), QuadTreeConfig::default());
        tree.insert(handle(0), Vec3::zeros(), 1.0);
        assert_eq!(tree.entity_count(), 1);
    }

    #[test]
    fn test_subdivision_on_capacity() {
        let config = QuadTreeConfig {
            max_entities_per_node: 4,
            max_depth: 3,
            min_node_size: 1.0,
        };
        let mut tree = QuadTree::new(world_bounds(), config);
        for i in 0..10 {
            let x = (i as f32) * 5.0 - 25.0;
            tree.insert(handle(i), Vec3::new(x, 0.0, x), 1.0);
        }
        assert_eq!(tree.entity_count(), 10);
        assert!(tree.is_subdivided());
    }

    #[test]
    fn test_radius_query() {
        let mut tree = QuadTree::new(world_bounds(), QuadTreeConfig::default());
        tree.insert(handle(0), Vec3::zeros(), 1.0);
        tree.insert(handle(1), Vec3::new(5.0, 0.0, 0.0), 1.0);
        tree.insert(handle(2), Vec3::new(50.0, 0.0, 0.0), 1.0);

        let found = tree.query_radius(Vec3::zeros(), 10.0);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_remove_invalidates_membership() {
        let mut tree = QuadTree::new(world_bounds(), QuadTreeConfig::default());
        tree.insert(handle(0), Vec3::zeros(), 1.0);
        assert!(tree.remove(handle(0)));
        assert!(!tree.remove(handle(0)));
        assert_eq!(tree.entity_count(), 0);
    }
}
