//! Binary scene blob loading
//!
//! Scenes arrive as pre-built binary blobs produced by the offline
//! compiler: a fixed header followed by node, entity, and light tables.
//! The node table is topologically ordered (a parent always precedes its
//! children), so a single forward pass builds the hierarchy. Records are
//! read unaligned so the blob can live anywhere in memory.

use bytemuck::{Pod, Zeroable};
use log::info;
use thiserror::Error;

use crate::foundation::math::{Quat, Quaternion, Vec3};
use crate::scene::registry::{EntityHandle, LightHandle, SceneError, SceneRegistry};
use crate::transform::{NodeHandle, TransformError, TransformGraph};

/// Blob magic: "ARCS" little-endian
pub const SCENE_MAGIC: u32 = u32::from_le_bytes(*b"ARCS");

/// Blob format version understood by this loader
pub const SCENE_VERSION: u32 = 1;

/// Scene blob parsing and construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneLoadError {
    /// Header magic does not match
    #[error("bad scene magic {0:#010x}")]
    BadMagic(u32),

    /// Blob version is newer than this loader
    #[error("unsupported scene version {0}")]
    UnsupportedVersion(u32),

    /// Blob is shorter than its tables claim
    #[error("truncated scene blob: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    /// A node references a parent that does not precede it
    #[error("node {node} references forward parent {parent}")]
    ForwardParent { node: u32, parent: i32 },

    /// An entity or light references a node outside the node table
    #[error("record references node {index} of {count}")]
    BadNodeIndex { index: u32, count: u32 },

    /// Transform graph refused a node (arena exhausted)
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Scene registry refused an entity
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Blob header
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SceneHeader {
    /// Must equal [`SCENE_MAGIC`]
    pub magic: u32,
    /// Must equal [`SCENE_VERSION`]
    pub version: u32,
    /// Number of node records following the header
    pub node_count: u32,
    /// Number of entity records following the node table
    pub entity_count: u32,
    /// Number of light records following the entity table
    pub light_count: u32,
    /// Reserved
    pub _pad: u32,
}

/// One transform node: orientation quaternion, position + uniform scale,
/// and a parent table index (`-1` parents to the graph root)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NodeRecord {
    /// Orientation as (x, y, z, w)
    pub orientation: [f32; 4],
    /// Position in xyz, uniform scale in w
    pub position_scale: [f32; 4],
    /// Index of the parent node, or -1 for root-level nodes
    pub parent: i32,
}

/// One drawable entity bound to a node by table index
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct EntityRecord {
    /// Mesh resource GUID
    pub mesh_guid: u64,
    /// Node table index
    pub node: u32,
    /// Object-space bounding radius of the mesh
    pub bounding_radius: f32,
}

/// One point light bound to a node by table index
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct LightRecord {
    /// Light color
    pub color: [f32; 3],
    /// Intensity multiplier
    pub intensity: f32,
    /// Influence radius
    pub radius: f32,
    /// Node table index
    pub node: u32,
}

/// Handles produced by loading one scene blob
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadedScene {
    /// Transform nodes in blob table order
    pub nodes: Vec<NodeHandle>,
    /// Drawable entities in blob table order
    pub entities: Vec<EntityHandle>,
    /// Point lights in blob table order
    pub lights: Vec<LightHandle>,
}

fn read_record<T: Pod>(bytes: &[u8], offset: usize) -> Result<T, SceneLoadError> {
    let size = std::mem::size_of::<T>();
    let end = offset + size;
    if bytes.len() < end {
        return Err(SceneLoadError::Truncated {
            needed: end,
            actual: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[offset..end]))
}

/// Load a scene blob into the registry and transform graph
///
/// On success every blob node, entity, and light is live; entities come
/// back visible. Parse errors before construction begins leave both
/// structures untouched; construction errors (arena exhaustion) can leave
/// a partial scene, which the caller discards by tearing down the graph.
pub fn load_scene(
    bytes: &[u8],
    registry: &mut SceneRegistry,
    transforms: &mut TransformGraph,
) -> Result<LoadedScene, SceneLoadError> {
    let header: SceneHeader = read_record(bytes, 0)?;
    if header.magic != SCENE_MAGIC {
        return Err(SceneLoadError::BadMagic(header.magic));
    }
    if header.version != SCENE_VERSION {
        return Err(SceneLoadError::UnsupportedVersion(header.version));
    }

    let node_size = std::mem::size_of::<NodeRecord>();
    let entity_size = std::mem::size_of::<EntityRecord>();
    let light_size = std::mem::size_of::<LightRecord>();

    let nodes_offset = std::mem::size_of::<SceneHeader>();
    let entities_offset = nodes_offset + header.node_count as usize * node_size;
    let lights_offset = entities_offset + header.entity_count as usize * entity_size;
    let total = lights_offset + header.light_count as usize * light_size;
    if bytes.len() < total {
        return Err(SceneLoadError::Truncated {
            needed: total,
            actual: bytes.len(),
        });
    }

    // Validate every table index before touching the registry
    let mut records = Vec::with_capacity(header.node_count as usize);
    for i in 0..header.node_count {
        let record: NodeRecord = read_record(bytes, nodes_offset + i as usize * node_size)?;
        if record.parent >= 0 && record.parent as u32 >= i {
            return Err(SceneLoadError::ForwardParent {
                node: i,
                parent: record.parent,
            });
        }
        records.push(record);
    }

    let check_node = |index: u32| {
        if index >= header.node_count {
            Err(SceneLoadError::BadNodeIndex {
                index,
                count: header.node_count,
            })
        } else {
            Ok(())
        }
    };

    let mut entity_records = Vec::with_capacity(header.entity_count as usize);
    for i in 0..header.entity_count {
        let record: EntityRecord =
            read_record(bytes, entities_offset + i as usize * entity_size)?;
        check_node(record.node)?;
        entity_records.push(record);
    }

    let mut light_records = Vec::with_capacity(header.light_count as usize);
    for i in 0..header.light_count {
        let record: LightRecord = read_record(bytes, lights_offset + i as usize * light_size)?;
        check_node(record.node)?;
        light_records.push(record);
    }

    let mut scene = LoadedScene::default();

    for record in &records {
        // Parents precede children, so the handle already exists
        let parent = (record.parent >= 0).then(|| scene.nodes[record.parent as usize]);
        let node = transforms.create_node(parent)?;

        let [x, y, z, w] = record.orientation;
        transforms.set_local_orientation(node, Quat::from_quaternion(Quaternion::new(w, x, y, z)))?;
        let [px, py, pz, s] = record.position_scale;
        transforms.set_local_position(node, Vec3::new(px, py, pz))?;
        transforms.set_local_scale(node, Vec3::new(s, s, s))?;
        scene.nodes.push(node);
    }

    for record in &entity_records {
        let mesh = registry.register_mesh(record.mesh_guid, record.bounding_radius, None);
        let entity = registry.create_drawable_at(scene.nodes[record.node as usize], mesh)?;
        if let Ok(drawable) = registry.drawable_mut(entity) {
            drawable.visible = true;
        }
        scene.entities.push(entity);
    }

    for record in &light_records {
        let [r, g, b] = record.color;
        let light = registry.add_point_light(
            Vec3::new(r, g, b),
            record.intensity,
            record.radius,
            scene.nodes[record.node as usize],
        );
        scene.lights.push(light);
    }

    info!(
        "loaded scene: {} nodes, {} entities, {} lights",
        scene.nodes.len(),
        scene.entities.len(),
        scene.lights.len()
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SceneConfig;
    use approx::assert_relative_eq;

    fn push_record<T: Pod>(blob: &mut Vec<u8>, record: &T) {
        blob.extend_from_slice(bytemuck::bytes_of(record));
    }

    fn header(nodes: u32, entities: u32, lights: u32) -> SceneHeader {
        SceneHeader {
            magic: SCENE_MAGIC,
            version: SCENE_VERSION,
            node_count: nodes,
            entity_count: entities,
            light_count: lights,
            _pad: 0,
        }
    }

    fn node(parent: i32, position: [f32; 3], scale: f32) -> NodeRecord {
        NodeRecord {
            orientation: [0.0, 0.0, 0.0, 1.0],
            position_scale: [position[0], position[1], position[2], scale],
            parent,
        }
    }

    /// Root at (1,0,0), child offset (0,2,0), grandchild offset (0,0,3),
    /// entities on child and grandchild, light on the root.
    fn three_node_blob() -> Vec<u8> {
        let mut blob = Vec::new();
        push_record(&mut blob, &header(3, 2, 1));
        push_record(&mut blob, &node(-1, [1.0, 0.0, 0.0], 1.0));
        push_record(&mut blob, &node(0, [0.0, 2.0, 0.0], 1.0));
        push_record(&mut blob, &node(1, [0.0, 0.0, 3.0], 1.0));
        push_record(
            &mut blob,
            &EntityRecord {
                mesh_guid: 0xAAA,
                node: 1,
                bounding_radius: 1.0,
            },
        );
        push_record(
            &mut blob,
            &EntityRecord {
                mesh_guid: 0xBBB,
                node: 2,
                bounding_radius: 0.5,
            },
        );
        push_record(
            &mut blob,
            &LightRecord {
                color: [1.0, 0.9, 0.8],
                intensity: 100.0,
                radius: 25.0,
                node: 0,
            },
        );
        blob
    }

    #[test]
    fn test_load_builds_hierarchy() {
        let blob = three_node_blob();
        let mut registry = SceneRegistry::new(&SceneConfig::default());
        let mut transforms = TransformGraph::new();

        let scene = load_scene(&blob, &mut registry, &mut transforms).unwrap();
        assert_eq!(scene.nodes.len(), 3);
        assert_eq!(scene.entities.len(), 2);
        assert_eq!(scene.lights.len(), 1);

        // Offsets accumulate down the chain
        let world = transforms.world_position(scene.nodes[2]).unwrap();
        assert_relative_eq!(world, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);

        assert_eq!(registry.entity_count(), 2);
        assert!(registry.drawable(scene.entities[0]).unwrap().visible);
        assert_eq!(registry.point_light_count(), 1);
        assert_relative_eq!(
            registry.point_light(scene.lights[0]).unwrap().radius,
            25.0
        );
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let mut blob = three_node_blob();
        blob.truncate(blob.len() - 8);
        let mut registry = SceneRegistry::new(&SceneConfig::default());
        let mut transforms = TransformGraph::new();

        let err = load_scene(&blob, &mut registry, &mut transforms).unwrap_err();
        assert!(matches!(err, SceneLoadError::Truncated { .. }));
        // Parse failed before construction started; only the implicit
        // root remains
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(transforms.node_count(), 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut blob = three_node_blob();
        blob[0] = 0;
        let mut registry = SceneRegistry::new(&SceneConfig::default());
        let mut transforms = TransformGraph::new();
        assert!(matches!(
            load_scene(&blob, &mut registry, &mut transforms),
            Err(SceneLoadError::BadMagic(_))
        ));
    }

    #[test]
    fn test_forward_parent_rejected() {
        let mut blob = Vec::new();
        push_record(&mut blob, &header(2, 0, 0));
        // Node 0 claims node 1 as its parent
        push_record(&mut blob, &node(1, [0.0, 0.0, 0.0], 1.0));
        push_record(&mut blob, &node(-1, [0.0, 0.0, 0.0], 1.0));

        let mut registry = SceneRegistry::new(&SceneConfig::default());
        let mut transforms = TransformGraph::new();
        assert_eq!(
            load_scene(&blob, &mut registry, &mut transforms),
            Err(SceneLoadError::ForwardParent { node: 0, parent: 1 })
        );
    }

    #[test]
    fn test_entity_with_bad_node_index_rejected() {
        let mut blob = Vec::new();
        push_record(&mut blob, &header(1, 1, 0));
        push_record(&mut blob, &node(-1, [0.0, 0.0, 0.0], 1.0));
        push_record(
            &mut blob,
            &EntityRecord {
                mesh_guid: 1,
                node: 5,
                bounding_radius: 1.0,
            },
        );

        let mut registry = SceneRegistry::new(&SceneConfig::default());
        let mut transforms = TransformGraph::new();
        assert_eq!(
            load_scene(&blob, &mut registry, &mut transforms),
            Err(SceneLoadError::BadNodeIndex { index: 5, count: 1 })
        );
        assert_eq!(transforms.node_count(), 1);
    }
}
