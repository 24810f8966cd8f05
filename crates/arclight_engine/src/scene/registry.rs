//! Scene registry: drawables, lights, meshes, and PVS computation
//!
//! The registry owns entity and light storage (free-list arenas with
//! generation-tagged handles, so removal never shifts or invalidates
//! other handles), the mesh reference-count table, and the spatial
//! partition. It is single-writer-per-frame: game-logic tasks mutate it
//! before the render phase begins, and render tasks treat it as a
//! read-only snapshot.

use log::debug;
use thiserror::Error;

use crate::core::config::SceneConfig;
use crate::foundation::collections::{Handle, HandleArena, HandleMap};
use crate::foundation::math::Vec3;
use crate::scene::bounds::{BoundingSphere, AABB};
use crate::scene::camera::Camera;
use crate::scene::partition::{QuadTree, QuadTreeConfig};
use crate::scene::skinning::{PoseState, SkeletonLibrary, SkinningState};
use crate::transform::{NodeHandle, TransformError, TransformGraph};

pub use slotmap::DefaultKey as MeshKey;

/// Scene registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    /// Entity or light handle is stale or out of range
    #[error("invalid entity or light handle")]
    InvalidHandle,

    /// Entity arena is at capacity
    #[error("entity arena exhausted")]
    CapacityExhausted,

    /// Mesh key does not resolve to a registered mesh
    #[error("unknown mesh")]
    UnknownMesh,

    /// The entity's mesh has no skeleton
    #[error("skeleton unavailable for mesh")]
    SkeletonUnavailable,

    /// Skeleton or animation resource has not been loaded
    #[error("resource missing: {0:#x}")]
    ResourceMissing(u64),

    /// The named clip is not part of the bound skeleton
    #[error("clip not found: {0:#x}")]
    ClipNotFound(u64),

    /// Underlying transform graph failure
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
}

/// Material parameters for a drawable
#[derive(Debug, Clone, Copy)]
pub struct MaterialParams {
    /// Albedo color (RGBA)
    pub albedo: [f32; 4],
    /// Specular reflectance factor
    pub specular: f32,
    /// Metalness factor
    pub metal: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            albedo: [1.0, 1.0, 1.0, 1.0],
            specular: 0.5,
            metal: 0.0,
        }
    }
}

/// A drawable entity
#[derive(Debug)]
pub struct Drawable {
    /// Mesh reference (refcounted in the mesh table)
    pub mesh: MeshKey,
    /// Back-reference to the owned transform node
    pub node: NodeHandle,
    /// Material parameters
    pub material: MaterialParams,
    /// Whether the entity participates in PVS computation
    pub visible: bool,
    /// Whether the entity is visible to ray queries
    pub ray_visible: bool,
    /// Transparent entities go to the forward-plus bucket
    pub transparent: bool,
    /// Pose state, present only for skinned entities
    pub pose: Option<PoseState>,
}

/// Handle to a drawable entity
pub type EntityHandle = Handle<Drawable>;

/// A point light
#[derive(Debug, Clone)]
pub struct PointLight {
    /// Light color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Influence radius
    pub radius: f32,
    /// Transform node the light follows
    pub node: NodeHandle,
}

/// A spot light
#[derive(Debug, Clone)]
pub struct SpotLight {
    /// Light color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Influence radius
    pub radius: f32,
    /// Full cone angle in radians
    pub cone_angle: f32,
    /// Transform node the light follows (orientation gives direction)
    pub node: NodeHandle,
    /// Optional shadow-caster camera
    pub shadow_camera: Option<Camera>,
}

/// Handle to a point light
pub type LightHandle = Handle<PointLight>;

/// Handle to a spot light
pub type SpotLightHandle = Handle<SpotLight>;

/// Mesh record tracked by the registry
#[derive(Debug)]
struct MeshRecord {
    guid: u64,
    bounding_radius: f32,
    skeleton_guid: Option<u64>,
    refcount: u32,
}

/// A culled, bucketed view of the scene for one camera
#[derive(Debug, Default)]
pub struct VisibleSet {
    /// Opaque drawables that passed frustum culling
    pub opaque: Vec<EntityHandle>,
    /// Transparent drawables that passed frustum culling
    pub transparent: Vec<EntityHandle>,
}

/// The scene registry
pub struct SceneRegistry {
    drawables: HandleArena<Drawable>,
    point_lights: HandleArena<PointLight>,
    spot_lights: HandleArena<SpotLight>,
    meshes: HandleMap<MeshRecord>,
    skeletons: SkeletonLibrary,
    partition: Option<QuadTree>,
}

impl SceneRegistry {
    /// Create a registry from configuration
    pub fn new(config: &SceneConfig) -> Self {
        let drawables = match config.max_entities {
            Some(max) => HandleArena::with_max_slots(max),
            None => HandleArena::new(),
        };
        let partition = config.enable_partition.then(|| {
            QuadTree::new(
                AABB::from_center_extents(Vec3::zeros(), Vec3::new(1000.0, 1000.0, 1000.0)),
                QuadTreeConfig {
                    max_entities_per_node: config.partition_split_threshold,
                    max_depth: config.partition_max_depth,
                    min_node_size: 1.0,
                },
            )
        });
        Self {
            drawables,
            point_lights: HandleArena::new(),
            spot_lights: HandleArena::new(),
            meshes: HandleMap::default(),
            skeletons: SkeletonLibrary::new(),
            partition,
        }
    }

    /// The skeleton resource library
    pub fn skeletons_mut(&mut self) -> &mut SkeletonLibrary {
        &mut self.skeletons
    }

    // ------------------------------------------------------------------
    // Meshes

    /// Register a mesh resource by GUID, or fetch the existing key
    ///
    /// The registry only tracks metadata it needs for culling and
    /// skinning; vertex data stays in the out-of-scope resource system.
    pub fn register_mesh(&mut self, guid: u64, bounding_radius: f32, skeleton_guid: Option<u64>) -> MeshKey {
        if let Some((key, _)) = self.meshes.iter().find(|(_, m)| m.guid == guid) {
            return key;
        }
        self.meshes.insert(MeshRecord {
            guid,
            bounding_radius,
            skeleton_guid,
            refcount: 0,
        })
    }

    /// GUID of a registered mesh
    pub fn mesh_guid(&self, mesh: MeshKey) -> Option<u64> {
        self.meshes.get(mesh).map(|m| m.guid)
    }

    /// Number of registered meshes (zero-refcount meshes are dropped)
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ------------------------------------------------------------------
    // Entities

    /// Create a drawable bound to a fresh transform node
    ///
    /// Increments the mesh reference count. The entity starts invisible;
    /// callers flip `visible` once its resources are in place, matching
    /// the two-step create/configure flow of the scene loader.
    pub fn create_drawable(
        &mut self,
        transforms: &mut TransformGraph,
        mesh: MeshKey,
    ) -> Result<EntityHandle, SceneError> {
        let record = self.meshes.get_mut(mesh).ok_or(SceneError::UnknownMesh)?;
        record.refcount += 1;

        let node = transforms.create_node(None).map_err(|e| {
            // Roll the refcount back; the entity never existed
            if let Some(record) = self.meshes.get_mut(mesh) {
                record.refcount -= 1;
            }
            SceneError::from(e)
        })?;

        let drawable = Drawable {
            mesh,
            node,
            material: MaterialParams::default(),
            visible: false,
            ray_visible: true,
            transparent: false,
            pose: None,
        };
        match self.drawables.insert(drawable) {
            Some(handle) => Ok(handle),
            None => {
                // Undo both allocations
                let _ = transforms.release_node(node);
                if let Some(record) = self.meshes.get_mut(mesh) {
                    record.refcount -= 1;
                }
                Err(SceneError::CapacityExhausted)
            }
        }
    }

    /// Create a drawable bound to an existing transform node
    ///
    /// Used by the scene loader, which builds the node hierarchy first
    /// and then attaches entities to nodes by table index.
    pub fn create_drawable_at(
        &mut self,
        node: NodeHandle,
        mesh: MeshKey,
    ) -> Result<EntityHandle, SceneError> {
        let record = self.meshes.get_mut(mesh).ok_or(SceneError::UnknownMesh)?;
        record.refcount += 1;

        let drawable = Drawable {
            mesh,
            node,
            material: MaterialParams::default(),
            visible: false,
            ray_visible: true,
            transparent: false,
            pose: None,
        };
        match self.drawables.insert(drawable) {
            Some(handle) => Ok(handle),
            None => {
                if let Some(record) = self.meshes.get_mut(mesh) {
                    record.refcount -= 1;
                }
                Err(SceneError::CapacityExhausted)
            }
        }
    }

    /// Remove an entity, releasing its node and mesh reference
    pub fn remove_entity(
        &mut self,
        transforms: &mut TransformGraph,
        entity: EntityHandle,
    ) -> Result<(), SceneError> {
        let drawable = self
            .drawables
            .remove(entity)
            .ok_or(SceneError::InvalidHandle)?;

        if let Some(partition) = self.partition.as_mut() {
            partition.remove(entity);
        }
        let _ = transforms.release_node(drawable.node);

        if let Some(record) = self.meshes.get_mut(drawable.mesh) {
            record.refcount = record.refcount.saturating_sub(1);
            if record.refcount == 0 {
                debug!("releasing mesh {:#x} at zero refcount", record.guid);
                self.meshes.remove(drawable.mesh);
            }
        }
        Ok(())
    }

    /// Borrow a drawable
    pub fn drawable(&self, entity: EntityHandle) -> Result<&Drawable, SceneError> {
        self.drawables.get(entity).ok_or(SceneError::InvalidHandle)
    }

    /// Borrow a drawable mutably
    pub fn drawable_mut(&mut self, entity: EntityHandle) -> Result<&mut Drawable, SceneError> {
        self.drawables
            .get_mut(entity)
            .ok_or(SceneError::InvalidHandle)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.drawables.len()
    }

    /// Iterate live entities
    pub fn entities(&self) -> impl Iterator<Item = (EntityHandle, &Drawable)> {
        self.drawables.iter()
    }

    // ------------------------------------------------------------------
    // Lights

    /// Add a point light attached to `node`
    pub fn add_point_light(
        &mut self,
        color: Vec3,
        intensity: f32,
        radius: f32,
        node: NodeHandle,
    ) -> LightHandle {
        match self.point_lights.insert(PointLight {
            color,
            intensity,
            radius,
            node,
        }) {
            Some(handle) => handle,
            // Light arenas are growable, insert cannot fail
            None => Handle::invalid(),
        }
    }

    /// Add a spot light attached to `node`
    pub fn add_spot_light(
        &mut self,
        color: Vec3,
        intensity: f32,
        radius: f32,
        cone_angle: f32,
        node: NodeHandle,
    ) -> SpotLightHandle {
        match self.spot_lights.insert(SpotLight {
            color,
            intensity,
            radius,
            cone_angle,
            node,
            shadow_camera: None,
        }) {
            Some(handle) => handle,
            None => Handle::invalid(),
        }
    }

    /// Remove a point light; stale handles are an error
    pub fn remove_point_light(&mut self, light: LightHandle) -> Result<(), SceneError> {
        self.point_lights
            .remove(light)
            .map(|_| ())
            .ok_or(SceneError::InvalidHandle)
    }

    /// Remove a spot light; stale handles are an error
    pub fn remove_spot_light(&mut self, light: SpotLightHandle) -> Result<(), SceneError> {
        self.spot_lights
            .remove(light)
            .map(|_| ())
            .ok_or(SceneError::InvalidHandle)
    }

    /// Borrow a point light
    pub fn point_light(&self, light: LightHandle) -> Result<&PointLight, SceneError> {
        self.point_lights.get(light).ok_or(SceneError::InvalidHandle)
    }

    /// Borrow a spot light mutably (shadow camera attachment)
    pub fn spot_light_mut(&mut self, light: SpotLightHandle) -> Result<&mut SpotLight, SceneError> {
        self.spot_lights
            .get_mut(light)
            .ok_or(SceneError::InvalidHandle)
    }

    /// Number of live point lights
    pub fn point_light_count(&self) -> usize {
        self.point_lights.len()
    }

    /// Iterate live point lights
    pub fn point_lights(&self) -> impl Iterator<Item = (LightHandle, &PointLight)> {
        self.point_lights.iter()
    }

    // ------------------------------------------------------------------
    // Visibility

    /// World-space bounding sphere of an entity
    ///
    /// Center is the node's world position; radius is the mesh bounding
    /// radius scaled by the largest world axis scale.
    pub fn bounding_sphere(
        &self,
        transforms: &mut TransformGraph,
        entity: EntityHandle,
    ) -> Result<BoundingSphere, SceneError> {
        let drawable = self.drawable(entity)?;
        let radius = self
            .meshes
            .get(drawable.mesh)
            .map(|m| m.bounding_radius)
            .unwrap_or(1.0);
        let world = transforms.world_transform(drawable.node)?;
        Ok(BoundingSphere {
            center: world.position,
            radius: radius * world.max_scale(),
        })
    }

    /// Refresh partition membership from current world positions
    ///
    /// Runs after transform propagation, before PVS computation.
    pub fn update_partition(&mut self, transforms: &mut TransformGraph) -> Result<(), SceneError> {
        let Some(_) = self.partition else {
            return Ok(());
        };
        let mut updates = Vec::new();
        for (handle, drawable) in self.drawables.iter() {
            if !drawable.visible {
                continue;
            }
            let radius = self
                .meshes
                .get(drawable.mesh)
                .map(|m| m.bounding_radius)
                .unwrap_or(1.0);
            let world = transforms.world_transform(drawable.node)?;
            updates.push((handle, world.position, radius * world.max_scale()));
        }
        if let Some(partition) = self.partition.as_mut() {
            for (handle, position, radius) in updates {
                partition.update(handle, position, radius);
            }
        }
        Ok(())
    }

    /// Compute the potentially-visible-set for a camera
    ///
    /// Entities with the visibility flag whose world bounding sphere
    /// passes the six-plane frustum test, bucketed by transparency.
    /// With the partition enabled only frustum-intersecting subtrees are
    /// visited; without it the scan is O(entities).
    pub fn compute_visible_set(
        &self,
        transforms: &mut TransformGraph,
        camera: &Camera,
    ) -> Result<VisibleSet, SceneError> {
        let frustum = camera.frustum();
        let mut set = VisibleSet::default();

        let candidates: Vec<EntityHandle> = match self.partition.as_ref() {
            Some(partition) => partition
                .query_frustum(&frustum)
                .into_iter()
                .map(|entry| entry.entity)
                .collect(),
            None => self.drawables.iter().map(|(h, _)| h).collect(),
        };

        for handle in candidates {
            let Some(drawable) = self.drawables.get(handle) else {
                continue;
            };
            if !drawable.visible {
                continue;
            }
            let radius = self
                .meshes
                .get(drawable.mesh)
                .map(|m| m.bounding_radius)
                .unwrap_or(1.0);
            let world = transforms.world_transform(drawable.node)?;
            let world_radius = radius * world.max_scale();
            if frustum.intersects_sphere(world.position, world_radius) {
                if drawable.transparent {
                    set.transparent.push(handle);
                } else {
                    set.opaque.push(handle);
                }
            }
        }
        Ok(set)
    }

    /// Gather point lights whose influence sphere touches the frustum
    pub fn gather_point_lights(
        &self,
        transforms: &mut TransformGraph,
        camera: &Camera,
    ) -> Result<Vec<LightHandle>, SceneError> {
        let frustum = camera.frustum();
        let mut visible = Vec::new();
        for (handle, light) in self.point_lights.iter() {
            let position = transforms.world_position(light.node)?;
            if frustum.intersects_sphere(position, light.radius) {
                visible.push(handle);
            }
        }
        Ok(visible)
    }

    // ------------------------------------------------------------------
    // Skinning

    /// Attach pose state to an entity, loading its skeleton lazily
    ///
    /// Distinct failure reasons, never panics: the mesh may have no
    /// skeleton, or the skeleton resource may not be loaded yet (the
    /// caller can retry once it is).
    pub fn enable_posing(&mut self, entity: EntityHandle) -> Result<(), SceneError> {
        let drawable = self
            .drawables
            .get(entity)
            .ok_or(SceneError::InvalidHandle)?;
        if drawable.pose.is_some() {
            return Ok(());
        }
        let record = self
            .meshes
            .get(drawable.mesh)
            .ok_or(SceneError::UnknownMesh)?;
        let skeleton_guid = record
            .skeleton_guid
            .ok_or(SceneError::SkeletonUnavailable)?;
        let skeleton = self
            .skeletons
            .get(skeleton_guid)
            .ok_or(SceneError::ResourceMissing(skeleton_guid))?;
        let pose = PoseState::new(skeleton);

        if let Some(drawable) = self.drawables.get_mut(entity) {
            drawable.pose = Some(pose);
        }
        Ok(())
    }

    /// Start a clip on a posed entity
    pub fn play_animation(
        &mut self,
        entity: EntityHandle,
        clip_guid: u64,
        weight: f32,
        looping: bool,
    ) -> Result<(), SceneError> {
        self.enable_posing(entity)?;

        let drawable = self
            .drawables
            .get(entity)
            .ok_or(SceneError::InvalidHandle)?;
        let skeleton_guid = match drawable.pose.as_ref() {
            Some(pose) => pose.skeleton,
            None => return Err(SceneError::SkeletonUnavailable),
        };
        let clip = self
            .skeletons
            .get(skeleton_guid)
            .ok_or(SceneError::ResourceMissing(skeleton_guid))?
            .clips
            .iter()
            .find(|c| c.guid == clip_guid)
            .cloned()
            .ok_or(SceneError::ClipNotFound(clip_guid))?;

        if let Some(pose) = self
            .drawables
            .get_mut(entity)
            .and_then(|d| d.pose.as_mut())
        {
            pose.play(&clip, weight, looping);
        }
        Ok(())
    }

    /// Skinning state of an entity
    pub fn skinning_state(&self, entity: EntityHandle) -> Result<SkinningState, SceneError> {
        let drawable = self.drawable(entity)?;
        Ok(drawable
            .pose
            .as_ref()
            .map(PoseState::state)
            .unwrap_or(SkinningState::NoSkeleton))
    }

    /// Advance all animation playback by `dt` seconds
    pub fn update_animations(&mut self, dt: f32) {
        for (_, drawable) in self.drawables.iter_mut() {
            if let Some(pose) = drawable.pose.as_mut() {
                pose.advance(dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::skinning::{AnimationClip, Skeleton};
    use approx::assert_relative_eq;

    fn registry() -> SceneRegistry {
        SceneRegistry::new(&SceneConfig {
            enable_partition: false,
            ..SceneConfig::default()
        })
    }

    #[test]
    fn test_create_and_remove_preserves_live_count() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(0xAB, 1.0, None);

        let handles: Vec<_> = (0..10)
            .map(|_| scene.create_drawable(&mut transforms, mesh).unwrap())
            .collect();
        assert_eq!(scene.entity_count(), 10);

        scene.remove_entity(&mut transforms, handles[3]).unwrap();
        scene.remove_entity(&mut transforms, handles[7]).unwrap();
        assert_eq!(scene.entity_count(), 8);

        // LIFO free list: the freed slots come back in reverse order
        let a = scene.create_drawable(&mut transforms, mesh).unwrap();
        let b = scene.create_drawable(&mut transforms, mesh).unwrap();
        assert_eq!(scene.entity_count(), 10);
        assert_eq!(a.index(), handles[7].index());
        assert_eq!(b.index(), handles[3].index());

        // Surviving handles still resolve to their original attributes
        for (i, handle) in handles.iter().enumerate() {
            if i == 3 || i == 7 {
                assert!(scene.drawable(*handle).is_err());
            } else {
                assert!(scene.drawable(*handle).is_ok());
            }
        }
    }

    #[test]
    fn test_mesh_refcount_drops_at_zero() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(0xCD, 1.0, None);

        let e1 = scene.create_drawable(&mut transforms, mesh).unwrap();
        let e2 = scene.create_drawable(&mut transforms, mesh).unwrap();
        assert_eq!(scene.mesh_count(), 1);

        scene.remove_entity(&mut transforms, e1).unwrap();
        assert_eq!(scene.mesh_count(), 1);
        scene.remove_entity(&mut transforms, e2).unwrap();
        assert_eq!(scene.mesh_count(), 0);
    }

    #[test]
    fn test_visible_set_culls_by_frustum() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(1, 1.0, None);

        let inside = scene.create_drawable(&mut transforms, mesh).unwrap();
        let behind = scene.create_drawable(&mut transforms, mesh).unwrap();

        for &(entity, z) in &[(inside, -10.0f32), (behind, 10.0f32)] {
            let node = scene.drawable(entity).unwrap().node;
            transforms
                .set_local_position(node, Vec3::new(0.0, 0.0, z))
                .unwrap();
            scene.drawable_mut(entity).unwrap().visible = true;
        }

        let camera = Camera::perspective(Vec3::zeros(), 60.0, 1.0, 0.1, 100.0);
        let set = scene.compute_visible_set(&mut transforms, &camera).unwrap();
        assert_eq!(set.opaque, vec![inside]);
        assert!(set.transparent.is_empty());
    }

    #[test]
    fn test_transparent_entities_bucketed_separately() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(1, 1.0, None);
        let entity = scene.create_drawable(&mut transforms, mesh).unwrap();
        let node = scene.drawable(entity).unwrap().node;
        transforms
            .set_local_position(node, Vec3::new(0.0, 0.0, -5.0))
            .unwrap();
        {
            let d = scene.drawable_mut(entity).unwrap();
            d.visible = true;
            d.transparent = true;
        }

        let camera = Camera::perspective(Vec3::zeros(), 60.0, 1.0, 0.1, 100.0);
        let set = scene.compute_visible_set(&mut transforms, &camera).unwrap();
        assert!(set.opaque.is_empty());
        assert_eq!(set.transparent, vec![entity]);
    }

    #[test]
    fn test_invisible_entities_excluded() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(1, 1.0, None);
        let entity = scene.create_drawable(&mut transforms, mesh).unwrap();
        let node = scene.drawable(entity).unwrap().node;
        transforms
            .set_local_position(node, Vec3::new(0.0, 0.0, -5.0))
            .unwrap();
        // visible stays false

        let camera = Camera::perspective(Vec3::zeros(), 60.0, 1.0, 0.1, 100.0);
        let set = scene.compute_visible_set(&mut transforms, &camera).unwrap();
        assert!(set.opaque.is_empty());
        let _ = entity;
    }

    #[test]
    fn test_bounding_sphere_scales_with_node() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let mesh = scene.register_mesh(1, 2.0, None);
        let entity = scene.create_drawable(&mut transforms, mesh).unwrap();
        let node = scene.drawable(entity).unwrap().node;
        transforms
            .set_local_scale(node, Vec3::new(3.0, 3.0, 3.0))
            .unwrap();

        let sphere = scene.bounding_sphere(&mut transforms, entity).unwrap();
        assert_relative_eq!(sphere.radius, 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_light_handles_survive_other_removals() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();
        let node = transforms.create_node(None).unwrap();

        let a = scene.add_point_light(Vec3::new(1.0, 0.0, 0.0), 10.0, 5.0, node);
        let b = scene.add_point_light(Vec3::new(0.0, 1.0, 0.0), 10.0, 5.0, node);

        scene.remove_point_light(a).unwrap();
        // b still resolves to its original attributes
        assert_relative_eq!(scene.point_light(b).unwrap().color.y, 1.0);
        // and a is detectably stale, not aliased to a survivor
        assert_eq!(scene.point_light(a).err(), Some(SceneError::InvalidHandle));

        // Reusing the freed slot does not resurrect the stale handle
        let c = scene.add_point_light(Vec3::new(0.0, 0.0, 1.0), 10.0, 5.0, node);
        assert_eq!(c.index(), a.index());
        assert!(scene.point_light(a).is_err());

        // Spot lights free-list the same way
        let spot = scene.add_spot_light(Vec3::new(1.0, 1.0, 1.0), 10.0, 5.0, 0.5, node);
        scene.remove_spot_light(spot).unwrap();
        assert_eq!(
            scene.remove_spot_light(spot).err(),
            Some(SceneError::InvalidHandle)
        );
    }

    #[test]
    fn test_posing_failure_reasons_are_distinct() {
        let mut transforms = TransformGraph::new();
        let mut scene = registry();

        let rigid = scene.register_mesh(1, 1.0, None);
        let skinned = scene.register_mesh(2, 1.0, Some(0x5E));

        let rigid_entity = scene.create_drawable(&mut transforms, rigid).unwrap();
        let skinned_entity = scene.create_drawable(&mut transforms, skinned).unwrap();

        assert_eq!(
            scene.enable_posing(rigid_entity),
            Err(SceneError::SkeletonUnavailable)
        );
        assert_eq!(
            scene.enable_posing(skinned_entity),
            Err(SceneError::ResourceMissing(0x5E))
        );

        // Load the skeleton, retry succeeds
        scene.skeletons_mut().register(Skeleton {
            guid: 0x5E,
            joint_count: 16,
            clips: vec![AnimationClip { guid: 9, duration: 1.0 }],
        });
        assert!(scene.enable_posing(skinned_entity).is_ok());
        assert_eq!(
            scene.skinning_state(skinned_entity).unwrap(),
            SkinningState::SkeletonReady
        );

        assert_eq!(
            scene.play_animation(skinned_entity, 1234, 1.0, false),
            Err(SceneError::ClipNotFound(1234))
        );
        assert!(scene.play_animation(skinned_entity, 9, 1.0, true).is_ok());
        assert_eq!(
            scene.skinning_state(skinned_entity).unwrap(),
            SkinningState::Posed
        );
    }
}
