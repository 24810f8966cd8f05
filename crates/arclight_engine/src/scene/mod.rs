//! Scene registry, visibility culling, and scene loading
//!
//! The scene registry owns drawable entities and lights, maintains the
//! quad-tree spatial partition, and produces the potentially-visible-set
//! (PVS) per camera. Scene content arrives as pre-built binary blobs
//! produced by the offline compiler and loaded by GUID.

pub mod bounds;
pub mod camera;
pub mod loader;
pub mod partition;
pub mod registry;
pub mod skinning;

pub use bounds::{BoundingSphere, Frustum, Plane, AABB};
pub use camera::Camera;
pub use loader::{load_scene, LoadedScene, SceneLoadError};
pub use partition::{QuadTree, QuadTreeConfig};
pub use registry::{
    Drawable, EntityHandle, LightHandle, MaterialParams, MeshKey, PointLight, SceneError,
    SceneRegistry, SpotLight, SpotLightHandle, VisibleSet,
};
pub use skinning::{PoseState, SkeletonLibrary, SkinningState};
