//! # Arclight Engine
//!
//! Core runtime of a real-time 3D rendering engine: a hierarchical
//! transform graph, a scene registry with visibility culling, a frame
//! graph that schedules render passes from declared resource accesses,
//! a deferred world renderer, tiled texture streaming, and a dependency
//! aware update-task dispatcher.
//!
//! ## Frame anatomy
//!
//! ```rust,no_run
//! use arclight_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     arclight_engine::foundation::logging::init();
//!     let config = EngineConfig::default();
//!
//!     let mut device = RenderDevice::new(&config.renderer);
//!     let mut pipelines = PipelineRegistry::new();
//!     let mut renderer = WorldRenderer::new(&mut device, &mut pipelines, &config.renderer)?;
//!
//!     let mut transforms = TransformGraph::from_config(&config.scene);
//!     let mut scene = SceneRegistry::new(&config.scene);
//!     let camera = Camera::perspective(Vec3::new(0.0, 2.0, 10.0), 60.0, 16.0 / 9.0, 0.1, 500.0);
//!
//!     loop {
//!         transforms.propagate()?;
//!         renderer.render_world(&mut device, &mut pipelines, &scene, &mut transforms, &camera)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod foundation;
pub mod framegraph;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod streaming;
pub mod tasks;
pub mod transform;

#[cfg(test)]
mod tests;

/// Commonly used types, re-exported for host applications
pub mod prelude {
    pub use crate::core::config::{EngineConfig, RendererConfig, SceneConfig, StreamingConfig};
    pub use crate::foundation::math::{Mat4, Quat, Transform, Vec2, Vec3, Vec4};
    pub use crate::framegraph::{FrameGraph, FrameResourceHandle, PassBuilder};
    pub use crate::gpu::{CommandContext, PipelineRegistry, RenderDevice};
    pub use crate::renderer::WorldRenderer;
    pub use crate::scene::{
        load_scene, Camera, EntityHandle, SceneRegistry, VisibleSet,
    };
    pub use crate::streaming::TextureStreamer;
    pub use crate::tasks::UpdateDispatcher;
    pub use crate::transform::{NodeHandle, TransformGraph};
}
