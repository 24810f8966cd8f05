//! Deferred world renderer
//!
//! Renders the potentially-visible-set through a fixed pass chain built
//! on the frame graph each frame: clear, depth pre-pass, G-buffer fill,
//! tiled light gathering, deferred shading, then a forward pass for
//! transparents. Pipeline state objects are registered and queued for
//! asynchronous compilation at construction; passes whose PSO has not
//! finished compiling skip their draws for the frame.

mod gbuffer;
mod lights;
mod world;

pub use gbuffer::GBuffer;
pub use lights::{GpuPointLight, LIGHT_MAP_TILE_SIZE};
pub use world::{RenderError, WorldRenderer};
