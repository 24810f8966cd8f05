//! GPU abstraction layer
//!
//! A thin, testable seam over the graphics device. Work is recorded as
//! typed commands into a [`CommandContext`], submitted to the
//! [`RenderDevice`], and ordered by a monotonic fence timeline. Resource
//! lifetimes, memory accounting, and frame pipelining live here; actual
//! device dispatch sits behind this boundary.

pub mod command;
pub mod device;
pub mod pso;
pub mod resources;

pub use command::{CommandContext, GpuCommand};
pub use device::{FenceValue, GpuError, RenderDevice, SubmitInfo};
pub use pso::{PipelineRegistry, PsoDesc, PsoId, PsoState};
pub use resources::{
    BufferDesc, BufferHandle, BufferUsage, ResourceState, TextureDesc, TextureFormat,
    TextureHandle, TextureUsage,
};
