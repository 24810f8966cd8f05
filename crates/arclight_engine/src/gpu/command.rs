//! Typed command recording
//!
//! Passes record work as typed commands instead of calling the device
//! directly. The command list is the unit of submission and the seam the
//! frame graph inserts barriers into, which also makes recorded frames
//! directly inspectable by tests.

use crate::gpu::pso::PsoId;
use crate::gpu::resources::{BufferHandle, ResourceState, TextureHandle};

/// One recorded device command
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Transition a texture between logical states
    TextureBarrier {
        texture: TextureHandle,
        from: ResourceState,
        to: ResourceState,
    },
    /// Transition a buffer between logical states
    BufferBarrier {
        buffer: BufferHandle,
        from: ResourceState,
        to: ResourceState,
    },
    /// Clear a color target
    ClearTarget {
        texture: TextureHandle,
        color: [f32; 4],
    },
    /// Clear a depth target
    ClearDepth { texture: TextureHandle, depth: f32 },
    /// Begin a raster pass over the given attachments
    BeginPass {
        color_targets: Vec<TextureHandle>,
        depth_target: Option<TextureHandle>,
    },
    /// End the current raster pass
    EndPass,
    /// Bind a pipeline state object
    BindPipeline { pso: PsoId },
    /// Draw one mesh instance
    Draw { mesh_guid: u64 },
    /// Dispatch a compute grid
    Dispatch { x: u32, y: u32, z: u32 },
    /// Upload CPU bytes into a buffer
    UploadBuffer {
        buffer: BufferHandle,
        offset: usize,
        bytes: Vec<u8>,
    },
    /// Copy one streamed tile from a staging buffer into a pooled block
    CopyTile {
        staging: BufferHandle,
        staging_offset: usize,
        block: u32,
    },
}

/// Records commands for one submission
#[derive(Debug, Default)]
pub struct CommandContext {
    commands: Vec<GpuCommand>,
}

impl CommandContext {
    /// Create an empty command list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw command
    pub fn push(&mut self, command: GpuCommand) {
        self.commands.push(command);
    }

    /// Record a texture state transition
    pub fn texture_barrier(&mut self, texture: TextureHandle, from: ResourceState, to: ResourceState) {
        self.commands.push(GpuCommand::TextureBarrier { texture, from, to });
    }

    /// Record a buffer state transition
    pub fn buffer_barrier(&mut self, buffer: BufferHandle, from: ResourceState, to: ResourceState) {
        self.commands.push(GpuCommand::BufferBarrier { buffer, from, to });
    }

    /// Record a color clear
    pub fn clear_target(&mut self, texture: TextureHandle, color: [f32; 4]) {
        self.commands.push(GpuCommand::ClearTarget { texture, color });
    }

    /// Record a depth clear
    pub fn clear_depth(&mut self, texture: TextureHandle, depth: f32) {
        self.commands.push(GpuCommand::ClearDepth { texture, depth });
    }

    /// Open a raster pass
    pub fn begin_pass(&mut self, color_targets: Vec<TextureHandle>, depth_target: Option<TextureHandle>) {
        self.commands.push(GpuCommand::BeginPass {
            color_targets,
            depth_target,
        });
    }

    /// Close the current raster pass
    pub fn end_pass(&mut self) {
        self.commands.push(GpuCommand::EndPass);
    }

    /// Bind a pipeline
    pub fn bind_pipeline(&mut self, pso: PsoId) {
        self.commands.push(GpuCommand::BindPipeline { pso });
    }

    /// Draw one mesh
    pub fn draw(&mut self, mesh_guid: u64) {
        self.commands.push(GpuCommand::Draw { mesh_guid });
    }

    /// Dispatch a compute grid
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(GpuCommand::Dispatch { x, y, z });
    }

    /// Upload bytes into a buffer at `offset`
    pub fn upload_buffer(&mut self, buffer: BufferHandle, offset: usize, bytes: Vec<u8>) {
        self.commands.push(GpuCommand::UploadBuffer {
            buffer,
            offset,
            bytes,
        });
    }

    /// Copy a tile from staging into a pooled streaming block
    pub fn copy_tile(&mut self, staging: BufferHandle, staging_offset: usize, block: u32) {
        self.commands.push(GpuCommand::CopyTile {
            staging,
            staging_offset,
            block,
        });
    }

    /// Recorded commands in order
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw commands, for pass-level assertions
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { .. }))
            .count()
    }

    /// Take the recorded commands, leaving the context empty
    pub fn take(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }
}
