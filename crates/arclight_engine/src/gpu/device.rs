//! Render device: resources, submissions, and the fence timeline
//!
//! The device tracks every texture and buffer allocation against a fixed
//! memory budget, orders submissions on a monotonic fence timeline, and
//! enforces the frame ring: beginning a new frame blocks on the fence of
//! the frame `buffering_depth` submissions back, so the CPU can never run
//! more than that many frames ahead.

use std::collections::VecDeque;

use log::{debug, error, warn};
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::foundation::collections::HandleArena;
use crate::gpu::command::{CommandContext, GpuCommand};
use crate::gpu::resources::{
    Buffer, BufferDesc, BufferHandle, ResourceState, Texture, TextureDesc, TextureHandle,
};

/// Point on the device's monotonic submission timeline
pub type FenceValue = u64;

/// Device errors
///
/// `DeviceLost` is fatal: every subsequent call fails with it and the
/// host application is expected to tear down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GpuError {
    /// Allocation would exceed the memory budget
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    /// Handle is stale or was never allocated
    #[error("invalid resource handle")]
    InvalidHandle,

    /// A barrier's source state does not match the tracked state
    #[error("barrier hazard: resource is in {actual:?}, barrier expects {expected:?}")]
    BarrierMismatch {
        expected: ResourceState,
        actual: ResourceState,
    },

    /// The device was lost; unrecoverable
    #[error("device lost")]
    DeviceLost,
}

/// Result of a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Fence value that completes when this submission retires
    pub fence: FenceValue,
    /// Number of commands submitted
    pub command_count: usize,
}

/// The simulated render device
pub struct RenderDevice {
    textures: HandleArena<Texture>,
    buffers: HandleArena<Buffer>,
    memory_budget: usize,
    memory_used: usize,
    buffering_depth: usize,
    next_fence: FenceValue,
    completed_fence: FenceValue,
    frames_in_flight: VecDeque<FenceValue>,
    last_commands: Vec<GpuCommand>,
    lost: bool,
}

impl RenderDevice {
    /// Create a device with the configured budget and frame ring depth
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            textures: HandleArena::new(),
            buffers: HandleArena::new(),
            memory_budget: config.memory_budget,
            memory_used: 0,
            buffering_depth: config.buffering_depth.max(1),
            next_fence: 1,
            completed_fence: 0,
            frames_in_flight: VecDeque::new(),
            last_commands: Vec::new(),
            lost: false,
        }
    }

    fn check_alive(&self) -> Result<(), GpuError> {
        if self.lost {
            Err(GpuError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn reserve(&mut self, size: usize) -> Result<(), GpuError> {
        let available = self.memory_budget - self.memory_used;
        if size > available {
            warn!(
                "allocation of {} bytes rejected, {} of {} in use",
                size, self.memory_used, self.memory_budget
            );
            return Err(GpuError::OutOfMemory {
                requested: size,
                available,
            });
        }
        self.memory_used += size;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resources

    /// Allocate a texture against the budget
    pub fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureHandle, GpuError> {
        self.check_alive()?;
        self.reserve(desc.byte_size())?;
        let texture = Texture {
            desc,
            state: ResourceState::Common,
        };
        // Resource arenas are growable; only the budget bounds them
        self.textures.insert(texture).ok_or(GpuError::InvalidHandle)
    }

    /// Allocate a buffer against the budget
    pub fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferHandle, GpuError> {
        self.check_alive()?;
        self.reserve(desc.size)?;
        let buffer = Buffer {
            desc,
            state: ResourceState::Common,
        };
        self.buffers.insert(buffer).ok_or(GpuError::InvalidHandle)
    }

    /// Free a texture, returning its bytes to the budget
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> Result<(), GpuError> {
        let texture = self
            .textures
            .remove(handle)
            .ok_or(GpuError::InvalidHandle)?;
        self.memory_used -= texture.desc.byte_size();
        Ok(())
    }

    /// Free a buffer, returning its bytes to the budget
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<(), GpuError> {
        let buffer = self.buffers.remove(handle).ok_or(GpuError::InvalidHandle)?;
        self.memory_used -= buffer.desc.size;
        Ok(())
    }

    /// Description of a live texture
    pub fn texture_desc(&self, handle: TextureHandle) -> Result<TextureDesc, GpuError> {
        self.textures
            .get(handle)
            .map(|t| t.desc)
            .ok_or(GpuError::InvalidHandle)
    }

    /// Current tracked state of a live texture
    pub fn texture_state(&self, handle: TextureHandle) -> Result<ResourceState, GpuError> {
        self.textures
            .get(handle)
            .map(|t| t.state)
            .ok_or(GpuError::InvalidHandle)
    }

    /// Bytes currently allocated
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Total budget in bytes
    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    // ------------------------------------------------------------------
    // Submission and fences

    /// Submit a command list, returning the fence that retires it
    ///
    /// Barriers are validated against tracked resource state; a mismatch
    /// means a pass wrote a resource the graph thought was in another
    /// state, which is a hazard, so the whole submission is refused.
    pub fn submit(&mut self, mut context: CommandContext) -> Result<SubmitInfo, GpuError> {
        self.check_alive()?;
        let commands = context.take();

        for command in &commands {
            match command {
                GpuCommand::TextureBarrier { texture, from, to } => {
                    let resource = self
                        .textures
                        .get_mut(*texture)
                        .ok_or(GpuError::InvalidHandle)?;
                    if resource.state != *from {
                        return Err(GpuError::BarrierMismatch {
                            expected: *from,
                            actual: resource.state,
                        });
                    }
                    resource.state = *to;
                }
                GpuCommand::BufferBarrier { buffer, from, to } => {
                    let resource = self
                        .buffers
                        .get_mut(*buffer)
                        .ok_or(GpuError::InvalidHandle)?;
                    if resource.state != *from {
                        return Err(GpuError::BarrierMismatch {
                            expected: *from,
                            actual: resource.state,
                        });
                    }
                    resource.state = *to;
                }
                _ => {}
            }
        }

        let fence = self.next_fence;
        self.next_fence += 1;
        debug!("submitted {} commands at fence {}", commands.len(), fence);
        let info = SubmitInfo {
            fence,
            command_count: commands.len(),
        };
        self.last_commands = commands;
        Ok(info)
    }

    /// Commands from the most recent submission, for inspection
    pub fn last_commands(&self) -> &[GpuCommand] {
        &self.last_commands
    }

    /// Whether a fence value has retired
    pub fn is_fence_complete(&self, fence: FenceValue) -> bool {
        fence <= self.completed_fence
    }

    /// Block until a fence retires
    ///
    /// Without a physical device the wait itself is immediate, but it
    /// still advances the completed point of the timeline, so callers
    /// observe the same ordering a real device would impose.
    pub fn wait_for_fence(&mut self, fence: FenceValue) -> Result<(), GpuError> {
        self.check_alive()?;
        if fence >= self.next_fence {
            // Waiting on a fence that was never submitted would deadlock
            error!("wait on unsubmitted fence {}", fence);
            self.lost = true;
            return Err(GpuError::DeviceLost);
        }
        if fence > self.completed_fence {
            self.completed_fence = fence;
        }
        Ok(())
    }

    /// Most recently retired fence value
    pub fn completed_fence(&self) -> FenceValue {
        self.completed_fence
    }

    // ------------------------------------------------------------------
    // Frame ring

    /// Begin a frame, stalling on the frame `buffering_depth` back
    ///
    /// The caller closes the frame by passing the fence of its final
    /// submission to [`end_frame`].
    ///
    /// [`end_frame`]: RenderDevice::end_frame
    pub fn begin_frame(&mut self) -> Result<(), GpuError> {
        self.check_alive()?;
        while self.frames_in_flight.len() >= self.buffering_depth {
            let oldest = self.frames_in_flight.pop_front().unwrap_or(0);
            debug!("frame ring full, waiting on fence {}", oldest);
            self.wait_for_fence(oldest)?;
        }
        Ok(())
    }

    /// End a frame, placing its final fence on the ring
    pub fn end_frame(&mut self, fence: FenceValue) {
        self.frames_in_flight.push_back(fence);
    }

    /// Frames currently on the ring
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.len()
    }

    /// Mark the device lost; every later call fails
    pub fn mark_lost(&mut self) {
        error!("render device marked lost");
        self.lost = true;
    }
}
