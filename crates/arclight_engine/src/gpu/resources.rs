//! GPU resource descriptions and handles

use bitflags::bitflags;

use crate::foundation::collections::Handle;

/// Pixel formats used by the renderer's attachments and streamed tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// Two-channel 32-bit unsigned integer
    Rg32Uint,
    /// 32-bit float depth
    Depth32Float,
}

impl TextureFormat {
    /// Bytes per pixel for size accounting
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rg32Uint => 8,
            TextureFormat::Depth32Float => 4,
        }
    }
}

/// Logical resource state tracked for hazard barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Initial state, no pending access
    Common,
    /// Written as a color attachment
    RenderTarget,
    /// Written as a depth attachment
    DepthWrite,
    /// Read by shaders
    ShaderResource,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
    /// Written by compute shaders
    UnorderedAccess,
}

bitflags! {
    /// Allowed usages of a texture
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureUsage: u32 {
        const SAMPLED       = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const COPY_DST      = 1 << 3;
        const COPY_SRC      = 1 << 4;
        const STORAGE       = 1 << 5;
    }
}

bitflags! {
    /// Allowed usages of a buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const UNIFORM  = 1 << 0;
        const STORAGE  = 1 << 1;
        const COPY_DST = 1 << 2;
        const COPY_SRC = 1 << 3;
    }
}

/// Description of a texture allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Allowed usages
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Single-mip 2D texture
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            format,
            usage,
        }
    }

    /// Total allocation size across the mip chain
    pub fn byte_size(&self) -> usize {
        let mut total = 0usize;
        let mut w = self.width as usize;
        let mut h = self.height as usize;
        for _ in 0..self.mip_levels.max(1) {
            total += w * h * self.format.bytes_per_pixel();
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total
    }
}

/// Description of a buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: usize,
    /// Allowed usages
    pub usage: BufferUsage,
}

/// Texture resource tracked by the device
#[derive(Debug)]
pub struct Texture {
    /// Allocation description
    pub desc: TextureDesc,
    /// Current logical state on the timeline
    pub state: ResourceState,
}

/// Buffer resource tracked by the device
#[derive(Debug)]
pub struct Buffer {
    /// Allocation description
    pub desc: BufferDesc,
    /// Current logical state on the timeline
    pub state: ResourceState,
}

/// Handle to a device texture
pub type TextureHandle = Handle<Texture>;

/// Handle to a device buffer
pub type BufferHandle = Handle<Buffer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_chain_byte_size() {
        let desc = TextureDesc {
            width: 4,
            height: 4,
            mip_levels: 3,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED,
        };
        // 4x4 + 2x2 + 1x1 at 4 bytes per pixel
        assert_eq!(desc.byte_size(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn test_single_mip_byte_size() {
        let desc = TextureDesc::new_2d(128, 128, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        // One 128x128 RGBA tile is exactly a 64 KiB streaming block
        assert_eq!(desc.byte_size(), 64 * 1024);
    }
}
