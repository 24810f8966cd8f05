//! Geometry buffer targets

use crate::gpu::device::{GpuError, RenderDevice};
use crate::gpu::resources::{TextureDesc, TextureFormat, TextureHandle, TextureUsage};

/// Persistent geometry buffer attachments
///
/// Albedo packs base color; the normal target carries world-space
/// normals; MRIA packs metal, roughness, IOR, and anisotropy. All three
/// are written by the G-buffer pass and sampled by deferred shading.
#[derive(Debug)]
pub struct GBuffer {
    /// Base color, RGBA8
    pub albedo: TextureHandle,
    /// World-space normals, RGBA16F
    pub normal: TextureHandle,
    /// Metal / roughness / IOR / anisotropy, RGBA16F
    pub mria: TextureHandle,
    /// Scene depth, D32
    pub depth: TextureHandle,
    width: u32,
    height: u32,
}

impl GBuffer {
    /// Allocate the attachment set at the given resolution
    pub fn new(device: &mut RenderDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        let color_usage = TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED;
        let albedo = device.create_texture(TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            color_usage,
        ))?;
        let normal = device.create_texture(TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Rgba16Float,
            color_usage,
        ))?;
        let mria = device.create_texture(TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Rgba16Float,
            color_usage,
        ))?;
        let depth = device.create_texture(TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
        ))?;
        Ok(Self {
            albedo,
            normal,
            mria,
            depth,
            width,
            height,
        })
    }

    /// Attachment width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Attachment height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Release the attachments
    pub fn destroy(self, device: &mut RenderDevice) -> Result<(), GpuError> {
        device.destroy_texture(self.albedo)?;
        device.destroy_texture(self.normal)?;
        device.destroy_texture(self.mria)?;
        device.destroy_texture(self.depth)?;
        Ok(())
    }
}
