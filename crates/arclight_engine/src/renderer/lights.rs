//! GPU light data layout

use bytemuck::{Pod, Zeroable};

/// Screen pixels covered by one light map tile, per axis
///
/// The light gathering dispatch runs one thread group per tile over a
/// `(width / 10) x (height / 10)` RG32_UINT map, each texel holding an
/// offset and count into the per-tile light index list.
pub const LIGHT_MAP_TILE_SIZE: u32 = 10;

/// Point light as uploaded to the light buffer: two float4s
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct GpuPointLight {
    /// Color in rgb, intensity in w
    pub ki: [f32; 4],
    /// World position in xyz, influence radius in w
    pub position_r: [f32; 4],
}

impl GpuPointLight {
    /// Pack a light for upload
    pub fn new(color: [f32; 3], intensity: f32, position: [f32; 3], radius: f32) -> Self {
        Self {
            ki: [color[0], color[1], color[2], intensity],
            position_r: [position[0], position[1], position[2], radius],
        }
    }
}

/// Light map dimensions in tiles for a given output resolution
pub fn light_map_size(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(LIGHT_MAP_TILE_SIZE),
        height.div_ceil(LIGHT_MAP_TILE_SIZE),
    )
}
