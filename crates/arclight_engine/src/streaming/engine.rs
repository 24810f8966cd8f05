//! Streaming engine: block pool, residency, and transfer lifecycle

use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::core::config::StreamingConfig;
use crate::framegraph::FrameGraph;
use crate::gpu::device::{FenceValue, GpuError, RenderDevice};
use crate::gpu::resources::{BufferDesc, BufferHandle, BufferUsage, ResourceState};

/// Tile edge length in texels; one RGBA tile fills one 64 KiB block
pub const TILE_DIMENSION: u32 = 128;

/// Streaming errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamingError {
    /// The GUID was never registered
    #[error("unknown streamed texture {0:#x}")]
    UnknownTexture(u64),

    /// A feedback entry named a mip or tile outside the texture
    #[error("tile out of range for texture {guid:#x}: mip {mip} tile ({x}, {y})")]
    TileOutOfRange { guid: u64, mip: u8, x: u16, y: u16 },

    /// Device failure allocating the pool or staging buffer
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Identity of one tile of one mip of one streamed texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Texture resource GUID
    pub guid: u64,
    /// Mip level, 0 is the most detailed
    pub mip: u8,
    /// Tile column within the mip
    pub x: u16,
    /// Tile row within the mip
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Free,
    /// Copy recorded but its fence has not retired
    InFlight,
    Resident,
}

#[derive(Debug)]
struct Block {
    key: Option<TileKey>,
    state: BlockState,
    /// Frame counter of the last feedback touch, for eviction ordering
    last_used: u64,
    /// Fence protecting an in-flight transfer
    fence: FenceValue,
}

#[derive(Debug)]
struct StreamedTexture {
    width: u32,
    height: u32,
    mip_count: u8,
}

impl StreamedTexture {
    /// Tile grid dimensions of one mip
    fn tiles(&self, mip: u8) -> (u16, u16) {
        let w = (self.width >> mip).max(1);
        let h = (self.height >> mip).max(1);
        (
            w.div_ceil(TILE_DIMENSION) as u16,
            h.div_ceil(TILE_DIMENSION) as u16,
        )
    }
}

/// Counters from one decision phase
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Phase1Stats {
    /// Requests already resident (touched, not fetched)
    pub hits: usize,
    /// Fetches queued for the recording phase
    pub fetches: usize,
    /// Resident tiles evicted to make room
    pub evictions: usize,
    /// Requests dropped because every block was pinned in flight
    pub dropped: usize,
}

/// The texture streaming engine
pub struct TextureStreamer {
    blocks: Vec<Block>,
    free: Vec<u32>,
    resident: HashMap<TileKey, u32>,
    textures: HashMap<u64, StreamedTexture>,
    staging: BufferHandle,
    staging_state: ResourceState,
    block_size: usize,
    /// Fetches decided in phase 1, awaiting recording in phase 2
    pending: Vec<(u32, TileKey)>,
    /// Blocks recorded this frame, awaiting their submission fence
    awaiting_fence: Vec<u32>,
    frame: u64,
}

impl TextureStreamer {
    /// Create the streamer, allocating its pool accounting and staging
    /// buffer against the device budget
    pub fn new(device: &mut RenderDevice, config: &StreamingConfig) -> Result<Self, StreamingError> {
        let block_count = config.cache_size / config.block_size;
        let blocks = (0..block_count)
            .map(|_| Block {
                key: None,
                state: BlockState::Free,
                last_used: 0,
                fence: 0,
            })
            .collect();
        // LIFO free list, low indices first out
        let free = (0..block_count as u32).rev().collect();
        let staging = device.create_buffer(BufferDesc {
            size: config.cache_size,
            usage: BufferUsage::COPY_SRC,
        })?;
        debug!(
            "texture streamer: {} blocks of {} bytes",
            block_count, config.block_size
        );
        Ok(Self {
            blocks,
            free,
            resident: HashMap::new(),
            textures: HashMap::new(),
            staging,
            staging_state: ResourceState::Common,
            block_size: config.block_size,
            pending: Vec::new(),
            awaiting_fence: Vec::new(),
            frame: 0,
        })
    }

    /// Register a streamable texture by GUID
    pub fn register_texture(&mut self, guid: u64, width: u32, height: u32, mip_count: u8) {
        self.textures.insert(
            guid,
            StreamedTexture {
                width,
                height,
                mip_count,
            },
        );
    }

    /// Total blocks in the pool
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks currently holding resident tiles
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Whether a tile is resident and usable by shading
    pub fn is_resident(&self, key: TileKey) -> bool {
        self.resident.contains_key(&key)
    }

    /// Most detailed mip with any resident tile, if one exists
    pub fn best_resident_mip(&self, guid: u64) -> Option<u8> {
        self.resident
            .keys()
            .filter(|key| key.guid == guid)
            .map(|key| key.mip)
            .min()
    }

    fn validate(&self, key: TileKey) -> Result<(), StreamingError> {
        let texture = self
            .textures
            .get(&key.guid)
            .ok_or(StreamingError::UnknownTexture(key.guid))?;
        let (tiles_x, tiles_y) = texture.tiles(key.mip);
        if key.mip >= texture.mip_count || key.x >= tiles_x || key.y >= tiles_y {
            return Err(StreamingError::TileOutOfRange {
                guid: key.guid,
                mip: key.mip,
                x: key.x,
                y: key.y,
            });
        }
        Ok(())
    }

    /// Pick the resident block with the stalest feedback touch
    ///
    /// In-flight blocks are never candidates: their transfer fence has
    /// not retired, so their memory is still owned by the GPU timeline.
    fn evict_candidate(&self) -> Option<u32> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.state == BlockState::Resident)
            .min_by_key(|(_, block)| block.last_used)
            .map(|(i, _)| i as u32)
    }

    /// Decision phase: resolve feedback into fetches and evictions
    ///
    /// Feedback is processed coarse-mip-first so low-detail fallbacks
    /// become resident before high-detail tiles compete for blocks.
    pub fn update_phase1(&mut self, feedback: &[TileKey]) -> Result<Phase1Stats, StreamingError> {
        self.frame += 1;
        let mut stats = Phase1Stats::default();

        let mut requests: Vec<TileKey> = Vec::with_capacity(feedback.len());
        for &key in feedback {
            self.validate(key)?;
            if !requests.contains(&key) {
                requests.push(key);
            }
        }
        requests.sort_by(|a, b| b.mip.cmp(&a.mip));

        for key in requests {
            if let Some(&block) = self.resident.get(&key) {
                self.blocks[block as usize].last_used = self.frame;
                stats.hits += 1;
                continue;
            }
            if self
                .pending
                .iter()
                .any(|(_, pending)| *pending == key)
                || self
                    .blocks
                    .iter()
                    .any(|b| b.state == BlockState::InFlight && b.key == Some(key))
            {
                continue;
            }

            let block = match self.free.pop() {
                Some(block) => block,
                None => match self.evict_candidate() {
                    Some(block) => {
                        let evicted = &mut self.blocks[block as usize];
                        if let Some(old) = evicted.key.take() {
                            self.resident.remove(&old);
                        }
                        evicted.state = BlockState::Free;
                        stats.evictions += 1;
                        block
                    }
                    None => {
                        warn!("streaming pool exhausted, dropping fetch of {:?}", key);
                        stats.dropped += 1;
                        continue;
                    }
                },
            };

            let slot = &mut self.blocks[block as usize];
            slot.key = Some(key);
            slot.state = BlockState::InFlight;
            slot.last_used = self.frame;
            slot.fence = 0;
            self.pending.push((block, key));
            stats.fetches += 1;
        }

        debug!(
            "streaming phase 1: {} hits, {} fetches, {} evictions, {} dropped",
            stats.hits, stats.fetches, stats.evictions, stats.dropped
        );
        Ok(stats)
    }

    /// Recording phase: add the copy pass for this frame's fetches
    ///
    /// Tile payloads come from the asset pipeline out of process; the
    /// pass records one staging-to-block copy per fetch.
    pub fn update_phase2(&mut self, graph: &mut FrameGraph) {
        if self.pending.is_empty() {
            return;
        }
        let staging = self.staging;
        let staging_state = self.staging_state;
        let block_size = self.block_size;
        let fetches: Vec<(u32, TileKey)> = self.pending.drain(..).collect();
        self.awaiting_fence.extend(fetches.iter().map(|(b, _)| *b));
        self.staging_state = ResourceState::CopySource;

        graph.add_pass(
            "texture_streaming",
            move |_| fetches,
            move |fetches: &Vec<(u32, TileKey)>, _, ctx| {
                if staging_state != ResourceState::CopySource {
                    ctx.buffer_barrier(staging, staging_state, ResourceState::CopySource);
                }
                for (i, (block, key)) in fetches.iter().enumerate() {
                    debug!("streaming tile {:?} into block {}", key, block);
                    ctx.copy_tile(staging, i * block_size, *block);
                }
            },
        );
    }

    /// Record the fence protecting this frame's transfers
    pub fn on_submitted(&mut self, fence: FenceValue) {
        for &block in &self.awaiting_fence {
            self.blocks[block as usize].fence = fence;
        }
        self.awaiting_fence.clear();
    }

    /// Promote in-flight blocks whose fence has retired to resident
    pub fn complete_transfers(&mut self, device: &RenderDevice) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if block.state != BlockState::InFlight {
                continue;
            }
            // Fence 0 means the copy was not submitted yet
            if block.fence == 0 || !device.is_fence_complete(block.fence) {
                continue;
            }
            block.state = BlockState::Resident;
            if let Some(key) = block.key {
                self.resident.insert(key, i as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RendererConfig;

    fn small_pool() -> (RenderDevice, TextureStreamer) {
        let mut device = RenderDevice::new(&RendererConfig::default());
        // 4 blocks
        let streamer = TextureStreamer::new(
            &mut device,
            &StreamingConfig {
                cache_size: 4 * 64 * 1024,
                block_size: 64 * 1024,
            },
        )
        .unwrap();
        (device, streamer)
    }

    fn tile(guid: u64, mip: u8, x: u16, y: u16) -> TileKey {
        TileKey { guid, mip, x, y }
    }

    /// Run one full frame: decide, record, submit, retire, promote
    fn stream_frame(
        device: &mut RenderDevice,
        streamer: &mut TextureStreamer,
        feedback: &[TileKey],
    ) -> Phase1Stats {
        let stats = streamer.update_phase1(feedback).unwrap();
        let mut graph = FrameGraph::new();
        streamer.update_phase2(&mut graph);
        let info = graph.execute(device).unwrap();
        streamer.on_submitted(info.fence);
        device.wait_for_fence(info.fence).unwrap();
        streamer.complete_transfers(device);
        stats
    }

    #[test]
    fn test_fetch_becomes_resident_after_fence() {
        let (mut device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 512, 512, 3);
        let key = tile(0xA, 0, 1, 1);

        let stats = streamer.update_phase1(&[key]).unwrap();
        assert_eq!(stats.fetches, 1);
        assert!(!streamer.is_resident(key));

        let mut graph = FrameGraph::new();
        streamer.update_phase2(&mut graph);
        let info = graph.execute(&mut device).unwrap();
        streamer.on_submitted(info.fence);

        // Fence not retired: still in flight
        streamer.complete_transfers(&device);
        assert!(!streamer.is_resident(key));

        device.wait_for_fence(info.fence).unwrap();
        streamer.complete_transfers(&device);
        assert!(streamer.is_resident(key));
    }

    #[test]
    fn test_repeat_feedback_hits_without_refetch() {
        let (mut device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 512, 512, 3);
        let key = tile(0xA, 0, 0, 0);

        stream_frame(&mut device, &mut streamer, &[key]);
        let stats = stream_frame(&mut device, &mut streamer, &[key]);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fetches, 0);
        assert_eq!(streamer.resident_count(), 1);
    }

    #[test]
    fn test_full_pool_evicts_stalest_block() {
        let (mut device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 2048, 2048, 5);

        // Fill all 4 blocks; tile (0,0) is touched again in frame 2
        let first = [tile(0xA, 0, 0, 0), tile(0xA, 0, 1, 0), tile(0xA, 0, 2, 0)];
        stream_frame(&mut device, &mut streamer, &first);
        stream_frame(
            &mut device,
            &mut streamer,
            &[tile(0xA, 0, 0, 0), tile(0xA, 0, 3, 0)],
        );
        assert_eq!(streamer.resident_count(), 4);

        // A new fetch must evict; (1,0) and (2,0) are stalest, one goes
        let stats = stream_frame(&mut device, &mut streamer, &[tile(0xA, 0, 4, 0)]);
        assert_eq!(stats.evictions, 1);
        assert_eq!(streamer.resident_count(), 4);
        assert!(streamer.is_resident(tile(0xA, 0, 0, 0)));
        assert!(streamer.is_resident(tile(0xA, 0, 4, 0)));
    }

    #[test]
    fn test_in_flight_blocks_never_evicted() {
        let (_device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 2048, 2048, 5);

        // Fill the pool but never submit, so every block stays in flight
        let feedback: Vec<TileKey> = (0..4).map(|i| tile(0xA, 0, i, 0)).collect();
        let stats = streamer.update_phase1(&feedback).unwrap();
        assert_eq!(stats.fetches, 4);

        let stats = streamer.update_phase1(&[tile(0xA, 0, 5, 0)]).unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_coarse_mips_win_block_contention() {
        let (_device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 2048, 2048, 5);

        // 5 requests for a 4-block pool, finest first in the feedback
        let feedback = [
            tile(0xA, 0, 0, 0),
            tile(0xA, 0, 1, 0),
            tile(0xA, 0, 2, 0),
            tile(0xA, 0, 3, 0),
            tile(0xA, 4, 0, 0),
        ];
        let stats = streamer.update_phase1(&feedback).unwrap();
        // The coarse mip was served; one fine tile lost
        assert_eq!(stats.fetches, 4);
        assert_eq!(stats.dropped, 1);
        assert!(streamer
            .blocks
            .iter()
            .any(|b| b.key == Some(tile(0xA, 4, 0, 0))));
    }

    #[test]
    fn test_feedback_validation() {
        let (_device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 512, 512, 3);

        assert_eq!(
            streamer.update_phase1(&[tile(0xB, 0, 0, 0)]),
            Err(StreamingError::UnknownTexture(0xB))
        );
        // 512 / 128 = 4 tiles per axis at mip 0
        assert!(matches!(
            streamer.update_phase1(&[tile(0xA, 0, 4, 0)]),
            Err(StreamingError::TileOutOfRange { .. })
        ));
        assert!(matches!(
            streamer.update_phase1(&[tile(0xA, 3, 0, 0)]),
            Err(StreamingError::TileOutOfRange { .. })
        ));
    }

    #[test]
    fn test_phase2_records_one_copy_per_fetch() {
        let (mut device, mut streamer) = small_pool();
        streamer.register_texture(0xA, 512, 512, 3);

        streamer
            .update_phase1(&[tile(0xA, 0, 0, 0), tile(0xA, 0, 1, 0)])
            .unwrap();
        let mut graph = FrameGraph::new();
        streamer.update_phase2(&mut graph);
        graph.execute(&mut device).unwrap();

        let copies = device
            .last_commands()
            .iter()
            .filter(|c| matches!(c, crate::gpu::command::GpuCommand::CopyTile { .. }))
            .count();
        assert_eq!(copies, 2);
    }
}
