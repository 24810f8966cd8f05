//! Tiled texture streaming
//!
//! Streamed textures are split into 128x128 tiles, each occupying one
//! 64 KiB block of a fixed GPU pool. Per-frame feedback names the tiles
//! shading wanted; the engine resolves that feedback in two phases
//! synchronized with the frame: a decision phase that picks fetches and
//! evictions, and a recording phase that adds the copy pass to the frame
//! graph. Blocks whose transfer fence has not retired are never evicted.

mod engine;

pub use engine::{
    Phase1Stats, StreamingError, TextureStreamer, TileKey, TILE_DIMENSION,
};
