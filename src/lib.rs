//! Infinite, deterministic, seamlessly tileable heightfield world
//! generation: a Voronoi + fractal-noise compositor, a padded hydraulic
//! erosion simulator that keeps neighboring tiles bit-compatible, a disk
//! tile cache, and a streaming supervisor that feeds finite tiles to a
//! moving consumer.

pub mod cache;
pub mod config;
pub mod erosion;
pub mod hash;
pub mod heightmap;
pub mod layers;
pub mod noise;
pub mod streaming;
pub mod supervisor;
pub mod types;

pub use cache::{CacheParams, CacheStats, TileCache};
pub use config::{ConfigError, WorldConfig};
pub use erosion::{ErosionParams, ErosionSimulator};
pub use heightmap::Heightmap;
pub use layers::{HeightScaling, LayerCompositor, LayerParams};
pub use streaming::StreamingParams;
pub use supervisor::{RenderingSnapshot, SnapshotTile, StreamEvent, TileStreamer};
pub use types::{TileCoord, TileRect};
