//! Voronoi + fractal-noise compositor.
//!
//! Every pixel is a pure function of its world coordinates and the layer
//! parameters; the requesting tile never enters the computation. That is the
//! whole seamlessness argument for the raw field: a shared-edge pixel sees
//! the exact same Voronoi point set and noise lattice no matter which tile's
//! canvas asked for it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::hash::{hash2, rand_f32};
use crate::heightmap::Heightmap;
use crate::noise::fbm;
use crate::types::TileCoord;

/// Hard cap on Voronoi points per tile; bounds the per-pixel candidate set
/// to 9 * 10 points.
pub const MAX_POINTS_PER_TILE: u16 = 10;

/// Distance-to-height falloff curves for the Voronoi layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightScaling {
    Linear,
    Quadratic,
    Exponential,
    Sigmoid,
    Inverse,
    Power,
    Cosine,
}

impl HeightScaling {
    /// Apply the curve to a normalized distance `d` with falloff `k`.
    pub fn apply(self, d: f32, k: f32) -> f32 {
        match self {
            HeightScaling::Linear => 1.0 - d,
            HeightScaling::Quadratic => 1.0 - d * d,
            HeightScaling::Exponential => (-k * d).exp(),
            HeightScaling::Sigmoid => 1.0 / (1.0 + (k * (d - 0.5)).exp()),
            HeightScaling::Inverse => 1.0 / (1.0 + k * d),
            HeightScaling::Power => (1.0 - d).max(0.0).powf(k),
            HeightScaling::Cosine => 0.5 * (1.0 + (d * k * std::f32::consts::PI).cos()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LayerParams {
    pub seed: u32,
    /// Voronoi points per tile, capped at [`MAX_POINTS_PER_TILE`].
    pub n_points: u16,
    pub voronoi_intensity: f32,
    pub noise_intensity: f32,
    pub enable_voronoi: bool,
    pub enable_noise: bool,
    pub falloff: f32,
    pub ridge_multiplier: f32,
    pub amplitude: f32,
    pub scaling: HeightScaling,
    pub min_h: f32,
    pub max_h: f32,
    pub noise_freq: f32,
    pub noise_octaves: u8,
    pub noise_lacunarity: f32,
    pub noise_persistence: f32,
    pub noise_seed: i32,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            seed: 0,
            n_points: 4,
            voronoi_intensity: 0.6,
            noise_intensity: 0.4,
            enable_voronoi: true,
            enable_noise: true,
            falloff: 2.0,
            ridge_multiplier: 0.0,
            amplitude: 1.0,
            scaling: HeightScaling::Linear,
            min_h: 0.0,
            max_h: 1.0,
            noise_freq: 0.008,
            noise_octaves: 5,
            noise_lacunarity: 2.0,
            noise_persistence: 0.5,
            noise_seed: 0,
        }
    }
}

/// Produces raw heightmaps by sampling the infinite composite field.
/// One instance is reused across tiles; only the canvas origin varies.
pub struct LayerCompositor {
    tile_size: usize,
    params: LayerParams,
}

impl LayerCompositor {
    pub fn new(tile_size: usize, params: LayerParams) -> Self {
        Self { tile_size, params }
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    /// The deterministic point set a single tile contributes to the Voronoi
    /// field, in world-space pixels.
    pub fn tile_points(&self, tile: TileCoord) -> Vec<Vec2> {
        let size = self.tile_size as f32;
        let base = Vec2::new(tile.x as f32 * size, tile.y as f32 * size);
        let tile_seed = hash2(tile.x, tile.y, self.params.seed);
        let count = self.params.n_points.min(MAX_POINTS_PER_TILE) as u32;
        (0..count)
            .map(|i| {
                base + Vec2::new(
                    rand_f32(tile_seed, 2 * i) * size,
                    rand_f32(tile_seed, 2 * i + 1) * size,
                )
            })
            .collect()
    }

    /// Composite height at a world pixel. Pure; independent of any tile
    /// context. The per-pixel entry point gathers its own 3x3 point
    /// neighborhood, so it is the slow path; canvases go through `fill`.
    pub fn height_at(&self, wx: f32, wy: f32) -> f32 {
        let voronoi = if self.params.enable_voronoi {
            let home = crate::types::world_to_tile(wx, wy, self.tile_size);
            let mut points = Vec::with_capacity(9 * self.params.n_points as usize);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    points.extend(self.tile_points(home.offset(dx, dy)));
                }
            }
            Some(self.voronoi_height(Vec2::new(wx, wy), &points))
        } else {
            None
        };
        self.composite(wx, wy, voronoi)
    }

    /// Fill `map` with raw heights for the world-pixel window starting at
    /// `origin_px`. Used for both tile-sized and padded canvases.
    pub fn fill(&self, origin_px: (i32, i32), map: &mut Heightmap) {
        let neighborhood = self
            .params
            .enable_voronoi
            .then(|| PointNeighborhood::gather(self, origin_px, map.width(), map.height()));

        for y in 0..map.height() {
            let wy = (origin_px.1 + y as i32) as f32;
            for x in 0..map.width() {
                let wx = (origin_px.0 + x as i32) as f32;
                let voronoi = neighborhood
                    .as_ref()
                    .map(|n| self.voronoi_height(Vec2::new(wx, wy), n.around(wx, wy)));
                map.set(x, y, self.composite(wx, wy, voronoi));
            }
        }
    }

    /// Raw heightmap of one tile.
    pub fn raw_tile(&self, coord: TileCoord) -> Heightmap {
        let mut map = Heightmap::new(self.tile_size, self.tile_size);
        self.fill(coord.world_min(self.tile_size), &mut map);
        map
    }

    /// Raw heightmap of a tile plus a margin of `padding` pixels on every
    /// side, still sampled at world coordinates.
    pub fn padded_tile(&self, coord: TileCoord, padding: usize) -> Heightmap {
        let side = self.tile_size + 2 * padding;
        let mut map = Heightmap::new(side, side);
        let (mx, my) = coord.world_min(self.tile_size);
        self.fill((mx - padding as i32, my - padding as i32), &mut map);
        map
    }

    fn voronoi_height(&self, pos: Vec2, points: &[Vec2]) -> f32 {
        let p = &self.params;
        let mut d1_sq = f32::INFINITY;
        let mut d2_sq = f32::INFINITY;
        for point in points {
            let d_sq = pos.distance_squared(*point);
            if d_sq < d1_sq {
                d2_sq = d1_sq;
                d1_sq = d_sq;
            } else if d_sq < d2_sq {
                d2_sq = d_sq;
            }
        }
        if !d1_sq.is_finite() {
            // No points at all (n_points can't be 0 through config
            // validation, but the field math shouldn't depend on that).
            return p.min_h;
        }
        let d1 = d1_sq.sqrt();
        let d = d1 / self.tile_size as f32;
        let mut v = p.scaling.apply(d, p.falloff) * p.amplitude;
        if p.ridge_multiplier != 0.0 && d2_sq.is_finite() {
            v += p.ridge_multiplier * (d2_sq.sqrt() - d1) / d1;
        }
        p.min_h + v.clamp(0.0, 1.0) * (p.max_h - p.min_h)
    }

    fn noise_height(&self, wx: f32, wy: f32) -> f32 {
        let p = &self.params;
        let n = fbm(
            wx,
            wy,
            p.noise_seed,
            p.noise_freq,
            p.noise_octaves,
            p.noise_lacunarity,
            p.noise_persistence,
        );
        (n + 1.0) * 0.5
    }

    fn composite(&self, wx: f32, wy: f32, voronoi: Option<f32>) -> f32 {
        let p = &self.params;
        let mut h = 0.5;
        if p.enable_noise {
            h += (self.noise_height(wx, wy) - 0.5) * p.noise_intensity;
        }
        if let Some(hv) = voronoi {
            h += (hv - 0.5) * p.voronoi_intensity;
        }
        h
    }
}

/// Pre-gathered Voronoi point sets for every tile a canvas can see, stored
/// as a dense grid so the per-pixel loop indexes instead of hashing.
struct PointNeighborhood {
    tile_size: usize,
    min_tx: i32,
    min_ty: i32,
    tiles_x: usize,
    /// Per-tile candidate list: the union of the tile's own points and its
    /// eight neighbors', matching the 3x3 rule a pixel in that tile sees.
    merged: Vec<Vec<Vec2>>,
}

impl PointNeighborhood {
    fn gather(
        compositor: &LayerCompositor,
        origin_px: (i32, i32),
        width: usize,
        height: usize,
    ) -> Self {
        let size = compositor.tile_size as i32;
        // Tiles overlapped by the canvas, plus one ring for the 3x3 rule.
        let min_tx = origin_px.0.div_euclid(size) - 1;
        let min_ty = origin_px.1.div_euclid(size) - 1;
        let max_tx = (origin_px.0 + width as i32 - 1).div_euclid(size) + 1;
        let max_ty = (origin_px.1 + height as i32 - 1).div_euclid(size) + 1;
        let tiles_x = (max_tx - min_tx + 1) as usize;
        let tiles_y = (max_ty - min_ty + 1) as usize;

        let mut per_tile = Vec::with_capacity(tiles_x * tiles_y);
        for ty in min_ty..=max_ty {
            for tx in min_tx..=max_tx {
                per_tile.push(compositor.tile_points(TileCoord::new(tx, ty)));
            }
        }

        let mut merged = vec![Vec::new(); tiles_x * tiles_y];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let mut set = Vec::with_capacity(9 * compositor.params.n_points as usize);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = tx as i32 + dx;
                        let ny = ty as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= tiles_x as i32 || ny >= tiles_y as i32 {
                            continue;
                        }
                        set.extend(&per_tile[ny as usize * tiles_x + nx as usize]);
                    }
                }
                merged[ty * tiles_x + tx] = set;
            }
        }

        Self {
            tile_size: compositor.tile_size,
            min_tx,
            min_ty,
            tiles_x,
            merged,
        }
    }

    fn around(&self, wx: f32, wy: f32) -> &[Vec2] {
        let home = crate::types::world_to_tile(wx, wy, self.tile_size);
        let gx = (home.x - self.min_tx) as usize;
        let gy = (home.y - self.min_ty) as usize;
        &self.merged[gy * self.tiles_x + gx]
    }
}
