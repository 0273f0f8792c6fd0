//! Particle-based hydraulic erosion over padded tile canvases.
//!
//! Erosion is order-dependent: every droplet mutates the heightmap the next
//! one reads. Seamlessness therefore comes from two disciplines working
//! together:
//!
//! 1. Droplets are enumerated from world geometry alone - every tile whose
//!    extent intersects the padded canvas dilated by the maximum droplet
//!    travel distance contributes its deterministic spawn set, whether or
//!    not that tile is the one being generated.
//! 2. The retained droplets run in a single global order keyed by a hash of
//!    their world-space spawn position, so a droplet that two neighboring
//!    tiles both enumerate runs at the same logical time on both canvases.
//!
//! The droplet loop itself follows the classic capacity/deposit/erode
//! scheme; material leaves the map through a weighted brush and comes back
//! as bilinear deposition.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::hash::{hash2, hash_pos, rand_f32};
use crate::heightmap::Heightmap;
use crate::layers::LayerCompositor;
use crate::types::TileCoord;

/// Height bound used for the droplet travel estimate. The raw field is
/// nominally unit-height; parameter sets that push heights past this can
/// out-travel the padding (accepted by the seam tolerance).
const MAX_UNIT_HEIGHT: f32 = 1.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ErosionParams {
    pub enabled: bool,
    /// Blend factor between the raw and fully eroded surface.
    pub intensity: f32,
    pub droplets_per_tile: u32,
    pub max_lifetime: u32,
    pub sediment_capacity_factor: f32,
    pub min_sediment_capacity: f32,
    pub deposit_speed: f32,
    pub erode_speed: f32,
    pub evaporate_speed: f32,
    pub gravity: f32,
    pub start_speed: f32,
    pub start_water: f32,
    pub inertia: f32,
    /// Chebyshev radius of the erosion brush; 1 gives the default 3x3.
    pub brush_radius: u32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: 1.0,
            droplets_per_tile: 20_000,
            max_lifetime: 30,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            deposit_speed: 0.3,
            erode_speed: 0.3,
            evaporate_speed: 0.01,
            gravity: 4.0,
            start_speed: 1.0,
            start_water: 1.0,
            inertia: 0.05,
            brush_radius: 1,
        }
    }
}

impl ErosionParams {
    /// Upper bound on how far one droplet can travel from its spawn point,
    /// in pixels.
    pub fn max_travel(&self) -> f32 {
        self.max_lifetime as f32 * (2.0 * self.gravity * MAX_UNIT_HEIGHT).sqrt()
    }
}

/// A candidate droplet before simulation: where it spawns and where it
/// sorts in the global order.
#[derive(Clone, Copy, Debug)]
struct DropletSeed {
    spawn: Vec2,
    key: u32,
    tile: TileCoord,
    index: u32,
}

/// Weighted neighborhood a droplet erodes through, as flattened offsets
/// into a padded buffer of fixed stride.
struct Brush {
    entries: Vec<(isize, f32)>,
}

impl Brush {
    fn new(radius: i32, stride: usize) -> Self {
        let cutoff = 1.5 * radius as f32;
        let mut entries = Vec::new();
        let mut total = 0.0;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let d = ((dx * dx + dy * dy) as f32).sqrt();
                let w = (1.0 - d / cutoff).max(0.0);
                if w > 0.0 {
                    entries.push((dy as isize * stride as isize + dx as isize, w));
                    total += w;
                }
            }
        }
        for (_, w) in &mut entries {
            *w /= total;
        }
        Self { entries }
    }
}

/// Erodes padded tile canvases. One instance is reused across tiles.
pub struct ErosionSimulator {
    tile_size: usize,
    padding: usize,
    world_seed: u32,
    params: ErosionParams,
}

impl ErosionSimulator {
    pub fn new(tile_size: usize, padding: usize, world_seed: u32, params: ErosionParams) -> Self {
        Self {
            tile_size,
            padding,
            world_seed,
            params,
        }
    }

    pub fn params(&self) -> &ErosionParams {
        &self.params
    }

    /// Eroded heightmap of one tile, cropped back to tile size.
    pub fn erode_tile(&self, compositor: &LayerCompositor, coord: TileCoord) -> Heightmap {
        self.erode_padded(compositor, coord).crop(
            self.padding,
            self.padding,
            self.tile_size,
            self.tile_size,
        )
    }

    /// Eroded padded canvas, before the crop. Exposed so the seam agreement
    /// between neighboring canvases can be observed directly.
    pub fn erode_padded(&self, compositor: &LayerCompositor, coord: TileCoord) -> Heightmap {
        let mut padded = compositor.padded_tile(coord, self.padding);
        if !self.params.enabled || self.params.droplets_per_tile == 0 {
            return padded;
        }

        let blend_base = (self.params.intensity < 1.0).then(|| padded.clone());

        let droplets = self.affected_droplets(coord);
        let brush = Brush::new(self.params.brush_radius as i32, padded.width());
        let (min_x, min_y) = coord.world_min(self.tile_size);
        let canvas_origin = Vec2::new(
            min_x as f32 - self.padding as f32,
            min_y as f32 - self.padding as f32,
        );
        for seed in &droplets {
            self.run_droplet(&mut padded, &brush, seed.spawn - canvas_origin);
        }

        if let Some(before) = blend_base {
            let t = self.params.intensity.clamp(0.0, 1.0);
            for (out, base) in padded.as_mut_slice().iter_mut().zip(before.as_slice()) {
                *out = base + (*out - base) * t;
            }
        }
        padded
    }

    /// Every droplet whose simulation could touch this tile's padded
    /// canvas, in the global execution order.
    fn affected_droplets(&self, coord: TileCoord) -> Vec<DropletSeed> {
        let size = self.tile_size as f32;
        let pad = self.padding as f32;
        let reach = self.params.max_travel();
        let (tile_min_x, tile_min_y) = coord.world_min(self.tile_size);

        // Padded extent dilated by the travel bound.
        let min_x = tile_min_x as f32 - pad - reach;
        let max_x = (tile_min_x + self.tile_size as i32) as f32 + pad + reach;
        let min_y = tile_min_y as f32 - pad - reach;
        let max_y = (tile_min_y + self.tile_size as i32) as f32 + pad + reach;

        let first_tx = (min_x / size).floor() as i32;
        let last_tx = ((max_x / size).ceil() as i32 - 1).max(first_tx);
        let first_ty = (min_y / size).floor() as i32;
        let last_ty = ((max_y / size).ceil() as i32 - 1).max(first_ty);

        let mut seeds = Vec::new();
        for ty in first_ty..=last_ty {
            for tx in first_tx..=last_tx {
                let tile = TileCoord::new(tx, ty);
                let tile_seed = hash2(tx, ty, self.world_seed);
                let base = Vec2::new(tx as f32 * size, ty as f32 * size);
                for i in 0..self.params.droplets_per_tile {
                    let spawn = base
                        + Vec2::new(
                            rand_f32(tile_seed, 2 * i) * size,
                            rand_f32(tile_seed, 2 * i + 1) * size,
                        );
                    if spawn.x < min_x || spawn.x >= max_x || spawn.y < min_y || spawn.y >= max_y {
                        continue;
                    }
                    seeds.push(DropletSeed {
                        spawn,
                        key: hash_pos(spawn.x, spawn.y, self.world_seed),
                        tile,
                        index: i,
                    });
                }
            }
        }
        // The position key is the global order; spawn identity breaks exact
        // key collisions the same way on every tile that lists the droplet.
        seeds.sort_unstable_by_key(|s| (s.key, s.tile.y, s.tile.x, s.index));
        seeds
    }

    /// Simulate one droplet on the padded canvas. `start` is in
    /// canvas-local pixels.
    fn run_droplet(&self, map: &mut Heightmap, brush: &Brush, start: Vec2) {
        let p = &self.params;
        let stride = map.width();
        let lo = p.brush_radius as f32;
        let hi = (map.width() - p.brush_radius as usize) as f32;

        let mut pos = start;
        if pos.x < lo || pos.x >= hi || pos.y < lo || pos.y >= hi {
            // Spawned in the dilated search region but off this canvas;
            // nothing it does out there is visible here.
            return;
        }

        let mut dir = Vec2::ZERO;
        let mut speed = p.start_speed;
        let mut water = p.start_water;
        let mut sediment = 0.0f32;

        for _ in 0..p.max_lifetime {
            let cell_x = pos.x as usize;
            let cell_y = pos.y as usize;
            let offset_x = pos.x - cell_x as f32;
            let offset_y = pos.y - cell_y as f32;

            let (height, gx, gy) = map.height_and_gradient(pos.x, pos.y);

            // Inertia steering; the length floor keeps a flat spot from
            // producing a NaN direction.
            dir = dir * p.inertia - Vec2::new(gx, gy) * (1.0 - p.inertia);
            dir /= dir.length().max(0.01);
            pos += dir;

            if pos.x < lo || pos.x >= hi || pos.y < lo || pos.y >= hi {
                break;
            }

            let new_height = map.sample(pos.x, pos.y);
            let delta = new_height - height;

            let capacity =
                (-delta * speed * water * p.sediment_capacity_factor).max(p.min_sediment_capacity);

            if sediment > capacity || delta > 0.0 {
                // Moving uphill fills the pit behind; otherwise shed the
                // excess over capacity.
                let deposit = if delta > 0.0 {
                    delta.min(sediment)
                } else {
                    (sediment - capacity) * p.deposit_speed
                };
                sediment -= deposit;

                let idx = cell_y * stride + cell_x;
                let data = map.as_mut_slice();
                data[idx] += deposit * (1.0 - offset_x) * (1.0 - offset_y);
                data[idx + 1] += deposit * offset_x * (1.0 - offset_y);
                data[idx + stride] += deposit * (1.0 - offset_x) * offset_y;
                data[idx + stride + 1] += deposit * offset_x * offset_y;
            } else {
                let erode = ((capacity - sediment) * p.erode_speed).min(-delta);
                let center = (cell_y * stride + cell_x) as isize;
                let data = map.as_mut_slice();
                for &(off, w) in &brush.entries {
                    let amount = erode * w;
                    data[(center + off) as usize] -= amount;
                    sediment += amount;
                }
            }

            speed = (speed * speed + delta * p.gravity).max(0.0).sqrt();
            water *= 1.0 - p.evaporate_speed;
        }
    }
}
