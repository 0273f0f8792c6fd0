//! Pure planning logic for the streaming supervisor: batch shapes, spiral
//! traversal, velocity prediction, and eviction bookkeeping. Everything here
//! is synchronous and deterministic so it can be tested without a worker.

use std::collections::VecDeque;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::types::{TileCoord, TileRect};

/// Consumer speeds below this are treated as standing still when predicting
/// the next batch.
const PREDICTION_MIN_SPEED: f32 = 0.1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StreamingParams {
    /// Tiles per side of a batch.
    pub batch_size: u32,
    /// Trigger distance, in tiles, from the active region boundary.
    pub edge_threshold: u32,
    pub max_cached_batches: usize,
    pub initial_tile: TileCoord,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            batch_size: 8,
            edge_threshold: 2,
            max_cached_batches: 3,
            initial_tile: TileCoord::new(0, 0),
        }
    }
}

/// Center-outward traversal of a batch: ascending squared distance to the
/// rect center, with a fixed tie-break so the order is total.
pub fn spiral_order(rect: &TileRect) -> Vec<TileCoord> {
    let (cx, cy) = rect.center();
    let mut tiles: Vec<TileCoord> = rect.iter().collect();
    tiles.sort_by(|a, b| {
        center_distance_sq(*a, cx, cy)
            .total_cmp(&center_distance_sq(*b, cx, cy))
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    tiles
}

pub fn center_distance_sq(tile: TileCoord, cx: f32, cy: f32) -> f32 {
    let dx = tile.x as f32 - cx;
    let dy = tile.y as f32 - cy;
    dx * dx + dy * dy
}

/// Where the next batch should go: centered on the consumer when idle,
/// otherwise pushed half a batch ahead along the horizontal velocity.
pub fn predict_next(pos: TileCoord, vel: Vec3, batch_size: u32) -> TileRect {
    let size = batch_size as i32;
    let vel_xz = Vec2::new(vel.x, vel.z);
    let center = if vel_xz.length() < PREDICTION_MIN_SPEED {
        pos
    } else {
        let ahead = vel_xz.normalize() * (batch_size as f32 / 2.0);
        TileCoord::new(
            (pos.x as f32 + ahead.x).round() as i32,
            (pos.y as f32 + ahead.y).round() as i32,
        )
    };
    TileRect::centered(center, size)
}

/// Bounded history of completed batch regions. Pushing past the capacity
/// reports which tiles lost their last covering rect and must leave the
/// in-memory index.
#[derive(Debug, Default)]
pub struct BatchHistory {
    completed: VecDeque<TileRect>,
    capacity: usize,
}

impl BatchHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            completed: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn contains_rect(&self, rect: &TileRect) -> bool {
        self.completed.iter().any(|r| r == rect)
    }

    pub fn covers(&self, tile: TileCoord) -> bool {
        self.completed.iter().any(|r| r.contains(tile))
    }

    pub fn regions(&self) -> impl Iterator<Item = &TileRect> {
        self.completed.iter()
    }

    /// Record a newly completed rect, evicting the oldest regions beyond
    /// capacity. Returns the tiles no surviving region covers.
    pub fn push(&mut self, rect: TileRect) -> Vec<TileCoord> {
        self.completed.push_back(rect);
        let mut dropped = Vec::new();
        while self.completed.len() > self.capacity {
            let oldest = self
                .completed
                .pop_front()
                .expect("non-empty history over capacity");
            for tile in oldest.iter() {
                if !self.covers(tile) {
                    dropped.push(tile);
                }
            }
        }
        dropped
    }
}
