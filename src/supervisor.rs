//! The streaming supervisor: owns the generation pipeline, tracks the
//! consumer, schedules predicted batches, and publishes the 3x3 rendering
//! snapshot.
//!
//! Concurrency model: one consumer thread calling `tick` and one generation
//! worker. The worker writes the tile index only to install finished tiles;
//! the consumer writes it only to evict. Progress flows worker-to-consumer
//! through a one-way event channel; the supervisor never hands itself to
//! the generators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use glam::Vec3;

use crate::cache::{CacheStats, TileCache};
use crate::config::{ConfigError, WorldConfig};
use crate::erosion::ErosionSimulator;
use crate::heightmap::Heightmap;
use crate::layers::LayerCompositor;
use crate::streaming::{predict_next, spiral_order, BatchHistory};
use crate::types::{world_to_tile, TileCoord, TileRect};

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    BatchStarted { total: usize },
    TileCompleted { coord: TileCoord, from_cache: bool },
    BatchCompleted { rect: TileRect },
    /// Non-fatal runtime problem, e.g. a tile that could not be persisted.
    Warning(String),
}

#[derive(Clone, Debug)]
pub struct SnapshotTile {
    pub coord: TileCoord,
    pub heightmap: Arc<Heightmap>,
}

/// The coherent 3x3 view handed to the consumer each tick. Entries are
/// read-only shares of the index; the set is assembled under a single lock
/// so it can never mix tiles from two different index states.
#[derive(Clone, Debug, Default)]
pub struct RenderingSnapshot {
    pub center: TileCoord,
    pub tiles: Vec<SnapshotTile>,
}

type TileIndex = HashMap<TileCoord, Arc<Heightmap>>;

/// The persistent generation pipeline: one compositor, one erosion
/// simulator, one cache handle, reused for every tile.
struct TileGenerator {
    compositor: LayerCompositor,
    simulator: ErosionSimulator,
    cache: TileCache,
}

/// Run one batch to completion (or until shutdown): spiral traversal,
/// index/cache short-circuits, generate-install-persist, events throughout.
/// Shared by the background worker and the inline backend.
fn run_batch(
    generator: &TileGenerator,
    index: &Mutex<TileIndex>,
    events: &Sender<StreamEvent>,
    stop: &AtomicBool,
    rect: TileRect,
) {
    let order = spiral_order(&rect);
    let _ = events.send(StreamEvent::BatchStarted { total: order.len() });

    for coord in order {
        if stop.load(Ordering::Relaxed) {
            log::debug!("shutdown observed; abandoning batch {rect:?} before {coord:?}");
            return;
        }

        if index.lock().expect("tile index lock").contains_key(&coord) {
            let _ = events.send(StreamEvent::TileCompleted {
                coord,
                from_cache: true,
            });
            continue;
        }

        if let Some(map) = generator.cache.load(coord) {
            index
                .lock()
                .expect("tile index lock")
                .insert(coord, Arc::new(map));
            let _ = events.send(StreamEvent::TileCompleted {
                coord,
                from_cache: true,
            });
            continue;
        }

        let eroded = generator.simulator.erode_tile(&generator.compositor, coord);

        // A shutdown that arrived during generation drops the tile rather
        // than persisting a result nobody will wait for.
        if stop.load(Ordering::Relaxed) {
            log::debug!("shutdown observed; dropping in-flight tile {coord:?}");
            return;
        }

        if let Err(err) = generator.cache.save(coord, &eroded) {
            log::warn!("tile {coord:?} not persisted, will regenerate next run: {err:#}");
            let _ = events.send(StreamEvent::Warning(format!(
                "tile ({}, {}) not persisted: {err:#}",
                coord.x, coord.y
            )));
        }
        index
            .lock()
            .expect("tile index lock")
            .insert(coord, Arc::new(eroded));
        let _ = events.send(StreamEvent::TileCompleted {
            coord,
            from_cache: false,
        });

        // Tile boundary is the cooperative yield point.
        std::thread::yield_now();
    }

    let _ = events.send(StreamEvent::BatchCompleted { rect });
}

enum Backend {
    /// Batches run on a dedicated worker thread.
    Worker {
        jobs: Option<Sender<TileRect>>,
        handle: Option<JoinHandle<()>>,
    },
    /// Batches run synchronously inside the requesting call. Used by
    /// single-threaded embeddings and deterministic tests.
    Inline {
        generator: TileGenerator,
        events: Sender<StreamEvent>,
    },
}

pub struct TileStreamer {
    config: WorldConfig,
    index: Arc<Mutex<TileIndex>>,
    events_rx: Receiver<StreamEvent>,
    backend: Backend,
    stop: Arc<AtomicBool>,
    history: BatchHistory,
    active_region: Option<TileRect>,
    generating: Option<TileRect>,
    pending_events: Vec<StreamEvent>,
}

impl TileStreamer {
    /// Build the full pipeline with a background generation worker.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        Self::build(config, true)
    }

    /// Build the pipeline with the cooperative inline backend: batches run
    /// to completion inside the call that schedules them.
    pub fn new_inline(config: WorldConfig) -> Result<Self, ConfigError> {
        Self::build(config, false)
    }

    fn build(config: WorldConfig, background: bool) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache =
            TileCache::open(&config.cache, config.world_seed).map_err(|source| {
                ConfigError::CacheRoot {
                    path: config.cache.root_path.clone(),
                    source,
                }
            })?;
        let generator = TileGenerator {
            compositor: LayerCompositor::new(config.tile_size, config.layers),
            simulator: ErosionSimulator::new(
                config.tile_size,
                config.padding,
                config.world_seed,
                config.erosion,
            ),
            cache,
        };

        let index: Arc<Mutex<TileIndex>> = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel();
        let history = BatchHistory::new(config.streaming.max_cached_batches);

        let backend = if background {
            let (jobs_tx, jobs_rx) = mpsc::channel::<TileRect>();
            let worker_index = Arc::clone(&index);
            let worker_stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name("tile-gen-worker".into())
                .spawn(move || {
                    while let Ok(rect) = jobs_rx.recv() {
                        if worker_stop.load(Ordering::Relaxed) {
                            break;
                        }
                        run_batch(&generator, &worker_index, &events_tx, &worker_stop, rect);
                    }
                })
                .expect("spawning tile generation worker");
            Backend::Worker {
                jobs: Some(jobs_tx),
                handle: Some(handle),
            }
        } else {
            Backend::Inline {
                generator,
                events: events_tx,
            }
        };

        Ok(Self {
            config,
            index,
            events_rx,
            backend,
            stop,
            history,
            active_region: None,
            generating: None,
            pending_events: Vec::new(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Schedule the first batch around the configured initial tile.
    pub fn start(&mut self) {
        self.start_initial_batch(self.config.streaming.initial_tile);
    }

    /// Schedule the first batch, centered on `center`. Ignored with a
    /// warning while any batch is still in flight.
    pub fn start_initial_batch(&mut self, center: TileCoord) {
        if self.generating.is_some() {
            log::warn!("batch already in flight; ignoring start_initial_batch({center:?})");
            return;
        }
        let rect = TileRect::centered(center, self.config.streaming.batch_size as i32);
        self.begin_batch(rect);
    }

    /// Per-frame consumer entry point. Never blocks: drains worker events,
    /// finalizes completed batches (history, eviction), schedules a
    /// predicted batch when the consumer nears the active region's edge,
    /// and returns the current 3x3 snapshot.
    pub fn tick(&mut self, consumer_pos: Vec3, consumer_vel: Vec3) -> RenderingSnapshot {
        self.drain_worker_events();

        let consumer_tile = world_to_tile(consumer_pos.x, consumer_pos.z, self.config.tile_size);

        if self.generating.is_none() {
            if let Some(active) = self.active_region {
                let threshold = self.config.streaming.edge_threshold as i32;
                if active.edge_distance(consumer_tile) <= threshold {
                    let rect = predict_next(
                        consumer_tile,
                        consumer_vel,
                        self.config.streaming.batch_size,
                    );
                    if !self.history.contains_rect(&rect) {
                        self.begin_batch(rect);
                        // Inline batches finish synchronously; pick their
                        // completion up in the same tick.
                        self.drain_worker_events();
                    }
                }
            }
        }

        self.snapshot_at(consumer_tile)
    }

    /// Drain and return every event emitted since the last call.
    pub fn take_events(&mut self) -> Vec<StreamEvent> {
        self.drain_worker_events();
        std::mem::take(&mut self.pending_events)
    }

    /// Signal the worker to exit at the next tile boundary and wait for it.
    /// The in-flight tile, if any, is dropped without being persisted.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Backend::Worker { jobs, handle } = &mut self.backend {
            // Dropping the sender wakes a worker blocked on the queue.
            jobs.take();
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    log::warn!("tile generation worker panicked during shutdown");
                }
            }
        }
        self.generating = None;
    }

    pub fn is_generating(&self) -> bool {
        self.generating.is_some()
    }

    pub fn active_region(&self) -> Option<TileRect> {
        self.active_region
    }

    pub fn completed_regions(&self) -> Vec<TileRect> {
        self.history.regions().copied().collect()
    }

    /// Coordinates currently materialized in the in-memory index.
    pub fn resident_tiles(&self) -> Vec<TileCoord> {
        self.index
            .lock()
            .expect("tile index lock")
            .keys()
            .copied()
            .collect()
    }

    /// Read-only share of one resident tile's heightmap, if materialized.
    pub fn heightmap(&self, coord: TileCoord) -> Option<Arc<Heightmap>> {
        self.index
            .lock()
            .expect("tile index lock")
            .get(&coord)
            .cloned()
    }

    pub fn cache_stats(&self) -> CacheStats {
        match &self.backend {
            Backend::Inline { generator, .. } => generator.cache.stats(),
            // The worker owns the cache handle; reopen a reader.
            Backend::Worker { .. } => TileCache::open(&self.config.cache, self.config.world_seed)
                .map(|cache| cache.stats())
                .unwrap_or_default(),
        }
    }

    fn begin_batch(&mut self, rect: TileRect) {
        self.generating = Some(rect);
        log::debug!("scheduling batch {rect:?}");
        match &self.backend {
            Backend::Worker { jobs, .. } => {
                let alive = jobs.as_ref().map(|jobs| jobs.send(rect).is_ok());
                if alive != Some(true) {
                    log::warn!("generation worker unavailable; dropping batch {rect:?}");
                    self.generating = None;
                }
            }
            Backend::Inline { generator, events } => {
                run_batch(generator, &self.index, events, &self.stop, rect);
            }
        }
    }

    fn drain_worker_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            if let StreamEvent::BatchCompleted { rect } = &event {
                self.active_region = Some(*rect);
                self.generating = None;
                let dropped = self.history.push(*rect);
                if !dropped.is_empty() {
                    let mut index = self.index.lock().expect("tile index lock");
                    for tile in &dropped {
                        index.remove(tile);
                    }
                    log::debug!(
                        "evicted {} tiles after completing batch {rect:?}",
                        dropped.len()
                    );
                }
            }
            self.pending_events.push(event);
        }
    }

    fn snapshot_at(&self, center: TileCoord) -> RenderingSnapshot {
        let index = self.index.lock().expect("tile index lock");
        let mut tiles = Vec::with_capacity(9);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let coord = center.offset(dx, dy);
                if let Some(map) = index.get(&coord) {
                    tiles.push(SnapshotTile {
                        coord,
                        heightmap: Arc::clone(map),
                    });
                }
            }
        }
        RenderingSnapshot { center, tiles }
    }
}

impl Drop for TileStreamer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
