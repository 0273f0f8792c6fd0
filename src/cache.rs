//! Content-addressed on-disk store for eroded tiles.
//!
//! One directory per world seed, one record per tile. Records are written
//! to a temp file and renamed into place, so a reader (this process or any
//! other sharing the cache root) never observes a partial write. Unreadable
//! records are demoted to cache misses, never errors.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

use crate::heightmap::Heightmap;
use crate::types::TileCoord;

const TILE_MAGIC: [u8; 4] = *b"THM1";
const TILE_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheParams {
    pub enabled: bool,
    pub root_path: PathBuf,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            enabled: true,
            root_path: PathBuf::from("terrain_cache"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub tile_count: usize,
    pub bytes: u64,
}

#[derive(Serialize, Deserialize)]
struct TileRecord {
    magic: [u8; 4],
    version: u32,
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

pub struct TileCache {
    enabled: bool,
    root: PathBuf,
    world_seed: u32,
}

impl TileCache {
    /// Open (and create) the store for one world seed. A disabled cache
    /// touches no filesystem state and answers every query with a miss.
    pub fn open(params: &CacheParams, world_seed: u32) -> std::io::Result<Self> {
        let cache = Self {
            enabled: params.enabled,
            root: params.root_path.clone(),
            world_seed,
        };
        if cache.enabled {
            fs::create_dir_all(cache.seed_dir())?;
        }
        Ok(cache)
    }

    pub fn seed_dir(&self) -> PathBuf {
        self.root.join(format!("seed_{}", self.world_seed))
    }

    fn tile_path(&self, coord: TileCoord) -> PathBuf {
        self.seed_dir()
            .join(format!("tile_{}_{}.hgt", coord.x, coord.y))
    }

    pub fn has(&self, coord: TileCoord) -> bool {
        self.enabled && self.tile_path(coord).is_file()
    }

    /// Load a tile, or `None` if it is absent or unreadable. A failed parse
    /// is logged and treated as a miss; the record will be overwritten by
    /// the next save.
    pub fn load(&self, coord: TileCoord) -> Option<Heightmap> {
        if !self.enabled {
            return None;
        }
        let path = self.tile_path(coord);
        if !path.is_file() {
            return None;
        }
        match read_record(&path) {
            Ok(map) => Some(map),
            Err(err) => {
                log::warn!("treating unreadable tile record {path:?} as a miss: {err:#}");
                None
            }
        }
    }

    /// Atomically persist a tile: serialize, write to a temp file in the
    /// same directory, rename into place.
    pub fn save(&self, coord: TileCoord, map: &Heightmap) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let record = TileRecord {
            magic: TILE_MAGIC,
            version: TILE_VERSION,
            width: map.width() as u32,
            height: map.height() as u32,
            samples: map.as_slice().to_vec(),
        };
        let bytes = bincode::serialize(&record).context("serializing tile record")?;
        let packed = compress_prepend_size(&bytes);

        let dir = self.seed_dir();
        fs::create_dir_all(&dir).with_context(|| format!("creating {dir:?}"))?;
        let path = self.tile_path(coord);
        // Process id in the temp name keeps concurrent writers sharing the
        // seed directory from clobbering each other's staging files.
        let tmp = dir.join(format!(
            "tile_{}_{}.{}.tmp",
            coord.x,
            coord.y,
            std::process::id()
        ));
        fs::write(&tmp, &packed).with_context(|| format!("writing {tmp:?}"))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming into {path:?}"))?;
        Ok(())
    }

    /// Scan the seed directory for record count and total size.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        if !self.enabled {
            return stats;
        }
        let Ok(entries) = fs::read_dir(self.seed_dir()) else {
            return stats;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "hgt") {
                if let Ok(meta) = entry.metadata() {
                    stats.tile_count += 1;
                    stats.bytes += meta.len();
                }
            }
        }
        stats
    }

    /// Delete every record under this seed's directory.
    pub fn clear(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let dir = self.seed_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("clearing {dir:?}"))?;
        }
        Ok(())
    }
}

fn read_record(path: &Path) -> anyhow::Result<Heightmap> {
    let packed = fs::read(path).with_context(|| format!("reading {path:?}"))?;
    let bytes = decompress_size_prepended(&packed).context("decompressing tile record")?;
    let record: TileRecord = bincode::deserialize(&bytes).context("decoding tile record")?;
    anyhow::ensure!(record.magic == TILE_MAGIC, "bad tile magic");
    anyhow::ensure!(
        record.version == TILE_VERSION,
        "unsupported tile version {}",
        record.version
    );
    let width = record.width as usize;
    let height = record.height as usize;
    Heightmap::from_raw(width, height, record.samples)
        .ok_or_else(|| anyhow::anyhow!("sample count does not match {width}x{height}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dir: &Path) -> CacheParams {
        CacheParams {
            enabled: true,
            root_path: dir.to_path_buf(),
        }
    }

    fn checker_map(side: usize) -> Heightmap {
        let mut map = Heightmap::new(side, side);
        for y in 0..side {
            for x in 0..side {
                map.set(x, y, ((x ^ y) as f32) * 0.125 - 3.5);
            }
        }
        map
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 12345).unwrap();
        let coord = TileCoord::new(-4, 9);
        let map = checker_map(16);

        assert!(!cache.has(coord));
        cache.save(coord, &map).unwrap();
        assert!(cache.has(coord));

        let loaded = cache.load(coord).expect("saved tile loads");
        assert_eq!(loaded.as_slice(), map.as_slice());
    }

    #[test]
    fn missing_tile_is_a_quiet_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 1).unwrap();
        assert!(cache.load(TileCoord::new(0, 0)).is_none());
    }

    #[test]
    fn truncated_record_degrades_to_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 7).unwrap();
        let coord = TileCoord::new(2, 3);
        cache.save(coord, &checker_map(8)).unwrap();

        let path = cache.seed_dir().join("tile_2_3.hgt");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(cache.has(coord));
        assert!(cache.load(coord).is_none());
    }

    #[test]
    fn garbage_record_degrades_to_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 7).unwrap();
        let path = cache.seed_dir().join("tile_0_0.hgt");
        fs::write(&path, b"not a tile record at all").unwrap();
        assert!(cache.load(TileCoord::new(0, 0)).is_none());
    }

    #[test]
    fn stats_count_records_and_ignore_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 3).unwrap();
        cache.save(TileCoord::new(0, 0), &checker_map(8)).unwrap();
        cache.save(TileCoord::new(1, 0), &checker_map(8)).unwrap();
        fs::write(cache.seed_dir().join("tile_9_9.123.tmp"), b"partial").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.tile_count, 2);
        assert!(stats.bytes > 0);
    }

    #[test]
    fn clear_removes_every_record_for_the_seed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(&params(dir.path()), 3).unwrap();
        cache.save(TileCoord::new(0, 0), &checker_map(8)).unwrap();
        cache.clear().unwrap();
        assert!(!cache.has(TileCoord::new(0, 0)));
        assert_eq!(cache.stats().tile_count, 0);
    }

    #[test]
    fn seeds_do_not_share_records() {
        let dir = tempfile::tempdir().unwrap();
        let a = TileCache::open(&params(dir.path()), 1).unwrap();
        let b = TileCache::open(&params(dir.path()), 2).unwrap();
        a.save(TileCoord::new(0, 0), &checker_map(8)).unwrap();
        assert!(a.has(TileCoord::new(0, 0)));
        assert!(!b.has(TileCoord::new(0, 0)));
    }

    #[test]
    fn disabled_cache_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::open(
            &CacheParams {
                enabled: false,
                root_path: dir.path().join("never_created"),
            },
            5,
        )
        .unwrap();
        cache.save(TileCoord::new(0, 0), &checker_map(8)).unwrap();
        assert!(!cache.has(TileCoord::new(0, 0)));
        assert!(cache.load(TileCoord::new(0, 0)).is_none());
        assert!(!dir.path().join("never_created").exists());
    }
}
