use serde::{Deserialize, Serialize};

/// Integer lattice index of a tile. Tile `(tx, ty)` covers world pixels
/// `[tx*S, (tx+1)*S) x [ty*S, (ty+1)*S)` for tile edge length `S`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Minimum world pixel of this tile.
    pub fn world_min(self, tile_size: usize) -> (i32, i32) {
        (self.x * tile_size as i32, self.y * tile_size as i32)
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Tile containing a continuous world position.
pub fn world_to_tile(wx: f32, wy: f32, tile_size: usize) -> TileCoord {
    let size = tile_size as f32;
    TileCoord {
        x: (wx / size).floor() as i32,
        y: (wy / size).floor() as i32,
    }
}

/// Axis-aligned rectangle of tile coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub origin: TileCoord,
    pub width: i32,
    pub height: i32,
}

impl TileRect {
    pub fn new(origin: TileCoord, width: i32, height: i32) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            origin,
            width,
            height,
        }
    }

    /// Square rect of edge `size` whose integer center is `center`.
    pub fn centered(center: TileCoord, size: i32) -> Self {
        Self::new(center.offset(-size / 2, -size / 2), size, size)
    }

    /// Inclusive maximum tile on the x axis.
    pub fn max_x(&self) -> i32 {
        self.origin.x + self.width - 1
    }

    /// Inclusive maximum tile on the y axis.
    pub fn max_y(&self) -> i32 {
        self.origin.y + self.height - 1
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        tile.x >= self.origin.x
            && tile.x <= self.max_x()
            && tile.y >= self.origin.y
            && tile.y <= self.max_y()
    }

    /// Continuous center of the rect in tile units.
    pub fn center(&self) -> (f32, f32) {
        (
            self.origin.x as f32 + (self.width as f32 - 1.0) / 2.0,
            self.origin.y as f32 + (self.height as f32 - 1.0) / 2.0,
        )
    }

    pub fn len(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let origin = self.origin;
        let width = self.width;
        (0..self.height).flat_map(move |dy| {
            (0..width).map(move |dx| TileCoord {
                x: origin.x + dx,
                y: origin.y + dy,
            })
        })
    }

    /// Chebyshev distance from `tile` to the nearest rect edge; negative
    /// when the tile lies outside the rect.
    pub fn edge_distance(&self, tile: TileCoord) -> i32 {
        let left = tile.x - self.origin.x;
        let right = self.max_x() - tile.x;
        let bottom = tile.y - self.origin.y;
        let top = self.max_y() - tile.y;
        left.min(right).min(bottom).min(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_tile_floors_negative_positions() {
        assert_eq!(world_to_tile(0.0, 0.0, 16), TileCoord::new(0, 0));
        assert_eq!(world_to_tile(15.9, 0.0, 16), TileCoord::new(0, 0));
        assert_eq!(world_to_tile(16.0, 0.0, 16), TileCoord::new(1, 0));
        assert_eq!(world_to_tile(-0.1, -16.0, 16), TileCoord::new(-1, -1));
    }

    #[test]
    fn centered_rect_covers_the_center_tile() {
        let rect = TileRect::centered(TileCoord::new(0, 0), 4);
        assert_eq!(rect.origin, TileCoord::new(-2, -2));
        assert!(rect.contains(TileCoord::new(0, 0)));
        assert!(rect.contains(TileCoord::new(-2, 1)));
        assert!(!rect.contains(TileCoord::new(2, 0)));
        assert_eq!(rect.len(), 16);
    }

    #[test]
    fn iter_visits_every_tile_once() {
        let rect = TileRect::new(TileCoord::new(3, -1), 3, 2);
        let tiles: Vec<_> = rect.iter().collect();
        assert_eq!(tiles.len(), 6);
        let unique: std::collections::HashSet<_> = tiles.iter().copied().collect();
        assert_eq!(unique.len(), 6);
        assert!(tiles.iter().all(|t| rect.contains(*t)));
    }

    #[test]
    fn edge_distance_is_zero_on_the_boundary_and_negative_outside() {
        let rect = TileRect::new(TileCoord::new(0, 0), 4, 4);
        assert_eq!(rect.edge_distance(TileCoord::new(0, 2)), 0);
        assert_eq!(rect.edge_distance(TileCoord::new(1, 1)), 1);
        assert_eq!(rect.edge_distance(TileCoord::new(5, 2)), -2);
    }

    #[test]
    fn center_of_even_rect_sits_between_tiles() {
        let rect = TileRect::new(TileCoord::new(0, 0), 4, 4);
        assert_eq!(rect.center(), (1.5, 1.5));
    }
}
