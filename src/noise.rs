//! Classical 2D simplex noise and its fractal Brownian sum.
//!
//! Gradients are selected per lattice corner through [`crate::hash::hash2`],
//! so the field is a pure function of position and seed with no gradient
//! tables to initialize or share.

use crate::hash::hash2;

const F2: f32 = 0.366_025_4; // (sqrt(3) - 1) / 2
const G2: f32 = 0.211_324_87; // (3 - sqrt(3)) / 6

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Eight-way gradient set: axis directions plus diagonals.
const GRADIENTS: [[f32; 2]; 8] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [-FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
    [-FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
];

#[inline]
fn corner_contribution(dx: f32, dy: f32, ix: i32, iy: i32, seed: i32) -> f32 {
    let t = 0.5 - dx * dx - dy * dy;
    if t <= 0.0 {
        return 0.0;
    }
    let g = GRADIENTS[(hash2(ix, iy, seed as u32) & 7) as usize];
    let t2 = t * t;
    t2 * t2 * (g[0] * dx + g[1] * dy)
}

/// Classical 2D simplex noise in `[-1, 1]`.
pub fn simplex2(x: f32, y: f32, seed: i32) -> f32 {
    // Skew onto the simplex grid.
    let s = (x + y) * F2;
    let i = (x + s).floor();
    let j = (y + s).floor();
    let t = (i + j) * G2;

    // Distances from the cell origin, unskewed.
    let x0 = x - (i - t);
    let y0 = y - (j - t);

    // Which of the two triangles of the cell are we in?
    let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

    let x1 = x0 - i1 as f32 + G2;
    let y1 = y0 - j1 as f32 + G2;
    let x2 = x0 - 1.0 + 2.0 * G2;
    let y2 = y0 - 1.0 + 2.0 * G2;

    let ii = i as i32;
    let jj = j as i32;

    let n = corner_contribution(x0, y0, ii, jj, seed)
        + corner_contribution(x1, y1, ii + i1, jj + j1, seed)
        + corner_contribution(x2, y2, ii + 1, jj + 1, seed);

    70.0 * n
}

/// Fractal Brownian sum of [`simplex2`] octaves, normalized by the total
/// amplitude so the result stays in `[-1, 1]` regardless of octave count.
pub fn fbm(
    x: f32,
    y: f32,
    seed: i32,
    freq: f32,
    octaves: u8,
    lacunarity: f32,
    persistence: f32,
) -> f32 {
    let mut amplitude = 1.0;
    let mut frequency = freq;
    let mut sum = 0.0;
    let mut norm = 0.0;
    for _ in 0..octaves {
        sum += amplitude * simplex2(x * frequency, y * frequency, seed);
        norm += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }
    if norm > 0.0 {
        sum / norm
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplex_stays_in_range() {
        for i in 0..2_000 {
            let x = (i as f32 * 0.173) - 150.0;
            let y = (i as f32 * 0.091) - 80.0;
            let v = simplex2(x, y, 7);
            assert!((-1.0..=1.0).contains(&v), "({x}, {y}) gave {v}");
        }
    }

    #[test]
    fn simplex_is_deterministic_and_seed_sensitive() {
        let a = simplex2(12.75, -3.25, 99);
        assert_eq!(a.to_bits(), simplex2(12.75, -3.25, 99).to_bits());
        assert_ne!(a.to_bits(), simplex2(12.75, -3.25, 100).to_bits());
    }

    #[test]
    fn simplex_varies_over_space() {
        let mut distinct = std::collections::HashSet::new();
        for i in 0..64 {
            distinct.insert(simplex2(i as f32 * 0.37, i as f32 * 0.53, 3).to_bits());
        }
        assert!(distinct.len() > 32);
    }

    #[test]
    fn fbm_normalization_bounds_output() {
        for i in 0..500 {
            let x = i as f32 * 1.37;
            let v = fbm(x, -x * 0.71, 11, 0.05, 6, 2.0, 0.5);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn fbm_with_zero_octaves_is_silent() {
        assert_eq!(fbm(5.0, 5.0, 1, 0.1, 0, 2.0, 0.5), 0.0);
    }

    #[test]
    fn fbm_octaves_add_detail() {
        let coarse = fbm(3.2, 4.1, 5, 0.1, 1, 2.0, 0.5);
        let fine = fbm(3.2, 4.1, 5, 0.1, 5, 2.0, 0.5);
        assert_ne!(coarse.to_bits(), fine.to_bits());
    }
}
