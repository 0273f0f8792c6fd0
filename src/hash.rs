//! Deterministic integer hashing shared by every generation layer.
//!
//! The constants here are part of the world format: two builds that disagree
//! on any of them produce different worlds for the same seed.

/// Spatial granularity of droplet order keys. World positions are quantized
/// to 1/POS_KEY_SCALE of a pixel before hashing, so two spawn points closer
/// than that collide in key and fall back to the secondary sort order.
pub const POS_KEY_SCALE: f32 = 1000.0;

/// Hash a 2D lattice cell together with a seed into 32 uniformly mixed bits.
///
/// Negative coordinates participate through their two's-complement bit
/// pattern, so the lattice extends over the full i32 range.
#[inline]
pub fn hash2(x: i32, y: i32, seed: u32) -> u32 {
    let mut h = seed;
    h ^= (x as u32).wrapping_mul(0x1657_3971);
    h ^= (y as u32).wrapping_mul(0x27D4_EB2F);
    h ^= h >> 13;
    h = h.wrapping_mul(0x4BF9_D121);
    h ^= h >> 16;
    h
}

/// Draw the `index`-th uniform sample in `[0, 1)` from a seeded stream.
///
/// Mix-then-scale: the seed/index pair is mixed through two rounds of
/// xorshift-multiply, then scaled down from the full u32 range.
#[inline]
pub fn rand_f32(seed: u32, index: u32) -> f32 {
    let mut h = seed ^ index.wrapping_mul(0x2C92_77B5);
    h = ((h >> 16) ^ h).wrapping_mul(0x045D_9F3B);
    h = ((h >> 16) ^ h).wrapping_mul(0x045D_9F3B);
    h = (h >> 16) ^ h;
    h as f32 / 4_294_967_296.0
}

/// Order key for a world-space position: quantize to the key grid, then hash.
///
/// Every tile that enumerates the same spawn point computes the same key,
/// which is what makes the global droplet ordering tile-independent.
#[inline]
pub fn hash_pos(wx: f32, wy: f32, seed: u32) -> u32 {
    hash2(
        (wx * POS_KEY_SCALE).floor() as i32,
        (wy * POS_KEY_SCALE).floor() as i32,
        seed,
    )
}
