//! Deterministic per-path random streams
//!
//! Every path owns independent generators derived from `(seed, path_index,
//! stream)`, so a run's output does not depend on how paths are partitioned
//! across workers or compute streams.

use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Independent random streams drawn by a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    Returns,
    Inflation,
}

impl RngStream {
    const fn tag(self) -> u64 {
        match self {
            RngStream::Returns => 0x5245_5455_524e_5300,
            RngStream::Inflation => 0x494e_464c_4154_4500,
        }
    }
}

#[inline]
fn split_mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// 64-bit seed for one path's stream
#[must_use]
pub fn path_seed(seed: u64, path_index: usize, stream: RngStream) -> u64 {
    split_mix(split_mix(seed ^ stream.tag()) ^ (path_index as u64))
}

#[must_use]
pub fn path_rng(seed: u64, path_index: usize, stream: RngStream) -> SmallRng {
    SmallRng::seed_from_u64(path_seed(seed, path_index, stream))
}

/// Standard normal pair from two uniforms in (0, 1].
///
/// Used by the kernel backend, whose device code has no access to
/// `rand_distr`.
#[inline]
#[must_use]
pub fn box_muller(u1: f64, u2: f64) -> (f64, f64) {
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (radius * theta.cos(), radius * theta.sin())
}
