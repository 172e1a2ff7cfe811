//! Lattice value noise and its fractal (fBm) sum.
//!
//! Every function here is pure: no state, no entropy source, so each pixel of
//! a frame can be evaluated independently and in any order.

use crate::math::{fract, hermite, mix, Rotation, Vec2};

/// Number of noise layers summed by [`fbm`].
pub const OCTAVES: usize = 5;
/// Rotation (radians) applied to the sampling position between octaves.
pub const OCTAVE_ROTATION: f64 = 0.5;
/// Frequency multiplier between octaves.
pub const LACUNARITY: f64 = 2.0;
/// Amplitude of the first octave; each later octave multiplies by it again.
pub const GAIN: f64 = 0.5;
/// Upper bound of [`fbm`]: `0.5 + 0.25 + 0.125 + 0.0625 + 0.03125`.
pub const FBM_AMPLITUDE_SUM: f64 = 0.96875;

/// Dot-product weights and output scale of [`hash`].
pub const HASH_WEIGHTS: Vec2 = Vec2::new(12.9898, 78.233);
pub const HASH_SCALE: f64 = 43758.5453;

/// Deterministic pseudo-random value in `[0, 1)` for a lattice position.
pub fn hash(p: Vec2) -> f64 {
    fract(p.dot(HASH_WEIGHTS).sin() * HASH_SCALE)
}

/// Value noise: Hermite-eased bilinear blend of the four surrounding lattice
/// hashes. Continuous everywhere, including across cell boundaries.
pub fn smooth_noise(p: Vec2) -> f64 {
    let cell = p.floor();
    let offset = p - cell;
    let ux = hermite(offset.x);
    let uy = hermite(offset.y);

    let a = hash(cell);
    let b = hash(cell + Vec2::new(1.0, 0.0));
    let c = hash(cell + Vec2::new(0.0, 1.0));
    let d = hash(cell + Vec2::new(1.0, 1.0));

    mix(mix(a, b, ux), mix(c, d, ux), uy)
}

/// Fractional Brownian motion over [`OCTAVES`] layers of [`smooth_noise`].
///
/// Not normalised: the result lies in `[0, FBM_AMPLITUDE_SUM]`.
pub fn fbm(p: Vec2) -> f64 {
    let rotation = Rotation::new(OCTAVE_ROTATION);
    let mut position = p;
    let mut amplitude = GAIN;
    let mut value = 0.0;
    for _ in 0..OCTAVES {
        value += amplitude * smooth_noise(position);
        position = rotation.apply(position) * LACUNARITY;
        amplitude *= GAIN;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so the sweeps below cover scattered
    /// non-lattice positions without an RNG dependency.
    fn scatter(count: usize, span: f64) -> impl Iterator<Item = Vec2> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..count).map(move |_| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 53) as f64
            };
            Vec2::new((next() - 0.5) * span, (next() - 0.5) * span)
        })
    }

    #[test]
    fn hash_is_deterministic() {
        for p in scatter(256, 2000.0) {
            assert_eq!(hash(p).to_bits(), hash(p).to_bits());
        }
    }

    #[test]
    fn hash_stays_in_unit_range_on_integer_lattice() {
        for x in -1000..=1000 {
            for y in (-1000..=1000).step_by(37) {
                let value = hash(Vec2::new(x as f64, y as f64));
                assert!((0.0..1.0).contains(&value), "hash({x}, {y}) = {value}");
            }
        }
    }

    #[test]
    fn hash_reference_values() {
        assert_eq!(hash(Vec2::ZERO), 0.0);
        assert!((hash(Vec2::new(1.0, 0.0)) - 0.921_690_389_815_921_7).abs() < 1e-9);
        assert!((hash(Vec2::new(3.0, -7.0)) - 0.863_324_312_904_296_7).abs() < 1e-9);
    }

    #[test]
    fn smooth_noise_interpolates_lattice_corners() {
        let corner = Vec2::new(4.0, -2.0);
        assert_eq!(smooth_noise(corner), hash(corner));
        assert!((smooth_noise(Vec2::new(2.5, 1.25)) - 0.484_594_811_004_654_96).abs() < 1e-9);
    }

    #[test]
    fn smooth_noise_is_continuous_across_cells() {
        let epsilon = 1e-4;
        // Hermite slope peaks at 1.5 per axis and corner hashes differ by < 1.
        let bound = 3.0 * epsilon;
        for p in scatter(2000, 100.0) {
            let here = smooth_noise(p);
            let right = smooth_noise(p + Vec2::new(epsilon, 0.0));
            let up = smooth_noise(p + Vec2::new(0.0, epsilon));
            assert!((right - here).abs() <= bound, "jump at {p:?}");
            assert!((up - here).abs() <= bound, "jump at {p:?}");
        }

        for boundary in [-3.0, 0.0, 7.0] {
            let before = smooth_noise(Vec2::new(boundary - 1e-9, 0.3));
            let after = smooth_noise(Vec2::new(boundary + 1e-9, 0.3));
            assert!((after - before).abs() < 1e-6);
        }
    }

    #[test]
    fn fbm_is_bounded_by_amplitude_sum() {
        let expected: f64 = (0..OCTAVES).map(|i| GAIN.powi(i as i32 + 1)).sum();
        assert!((expected - FBM_AMPLITUDE_SUM).abs() < 1e-12);

        for p in scatter(5000, 1000.0) {
            let value = fbm(p);
            assert!(
                (0.0..=FBM_AMPLITUDE_SUM).contains(&value),
                "fbm({p:?}) = {value}"
            );
        }
    }

    #[test]
    fn fbm_reference_values() {
        assert_eq!(fbm(Vec2::ZERO), 0.0);
        assert!((fbm(Vec2::new(1.5, 2.25)) - 0.468_377_812_277_872).abs() < 1e-9);
    }
}
