//! Per-pixel colour function for the ember smoke background.
//!
//! ```text
//!   frag ─▶ uv ─▶ aspect-corrected pos ─┬─▶ fbm(pos*3 + (0,-t)) = near ─┬─▶ mix factor ─▶ ramp colour
//!                                       └─▶ fbm(pos*6 + (t, 0)) = far ──┴─▶ density ─▶ smoothstep mask
//! ```
//!
//! Fragment coordinates follow the GL convention: origin at the bottom-left
//! corner, pixel centres at `+0.5`. The same constants feed the GLSL shader
//! generated by the renderer. This module is the double-precision reference;
//! the GPU evaluates the same program in `f32`.

use crate::math::{smoothstep, Vec2};
use crate::noise::fbm;
use crate::palette::{ColorRamp, Rgb};

/// Drift of both smoke layers, in noise units per second.
pub const DRIFT_SPEED: f64 = 0.2;
/// Spatial frequency of the near (coarse) layer.
pub const NEAR_SCALE: f64 = 3.0;
/// Spatial frequency of the far (fine) layer.
pub const FAR_SCALE: f64 = 6.0;
/// Weight of each layer in the combined density.
pub const LAYER_WEIGHT: f64 = 0.5;
/// Gain and bias of the near-layer perturbation of the gradient boundary;
/// together they shift the mix factor by roughly ±0.1.
pub const EDGE_NOISE_GAIN: f64 = 0.2;
pub const EDGE_NOISE_BIAS: f64 = 0.1;
/// Density range mapped onto the 0..1 intensity mask.
pub const MASK_LOW: f64 = 0.3;
pub const MASK_HIGH: f64 = 0.8;
/// Brightness boost applied after masking; slight overbright is intended.
pub const GLOW: f64 = 1.2;

/// Viewport size in pixels. Dimensions are clamped to at least one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    width: f64,
    height: f64,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: f64::from(width.max(1)),
            height: f64::from(height.max(1)),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    /// Maps a fragment coordinate into `[0, 1]²`.
    pub fn normalize(&self, frag_coord: Vec2) -> Vec2 {
        frag_coord / Vec2::new(self.width, self.height)
    }
}

/// Every intermediate of one shading evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmokeSample {
    pub uv: Vec2,
    pub near: f64,
    pub far: f64,
    pub density: f64,
    pub mix_factor: f64,
    pub opacity: f64,
    pub color: Rgb,
}

/// Stretches the horizontal axis by the aspect ratio so noise cells stay
/// square regardless of viewport shape.
pub fn aspect_corrected(uv: Vec2, resolution: Resolution) -> Vec2 {
    Vec2::new(uv.x * resolution.aspect(), uv.y)
}

/// Horizontal gradient position perturbed by the near layer, clamped to `[0, 1]`.
pub fn mix_factor(uv_x: f64, near: f64) -> f64 {
    (uv_x + (near * EDGE_NOISE_GAIN - EDGE_NOISE_BIAS)).clamp(0.0, 1.0)
}

/// Fades thin smoke to black and lets dense smoke glow.
pub fn intensity_mask(density: f64) -> f64 {
    smoothstep(MASK_LOW, MASK_HIGH, density)
}

pub fn sample(
    frag_coord: Vec2,
    resolution: Resolution,
    time: f64,
    ramp: &ColorRamp,
) -> SmokeSample {
    let uv = resolution.normalize(frag_coord);
    let pos = aspect_corrected(uv, resolution);

    let movement = time * DRIFT_SPEED;
    let near = fbm(pos * NEAR_SCALE + Vec2::new(0.0, -movement));
    let far = fbm(pos * FAR_SCALE + Vec2::new(movement, 0.0));
    let density = near * LAYER_WEIGHT + far * LAYER_WEIGHT;

    let mix_factor = mix_factor(uv.x, near);
    let opacity = intensity_mask(density);
    let color = ramp.sample(mix_factor).scale(opacity * GLOW);

    SmokeSample {
        uv,
        near,
        far,
        density,
        mix_factor,
        opacity,
        color,
    }
}

/// Colour of one fragment; alpha is implicitly 1.
pub fn shade(frag_coord: Vec2, resolution: Resolution, time: f64, ramp: &ColorRamp) -> Rgb {
    sample(frag_coord, resolution, time, ramp).color
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_800X600_CENTRE: [f64; 3] = [
        0.489_056_907_758_424_53,
        0.160_869_281_022_103_13,
        0.012_870_641_978_016_788,
    ];

    fn assert_rgb_close(actual: Rgb, expected: [f64; 3]) {
        let channels = [actual.r, actual.g, actual.b];
        for (index, (a, e)) in channels.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-9, "channel {index}: {a} != {e}");
        }
    }

    #[test]
    fn golden_colour_at_viewport_centre() {
        let colour = shade(
            Vec2::new(400.0, 300.0),
            Resolution::new(800, 600),
            0.0,
            &ColorRamp::EMBER,
        );
        assert_rgb_close(colour, GOLDEN_800X600_CENTRE);
    }

    #[test]
    fn golden_colour_after_ten_seconds() {
        let colour = shade(
            Vec2::new(400.0, 300.0),
            Resolution::new(800, 600),
            10.0,
            &ColorRamp::EMBER,
        );
        assert_rgb_close(
            colour,
            [
                0.177_674_823_635_119_88,
                0.054_643_553_246_743_894,
                0.005_260_593_626_279_394,
            ],
        );
    }

    #[test]
    fn repeated_evaluation_is_identical() {
        let resolution = Resolution::new(1920, 1080);
        let frag = Vec2::new(811.5, 97.5);
        let first = sample(frag, resolution, 0.0, &ColorRamp::EMBER);
        let second = sample(frag, resolution, 0.0, &ColorRamp::EMBER);
        assert_eq!(first, second);
    }

    #[test]
    fn mix_factor_is_clamped_at_both_edges() {
        assert_eq!(mix_factor(0.0, 0.0), 0.0);
        assert_eq!(mix_factor(0.0, -5.0), 0.0);
        assert_eq!(mix_factor(1.0, 0.968_75), 1.0);
        assert_eq!(mix_factor(1.0, 5.0), 1.0);
        assert!((mix_factor(0.5, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn resize_rescales_horizontal_axis_only() {
        let uv = Vec2::new(0.4, 0.7);
        let before = aspect_corrected(uv, Resolution::new(800, 600));
        let after = aspect_corrected(uv, Resolution::new(1920, 1080));

        let old_ratio = 800.0 / 600.0;
        let new_ratio = 1920.0 / 1080.0;
        assert!((after.x / before.x - new_ratio / old_ratio).abs() < 1e-12);
        assert_eq!(after.y, before.y);
    }

    #[test]
    fn zero_sized_viewport_is_clamped() {
        let resolution = Resolution::new(0, 0);
        assert_eq!(resolution.aspect(), 1.0);
        let colour = shade(Vec2::new(0.5, 0.5), resolution, 3.0, &ColorRamp::EMBER);
        assert!(colour.r.is_finite() && colour.g.is_finite() && colour.b.is_finite());
    }

    #[test]
    fn intermediates_respect_their_ranges() {
        let resolution = Resolution::new(640, 360);
        for (x, y, t) in [(0.5, 0.5, 0.0), (639.5, 359.5, 12.0), (320.5, 10.5, 3600.0)] {
            let s = sample(Vec2::new(x, y), resolution, t, &ColorRamp::EMBER);
            assert!((0.0..=1.0).contains(&s.mix_factor));
            assert!((0.0..=1.0).contains(&s.opacity));
            assert!(s.density <= crate::noise::FBM_AMPLITUDE_SUM);
            assert!(s.color.r <= GLOW && s.color.g <= GLOW && s.color.b <= GLOW);
        }
    }

    #[test]
    fn sparse_smoke_fades_to_black() {
        assert_eq!(intensity_mask(0.1), 0.0);
        assert_eq!(intensity_mask(0.9), 1.0);
    }
}
