use bytemuck::{Pod, Zeroable};
use smokefield::ColorRamp;

/// CPU mirror of the `SmokeParams` block declared in the fragment shader.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SmokeUniforms {
    /// `(width, height, time, unused)`.
    pub resolution_time: [f32; 4],
    pub color_start: [f32; 4],
    pub color_end: [f32; 4],
}

unsafe impl Zeroable for SmokeUniforms {}
unsafe impl Pod for SmokeUniforms {}

impl SmokeUniforms {
    pub fn new(width: u32, height: u32, ramp: &ColorRamp) -> Self {
        Self {
            resolution_time: [width.max(1) as f32, height.max(1) as f32, 0.0, 0.0],
            color_start: ramp.start.to_rgba_f32(),
            color_end: ramp.end.to_rgba_f32(),
        }
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution_time[0] = width.max(1) as f32;
        self.resolution_time[1] = height.max(1) as f32;
    }

    /// Narrows the clock to `f32`; precision degrades after many hours of
    /// uptime, which only makes the drift slightly steppy.
    pub fn set_time(&mut self, seconds: f64) {
        self.resolution_time[2] = seconds as f32;
    }

    pub fn time(&self) -> f32 {
        self.resolution_time[2]
    }
}
