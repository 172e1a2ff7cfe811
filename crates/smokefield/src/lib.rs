//! Procedural ember-smoke field: lattice value noise, fBm, and the per-pixel
//! colour function used by the emberwall background.
//!
//! Everything here is pure and deterministic. The renderer crate runs the same
//! program as a GLSL fragment shader; this crate is the reference it is
//! generated from and the CPU path used for headless export.
//!
//! - [`noise`]: `hash`, `smooth_noise`, `fbm`.
//! - [`shade`]: the shading program (`sample`, `shade`) and its constants.
//! - [`palette`]: colours and the clamped two-colour ramp.
//! - [`raster`]: whole-frame CPU evaluation into RGBA8.

pub mod math;
pub mod noise;
pub mod palette;
pub mod raster;
pub mod shade;

pub use math::Vec2;
pub use noise::{fbm, hash, smooth_noise};
pub use palette::{ColorRamp, PaletteError, Rgb};
pub use raster::{rasterize, Frame};
pub use shade::{sample, shade, Resolution, SmokeSample};
