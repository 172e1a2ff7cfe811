//! Renderer crate for emberwall.
//!
//! Turns the smoke field into pixels on a live host surface or in a PNG:
//!
//! ```text
//!   emberwall CLI
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ wallpaper (layer surface, frame callbacks)
//!                 └─▶ window    (winit preview, AboutToWait pacing)
//!
//!   export_png ──▶ CPU raster (reference) or offscreen GPU ─▶ PNG
//! ```
//!
//! The live targets share `GpuState` for device setup and drawing and
//! `RenderPolicyDriver` for the clock and frame pacing. The fragment shader is
//! generated from the same constants the CPU reference in `smokefield` uses.

mod export;
mod gpu;
mod runtime;
mod shader;
mod types;
mod wallpaper;
mod window;

use anyhow::Result;

pub use export::{
    default_export_path, export_png, render_still, write_png, ExportBackend, ExportReport,
    FrameOrigin, RenderExportError, StillRequest, MAX_EXPORT_DIMENSION,
};
pub use runtime::{
    time_source_for_policy, BoxedTimeSource, FixedTimeSource, FrameScheduler, RenderPolicy,
    SystemTimeSource, TimeSample, TimeSource,
};
pub use shader::{fragment_source, shader_constants};
pub use types::{
    AdapterProfile, Antialiasing, ColorSpaceMode, GpuPowerPreference, RenderMode, RendererConfig,
};
pub use window::WindowRuntime;

/// High-level entry point that owns the chosen configuration.
///
/// Still-frame export does not need a host surface and goes through
/// [`export_png`] directly.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Runs until the host goes away: the layer surface is closed or the
    /// preview window is closed.
    pub fn run(&mut self) -> Result<()> {
        match self.config.mode {
            RenderMode::Wallpaper => wallpaper::run(&self.config),
            RenderMode::Windowed => WindowRuntime::spawn(self.config.clone())?.wait(),
        }
    }
}
