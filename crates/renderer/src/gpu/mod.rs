//! GPU side of the renderer.
//!
//! - `context` owns wgpu instance/device/surface wiring and rebuilds the
//!   swapchain when the host resizes.
//! - `pipeline` compiles the smoke shader into the one render pipeline we
//!   need and records the full-screen draw.
//! - `uniforms` mirrors the shader's uniform block.
//! - `state` glues everything together as the `GpuState` used by `window`
//!   and `wallpaper`.
//! - `offscreen` renders into a texture and reads it back for still export.

mod context;
mod offscreen;
mod pipeline;
mod state;
mod uniforms;

pub(crate) use offscreen::OffscreenRenderer;
pub(crate) use state::{surface_recovery, GpuState, SurfaceRecovery};
