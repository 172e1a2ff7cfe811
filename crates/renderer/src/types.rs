use std::time::Duration;

use smokefield::ColorRamp;

use crate::runtime::RenderPolicy;

/// Output color handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Same as `Gamma`: shader values are written to the swapchain untouched.
    #[default]
    Auto,
    /// Treat shader outputs as already gamma-encoded; use non-sRGB surfaces.
    Gamma,
    /// Treat shader outputs as linear and let an sRGB swapchain encode them.
    Linear,
}

/// How the renderer should present frames.
///
/// * `Wallpaper` streams frames into a Wayland layer surface on the background
///   layer, behind every other window.
/// * `Windowed` opens a regular `winit` window for previewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Wallpaper,
    Windowed,
}

/// Anti-aliasing policy for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the surface format.
    #[default]
    Auto,
    /// Disable MSAA and render directly into the swapchain.
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// What we learned about the adapter wgpu picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    /// True for CPU rasterisers such as llvmpipe or SwiftShader.
    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// Mirrors the CLI flags and the resolved config file: how large the surface
/// should be, which presentation path to use, how the smoke is tinted, and
/// how time advances.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window or fallback surface size in physical pixels.
    pub surface_size: (u32, u32),
    /// Presentation mode (wallpaper vs preview window).
    pub mode: RenderMode,
    /// Optional resolution explicitly requested by the caller.
    pub requested_size: Option<(u32, u32)>,
    /// Gradient endpoints fed to the shader uniforms.
    pub ramp: ColorRamp,
    pub antialiasing: Antialiasing,
    pub color_space: ColorSpaceMode,
    pub power: GpuPowerPreference,
    /// High-level render behaviour requested by the caller.
    pub policy: RenderPolicy,
    /// Multiplier applied to wall-clock time in animated mode.
    pub time_scale: f64,
    /// Added to the animated clock so sessions can start mid-drift.
    pub time_offset: Duration,
}

impl Default for RendererConfig {
    /// Provides a 1080p wallpaper configuration with the ember palette.
    fn default() -> Self {
        Self {
            surface_size: (1920, 1080),
            mode: RenderMode::Wallpaper,
            requested_size: None,
            ramp: ColorRamp::EMBER,
            antialiasing: Antialiasing::default(),
            color_space: ColorSpaceMode::default(),
            power: GpuPowerPreference::default(),
            policy: RenderPolicy::default(),
            time_scale: 1.0,
            time_offset: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, device_type: wgpu::DeviceType) -> AdapterProfile {
        AdapterProfile {
            name: name.into(),
            backend: wgpu::Backend::Vulkan,
            device_type,
        }
    }

    #[test]
    fn detects_software_adapters() {
        assert!(profile("llvmpipe (LLVM 17.0.6, 256 bits)", wgpu::DeviceType::Other).is_software());
        assert!(profile("SwiftShader", wgpu::DeviceType::Cpu).is_software());
        assert!(!profile("AMD Radeon RX 7800", wgpu::DeviceType::DiscreteGpu).is_software());
    }

    #[test]
    fn default_config_uses_ember_palette_and_real_time() {
        let config = RendererConfig::default();
        assert_eq!(config.ramp, ColorRamp::EMBER);
        assert_eq!(config.time_scale, 1.0);
        assert_eq!(config.mode, RenderMode::Wallpaper);
    }
}
