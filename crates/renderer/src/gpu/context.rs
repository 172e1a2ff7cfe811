use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::TextureFormatFeatureFlags;
use winit::dpi::PhysicalSize;

use crate::types::{AdapterProfile, Antialiasing, ColorSpaceMode, GpuPowerPreference};

pub(crate) fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

/// Adapter, device and queue picked for a surface (or for headless use when
/// `surface` is `None`).
pub(crate) struct DeviceBundle {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: AdapterProfile,
}

pub(crate) fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
    power: GpuPowerPreference,
) -> Result<DeviceBundle> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: power.to_wgpu(),
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let profile = AdapterProfile::from_wgpu(&adapter.get_info());
    tracing::debug!(
        name = %profile.name,
        backend = ?profile.backend,
        device_type = ?profile.device_type,
        is_software = profile.is_software(),
        "selected GPU adapter"
    );

    // Sample counts above 4 are only usable with adapter-specific format features.
    let required_features =
        adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("emberwall device"),
        required_features,
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    Ok(DeviceBundle {
        adapter,
        device,
        queue,
        profile,
    })
}

/// Picks the MSAA sample count for `format`, honouring the request where the
/// hardware allows it.
pub(crate) fn choose_sample_count(
    bundle: &DeviceBundle,
    format: wgpu::TextureFormat,
    antialiasing: Antialiasing,
) -> u32 {
    let adapter_specific = bundle
        .device
        .features()
        .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
    let format_features = if adapter_specific {
        bundle.adapter.get_texture_format_features(format)
    } else {
        format.guaranteed_format_features(bundle.device.features())
    };
    let mut supported_samples = format_features.flags.supported_sample_counts();
    if !supported_samples.contains(&1) {
        supported_samples.push(1);
    }
    supported_samples.sort_unstable();
    supported_samples.dedup();

    let mut sample_count = clamp_sample_count(antialiasing, &supported_samples);

    if sample_count > 1
        && !format_features
            .flags
            .contains(TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE)
    {
        tracing::warn!(?format, "format does not support MSAA resolve; disabling MSAA");
        sample_count = 1;
    }

    if bundle.profile.is_software() && sample_count > 1 {
        tracing::warn!(
            sample_count,
            "software rasterizer detected; disabling MSAA for performance"
        );
        sample_count = 1;
    }

    sample_count
}

/// `supported` must be sorted ascending and contain `1`.
pub(crate) fn clamp_sample_count(antialiasing: Antialiasing, supported: &[u32]) -> u32 {
    match antialiasing {
        Antialiasing::Auto => supported.last().copied().unwrap_or(1),
        Antialiasing::Off => 1,
        Antialiasing::Samples(requested) => {
            if supported.contains(&requested) {
                requested
            } else {
                let fallback = supported
                    .iter()
                    .copied()
                    .filter(|&count| count <= requested)
                    .max()
                    .unwrap_or(1);
                tracing::warn!(
                    requested,
                    fallback,
                    ?supported,
                    "requested MSAA sample count not supported; falling back"
                );
                fallback
            }
        }
    }
}

pub(crate) fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    color_space: ColorSpaceMode,
) -> Option<wgpu::TextureFormat> {
    let want_srgb = matches!(color_space, ColorSpaceMode::Linear);
    let preferred = formats
        .iter()
        .copied()
        .find(|format| format.is_srgb() == want_srgb);
    if preferred.is_none() {
        if let Some(fallback) = formats.first() {
            tracing::warn!(
                ?fallback,
                want_srgb,
                "no surface format matches the requested color space; falling back"
            );
        }
    }
    preferred.or_else(|| formats.first().copied())
}

pub(crate) fn clamp_surface_size(size: PhysicalSize<u32>, max_dimension: u32) -> PhysicalSize<u32> {
    PhysicalSize::new(
        size.width.clamp(1, max_dimension.max(1)),
        size.height.clamp(1, max_dimension.max(1)),
    )
}

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub sample_count: u32,
    pub surface_format: wgpu::TextureFormat,
    pub adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        antialiasing: Antialiasing,
        color_space: ColorSpaceMode,
        power: GpuPowerPreference,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The handles outlive the surface: both hosts drop GpuState before
        // tearing down their window or layer surface.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let bundle = request_device(&instance, Some(&surface), power)?;
        let surface_caps = surface.get_capabilities(&bundle.adapter);

        let max_dimension = bundle.device.limits().max_texture_dimension_2d;
        let PhysicalSize { width, height } = clamp_surface_size(initial_size, max_dimension);
        if initial_size.width > max_dimension || initial_size.height > max_dimension {
            tracing::warn!(
                requested_width = initial_size.width,
                requested_height = initial_size.height,
                max_dimension,
                "surface larger than GPU texture limit; clamping"
            );
        }

        let surface_format = choose_surface_format(&surface_caps.formats, color_space)
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let sample_count = choose_sample_count(&bundle, surface_format, antialiasing);

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::CompositeAlphaMode::Opaque)
            .or_else(|| surface_caps.alpha_modes.first().copied())
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?present_mode, ?surface_format, sample_count, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&bundle.device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device: bundle.device,
            queue: bundle.queue,
            config,
            size: PhysicalSize::new(width, height),
            sample_count,
            surface_format,
            adapter_profile: bundle.profile,
        })
    }

    /// Reconfigures the swapchain, clamped to the device's texture limit.
    /// Returns the size actually applied; zero-sized requests keep the old one.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) -> PhysicalSize<u32> {
        if new_size.width == 0 || new_size.height == 0 {
            return self.size;
        }

        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let size = clamp_surface_size(new_size, max_dimension);
        if new_size.width > max_dimension || new_size.height > max_dimension {
            tracing::warn!(
                requested_width = new_size.width,
                requested_height = new_size.height,
                max_dimension,
                "surface larger than GPU texture limit; clamping"
            );
        }

        self.size = size;
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        size
    }

    /// Re-applies the current configuration after the surface was lost.
    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}
