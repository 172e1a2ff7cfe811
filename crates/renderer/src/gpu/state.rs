use std::time::{Duration, Instant};

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::runtime::TimeSample;
use crate::types::{AdapterProfile, RendererConfig};

use super::context::GpuContext;
use super::pipeline::{encode_smoke_pass, MultisampleTarget, SmokePipeline};
use super::uniforms::SmokeUniforms;

/// Everything needed to draw the smoke field onto one presentable surface.
pub(crate) struct GpuState {
    context: GpuContext,
    pipeline: SmokePipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: SmokeUniforms,
    multisample_target: Option<MultisampleTarget>,
    stats: FrameStats,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        config: &RendererConfig,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(
            target,
            initial_size,
            config.antialiasing,
            config.color_space,
            config.power,
        )?;
        let pipeline = SmokePipeline::new(
            &context.device,
            context.surface_format,
            context.sample_count,
        );

        let uniforms = SmokeUniforms::new(context.size.width, context.size.height, &config.ramp);
        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("smoke uniform buffer"),
            size: std::mem::size_of::<SmokeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = pipeline.create_bind_group(&context.device, &uniform_buffer);
        context
            .queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let multisample_target = MultisampleTarget::new(
            &context.device,
            context.surface_format,
            context.size.width,
            context.size.height,
            context.sample_count,
        );

        Ok(Self {
            context,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            uniforms,
            multisample_target,
            stats: FrameStats::new(Instant::now()),
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    /// Reconfigures the swapchain and updates the resolution uniform so the
    /// next frame uses the new aspect ratio. Zero-sized requests are ignored
    /// and oversized ones are clamped to the GPU texture limit.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let size = self.context.resize(new_size);
        self.uniforms.set_resolution(size.width, size.height);
        self.multisample_target = MultisampleTarget::new(
            &self.context.device,
            self.context.surface_format,
            size.width,
            size.height,
            self.context.sample_count,
        );
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Draws one frame at `sample` and presents it.
    pub(crate) fn render(&mut self, sample: TimeSample) -> Result<(), wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;

        self.uniforms.set_time(sample.seconds);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("smoke encoder"),
                });
        encode_smoke_pass(
            &mut encoder,
            &self.pipeline,
            &self.uniform_bind_group,
            &view,
            self.multisample_target.as_ref(),
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        if let Some(fps) = self.stats.record(Instant::now()) {
            debug!(
                fps = fps.round(),
                frame = sample.frame_index,
                time = self.uniforms.time(),
                width = self.context.size.width,
                height = self.context.size.height,
                "render stats"
            );
        }
        Ok(())
    }
}

/// Once-per-second frame rate estimate for debug logging.
struct FrameStats {
    window_start: Instant,
    frames: u32,
}

impl FrameStats {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
        }
    }

    fn record(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < Self::WINDOW {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

/// Maps a surface error onto what the host should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SurfaceRecovery {
    Reconfigure,
    SkipFrame,
    Stop,
}

pub(crate) fn surface_recovery(error: &wgpu::SurfaceError) -> SurfaceRecovery {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceRecovery::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => SurfaceRecovery::Stop,
        wgpu::SurfaceError::Timeout => SurfaceRecovery::SkipFrame,
        wgpu::SurfaceError::Other => {
            warn!("surface reported an unknown error; retrying next frame");
            SurfaceRecovery::SkipFrame
        }
    }
}
