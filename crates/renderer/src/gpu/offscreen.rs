use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use smokefield::{ColorRamp, Frame};

use crate::types::{AdapterProfile, Antialiasing, GpuPowerPreference};

use super::context::{choose_sample_count, create_instance, request_device, DeviceBundle};
use super::pipeline::{encode_smoke_pass, MultisampleTarget, SmokePipeline};
use super::uniforms::SmokeUniforms;

/// Non-sRGB so shader values land in the image bytes unchanged, the same
/// encoding the CPU rasteriser writes.
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const BYTES_PER_PIXEL: u32 = 4;

/// Headless GPU renderer producing RGBA8 frames without any window.
pub(crate) struct OffscreenRenderer {
    bundle: DeviceBundle,
    pipeline: SmokePipeline,
    sample_count: u32,
}

impl OffscreenRenderer {
    pub(crate) fn new(power: GpuPowerPreference, antialiasing: Antialiasing) -> Result<Self> {
        let instance = create_instance();
        let bundle = request_device(&instance, None, power)?;
        let sample_count = choose_sample_count(&bundle, OFFSCREEN_FORMAT, antialiasing);
        let pipeline = SmokePipeline::new(&bundle.device, OFFSCREEN_FORMAT, sample_count);
        Ok(Self {
            bundle,
            pipeline,
            sample_count,
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.bundle.profile
    }

    pub(crate) fn render(
        &self,
        width: u32,
        height: u32,
        time: f64,
        ramp: &ColorRamp,
    ) -> Result<Frame> {
        let device = &self.bundle.device;
        let queue = &self.bundle.queue;

        let max_dimension = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "cannot render {width}x{height} offscreen; GPU max texture dimension is {max_dimension}"
            );
        }

        let mut uniforms = SmokeUniforms::new(width, height, ramp);
        uniforms.set_time(time);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen uniform buffer"),
            size: std::mem::size_of::<SmokeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        let bind_group = self.pipeline.create_bind_group(device, &uniform_buffer);

        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen color target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let msaa =
            MultisampleTarget::new(device, OFFSCREEN_FORMAT, width, height, self.sample_count);

        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("offscreen encoder"),
        });
        encode_smoke_pass(&mut encoder, &self.pipeline, &bind_group, &view, msaa.as_ref());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent,
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed waiting for GPU readback: {err}"))?;
        receiver
            .recv()
            .map_err(|_| anyhow!("GPU map callback was dropped"))?
            .context("GPU buffer mapping failed")?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            copy_tight_rows(&mapped, unpadded_bytes_per_row, padded_bytes_per_row, height)?
        };
        readback.unmap();

        Frame::from_rgba(width, height, pixels)
            .ok_or_else(|| anyhow!("readback produced a malformed {width}x{height} frame"))
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Strips the per-row padding wgpu requires for buffer copies.
fn copy_tight_rows(
    mapped: &[u8],
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let required = padded_bytes_per_row as usize * height as usize;
    if mapped.len() < required {
        anyhow::bail!(
            "mapped frame too small: expected at least {required} bytes, got {}",
            mapped.len()
        );
    }
    let row_len = unpadded_bytes_per_row as usize;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in mapped
        .chunks_exact(padded_bytes_per_row as usize)
        .take(height as usize)
    {
        pixels.extend_from_slice(&row[..row_len]);
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_aligned_for_buffer_copies() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(3200, 256), 3328);
    }

    #[test]
    fn padding_is_stripped_from_each_row() {
        // Two rows of one pixel each, padded to eight bytes.
        let mapped = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let pixels = copy_tight_rows(&mapped, 4, 8, 2).unwrap();
        assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn short_mappings_are_rejected() {
        assert!(copy_tight_rows(&[0; 8], 4, 8, 2).is_err());
    }
}
