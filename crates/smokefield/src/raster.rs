use std::num::NonZeroUsize;
use std::thread;

use crate::math::Vec2;
use crate::palette::ColorRamp;
use crate::shade::{shade, Resolution};

const BYTES_PER_PIXEL: usize = 4;
/// Rows below this count are shaded on the calling thread.
const MIN_ROWS_PER_BAND: usize = 16;

/// Tightly packed RGBA8 image, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wraps tightly packed RGBA8 rows; `None` when the length does not match.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        (width > 0 && height > 0 && pixels.len() == expected).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA of the pixel at column `x`, row `y` (row 0 is the top edge).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut rgba = [0u8; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
        Some(rgba)
    }
}

/// Fragment coordinate (bottom-left origin, pixel centre) for an image pixel.
pub fn frag_coord_for_pixel(x: u32, row: u32, height: u32) -> Vec2 {
    Vec2::new(f64::from(x) + 0.5, f64::from(height) - f64::from(row) - 0.5)
}

/// Shades every pixel of a `width` x `height` frame on the CPU.
///
/// Rows are split into contiguous bands and shaded on scoped threads. Pixels
/// never read each other, so banding does not change the output.
pub fn rasterize(width: u32, height: u32, time: f64, ramp: &ColorRamp) -> Frame {
    let width = width.max(1);
    let height = height.max(1);
    let resolution = Resolution::new(width, height);
    let stride = width as usize * BYTES_PER_PIXEL;
    let mut pixels = vec![0u8; stride * height as usize];

    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let rows_per_band = (height as usize)
        .div_ceil(workers)
        .max(MIN_ROWS_PER_BAND);

    let shade_band = |first_row: usize, band: &mut [u8]| {
        for (offset, row) in band.chunks_exact_mut(stride).enumerate() {
            let y = (first_row + offset) as u32;
            for (x, texel) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let frag = frag_coord_for_pixel(x as u32, y, height);
                texel.copy_from_slice(&shade(frag, resolution, time, ramp).to_rgba8());
            }
        }
    };

    if rows_per_band >= height as usize {
        shade_band(0, &mut pixels);
    } else {
        thread::scope(|scope| {
            for (index, band) in pixels.chunks_mut(stride * rows_per_band).enumerate() {
                let shade_band = &shade_band;
                scope.spawn(move || shade_band(index * rows_per_band, band));
            }
        });
    }

    Frame {
        width,
        height,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_per_pixel_shading() {
        let ramp = ColorRamp::EMBER;
        let frame = rasterize(96, 64, 1.5, &ramp);
        let resolution = Resolution::new(96, 64);
        for (x, y) in [(0, 0), (95, 63), (48, 17), (3, 60)] {
            let expected = shade(frag_coord_for_pixel(x, y, 64), resolution, 1.5, &ramp).to_rgba8();
            assert_eq!(frame.pixel(x, y), Some(expected));
        }
    }

    #[test]
    fn banded_and_single_threaded_output_agree() {
        let ramp = ColorRamp::EMBER;
        let tall = rasterize(8, 200, 0.0, &ramp);
        let resolution = Resolution::new(8, 200);
        for y in [0, 15, 16, 99, 199] {
            let expected = shade(frag_coord_for_pixel(5, y, 200), resolution, 0.0, &ramp).to_rgba8();
            assert_eq!(tall.pixel(5, y), Some(expected));
        }
    }

    #[test]
    fn frames_are_opaque_and_deterministic() {
        let first = rasterize(32, 18, 0.0, &ColorRamp::EMBER);
        let second = rasterize(32, 18, 0.0, &ColorRamp::EMBER);
        assert_eq!(first, second);
        assert!(first.as_bytes().chunks_exact(4).all(|texel| texel[3] == 255));
    }

    #[test]
    fn from_rgba_checks_buffer_length() {
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(Frame::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(Frame::from_rgba(0, 2, Vec::new()).is_none());
    }

    #[test]
    fn bottom_row_maps_to_low_frag_y() {
        let frag = frag_coord_for_pixel(0, 9, 10);
        assert_eq!(frag, Vec2::new(0.5, 0.5));
        assert!(rasterize(4, 4, 0.0, &ColorRamp::EMBER).pixel(4, 0).is_none());
    }
}
