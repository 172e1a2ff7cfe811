//! Still-frame export to PNG.
//!
//! The CPU rasteriser from `smokefield` is the default: it evaluates the field
//! in double precision and writes the same bytes on every host. The GPU path
//! renders offscreen and reads the texture back. It draws the same field, but
//! the shader hash runs in single precision, so its pixels are not
//! byte-identical to the CPU reference.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use smokefield::{rasterize, ColorRamp, Frame};
use tracing::{info, warn};

use crate::gpu::OffscreenRenderer;
use crate::types::{Antialiasing, GpuPowerPreference};

/// Largest width or height accepted for a still export.
pub const MAX_EXPORT_DIMENSION: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum RenderExportError {
    #[error("export size {width}x{height} must be non-zero")]
    EmptySize { width: u32, height: u32 },
    #[error("export size {width}x{height} exceeds the {max}x{max} limit")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("GPU export failed: {0:#}")]
    Gpu(anyhow::Error),
    #[error("failed to create export directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Which rasteriser to use for a still frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportBackend {
    /// Double-precision reference; identical output on every host.
    #[default]
    Cpu,
    /// Offscreen GPU render; fails when no adapter is available.
    Gpu,
    /// GPU when an adapter is available, CPU otherwise.
    Auto,
}

/// Rasteriser that actually produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    Gpu,
    Cpu,
}

impl fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOrigin::Gpu => f.write_str("gpu"),
            FrameOrigin::Cpu => f.write_str("cpu"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StillRequest {
    pub width: u32,
    pub height: u32,
    /// Shader time in seconds.
    pub time: f64,
    pub ramp: ColorRamp,
    pub backend: ExportBackend,
    pub antialiasing: Antialiasing,
    pub power: GpuPowerPreference,
}

impl StillRequest {
    pub fn new(width: u32, height: u32, time: f64) -> Self {
        Self {
            width,
            height,
            time,
            ramp: ColorRamp::EMBER,
            backend: ExportBackend::default(),
            antialiasing: Antialiasing::Off,
            power: GpuPowerPreference::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub origin: FrameOrigin,
}

/// Renders one frame according to `request.backend`.
pub fn render_still(request: &StillRequest) -> Result<(Frame, FrameOrigin), RenderExportError> {
    if request.width == 0 || request.height == 0 {
        return Err(RenderExportError::EmptySize {
            width: request.width,
            height: request.height,
        });
    }
    if request.width > MAX_EXPORT_DIMENSION || request.height > MAX_EXPORT_DIMENSION {
        return Err(RenderExportError::TooLarge {
            width: request.width,
            height: request.height,
            max: MAX_EXPORT_DIMENSION,
        });
    }

    if request.backend == ExportBackend::Cpu {
        return Ok((render_cpu(request), FrameOrigin::Cpu));
    }

    match render_gpu(request) {
        Ok(frame) => Ok((frame, FrameOrigin::Gpu)),
        Err(err) if request.backend == ExportBackend::Auto => {
            let reason = format!("{err:#}");
            warn!(error = %reason, "GPU export unavailable; using CPU rasterizer");
            Ok((render_cpu(request), FrameOrigin::Cpu))
        }
        Err(err) => Err(RenderExportError::Gpu(err)),
    }
}

/// Renders a still frame and writes it to `path` as PNG, creating parent
/// directories as needed.
pub fn export_png(path: &Path, request: &StillRequest) -> Result<ExportReport, RenderExportError> {
    let (frame, origin) = render_still(request)?;
    write_png(path, &frame)?;
    info!(
        path = %path.display(),
        width = frame.width(),
        height = frame.height(),
        time = request.time,
        %origin,
        "exported still frame"
    );
    Ok(ExportReport {
        path: path.to_path_buf(),
        width: frame.width(),
        height: frame.height(),
        origin,
    })
}

pub fn write_png(path: &Path, frame: &Frame) -> Result<(), RenderExportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| RenderExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    image::save_buffer_with_format(
        path,
        frame.as_bytes(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|source| RenderExportError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// `emberwall-YYYYMMDD-HHMMSS.png` inside `directory`.
pub fn default_export_path(directory: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    directory.join(format!("emberwall-{stamp}.png"))
}

fn render_cpu(request: &StillRequest) -> Frame {
    rasterize(request.width, request.height, request.time, &request.ramp)
}

fn render_gpu(request: &StillRequest) -> anyhow::Result<Frame> {
    let renderer = OffscreenRenderer::new(request.power, request.antialiasing)?;
    tracing::debug!(adapter = %renderer.adapter_profile().name, "rendering still frame on GPU");
    renderer.render(request.width, request.height, request.time, &request.ramp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cpu_request(width: u32, height: u32, time: f64) -> StillRequest {
        StillRequest {
            backend: ExportBackend::Cpu,
            ..StillRequest::new(width, height, time)
        }
    }

    #[test]
    fn default_backend_is_the_cpu_reference() {
        let request = StillRequest::new(32, 18, 100.0);
        assert_eq!(request.backend, ExportBackend::Cpu);

        let (frame, origin) = render_still(&request).unwrap();
        assert_eq!(origin, FrameOrigin::Cpu);
        let expected = rasterize(32, 18, 100.0, &ColorRamp::EMBER);
        assert_eq!(frame.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn oversized_exports_are_rejected_before_allocating() {
        for backend in [ExportBackend::Cpu, ExportBackend::Auto, ExportBackend::Gpu] {
            let request = StillRequest {
                backend,
                ..StillRequest::new(70_000, 70_000, 0.0)
            };
            let err = render_still(&request).unwrap_err();
            assert!(matches!(
                err,
                RenderExportError::TooLarge {
                    width: 70_000,
                    height: 70_000,
                    max: MAX_EXPORT_DIMENSION
                }
            ));
        }
        let wide = cpu_request(MAX_EXPORT_DIMENSION + 1, 1, 0.0);
        assert!(matches!(
            render_still(&wide),
            Err(RenderExportError::TooLarge { .. })
        ));
    }

    #[test]
    fn cpu_export_writes_decodable_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("still.png");
        let request = cpu_request(64, 36, 4.0);

        let report = export_png(&path, &request).unwrap();
        assert_eq!(report.origin, FrameOrigin::Cpu);
        assert_eq!((report.width, report.height), (64, 36));

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (64, 36));
        let expected = rasterize(64, 36, 4.0, &ColorRamp::EMBER);
        assert_eq!(decoded.as_raw().as_slice(), expected.as_bytes());
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = render_still(&cpu_request(0, 10, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            RenderExportError::EmptySize {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn default_path_is_timestamped_png() {
        let path = default_export_path(Path::new("/tmp/shots"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("emberwall-"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "emberwall-20250101-120000.png".len());
        assert_eq!(path.parent(), Some(Path::new("/tmp/shots")));
    }
}
