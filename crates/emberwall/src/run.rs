use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use emberconfig::{AntialiasSetting, ColorSpaceSetting, EmberConfig, PowerSetting};
use renderer::{
    default_export_path, export_png, Antialiasing, ColorSpaceMode, GpuPowerPreference,
    RenderMode, RenderPolicy, Renderer, RendererConfig, StillRequest,
};
use serde_json::json;
use smokefield::{Resolution, Vec2};
use tracing_subscriber::EnvFilter;

use crate::cli::{ExportArgs, RunArgs, SampleArgs};
use crate::paths::AppPaths;

const FALLBACK_SURFACE: (u32, u32) = (1920, 1080);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file actually in effect: the `--config` override or the default
/// location under the config directory.
pub fn active_config_path(config_override: Option<&Path>) -> Result<PathBuf> {
    match config_override {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(AppPaths::discover()?.config_file()),
    }
}

/// An explicit `--config` must exist; the default location falls back to
/// built-in defaults when absent.
pub fn load_config(config_override: Option<&Path>) -> Result<EmberConfig> {
    let config = match config_override {
        Some(path) => EmberConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let path = active_config_path(None)?;
            let config = EmberConfig::load_or_default(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "resolved emberwall config");
            config
        }
    };
    Ok(config)
}

pub fn run(args: RunArgs, config_override: Option<&Path>) -> Result<()> {
    let config = load_config(config_override)?;
    let renderer_config = renderer_config(&args, &config);
    tracing::info!(
        mode = ?renderer_config.mode,
        policy = ?renderer_config.policy,
        "starting emberwall"
    );
    let mut renderer = Renderer::new(renderer_config);
    renderer.run()
}

/// Merges CLI flags over the config file; flags win.
pub fn renderer_config(args: &RunArgs, config: &EmberConfig) -> RendererConfig {
    let requested_size = args.size.or_else(|| config.size());
    let target_fps = match args.fps {
        Some(fps) if fps > 0.0 => Some(fps),
        Some(_) => None,
        None => config.fps(),
    };
    let policy = if args.still {
        RenderPolicy::Still {
            time: args.still_time.unwrap_or(0.0),
        }
    } else {
        RenderPolicy::Animate { target_fps }
    };

    RendererConfig {
        surface_size: requested_size.unwrap_or(FALLBACK_SURFACE),
        mode: if args.window {
            RenderMode::Windowed
        } else {
            RenderMode::Wallpaper
        },
        requested_size,
        ramp: config.ramp(),
        antialiasing: args
            .antialias
            .or_else(|| config.render.antialias.map(map_antialias))
            .unwrap_or_default(),
        color_space: args
            .color_space
            .or_else(|| config.render.color_space.map(map_color_space))
            .unwrap_or_default(),
        power: args
            .power
            .or_else(|| config.render.power.map(map_power))
            .unwrap_or_default(),
        policy,
        time_scale: args.speed.unwrap_or_else(|| config.speed()),
        time_offset: config.time_offset(),
    }
}

pub fn export(args: ExportArgs, config_override: Option<&Path>) -> Result<()> {
    let config = load_config(config_override)?;
    let (width, height) = args
        .size
        .or_else(|| config.size())
        .unwrap_or(FALLBACK_SURFACE);
    let path = match args.path {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            default_export_path(&cwd)
        }
    };
    let request = StillRequest {
        ramp: config.ramp(),
        backend: args.backend,
        power: config.render.power.map(map_power).unwrap_or_default(),
        ..StillRequest::new(width, height, args.time)
    };

    let report = export_png(&path, &request)
        .with_context(|| format!("failed to export still frame to {}", path.display()))?;
    println!(
        "Wrote {}x{} frame ({}) to {}",
        report.width,
        report.height,
        report.origin,
        report.path.display()
    );
    Ok(())
}

pub fn sample(args: SampleArgs, config_override: Option<&Path>) -> Result<()> {
    let config = load_config(config_override)?;
    let (width, height) = args.size;
    let (x, y) = args
        .pixel
        .unwrap_or((f64::from(width) / 2.0, f64::from(height) / 2.0));
    let sample = smokefield::sample(
        Vec2::new(x, y),
        Resolution::new(width, height),
        args.time,
        &config.ramp(),
    );
    let color = sample.color;

    if args.json {
        let report = json!({
            "size": [width, height],
            "pixel": [x, y],
            "time": args.time,
            "uv": [sample.uv.x, sample.uv.y],
            "near": sample.near,
            "far": sample.far,
            "density": sample.density,
            "mix_factor": sample.mix_factor,
            "opacity": sample.opacity,
            "color": {
                "r": color.r,
                "g": color.g,
                "b": color.b,
                "hex": color.to_string(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("rgb({:.6}, {:.6}, {:.6}) {color}", color.r, color.g, color.b);
    }
    Ok(())
}

pub(crate) fn map_antialias(setting: AntialiasSetting) -> Antialiasing {
    match setting.sample_count() {
        None => Antialiasing::Auto,
        Some(1) => Antialiasing::Off,
        Some(samples) => Antialiasing::Samples(samples),
    }
}

fn map_color_space(setting: ColorSpaceSetting) -> ColorSpaceMode {
    match setting {
        ColorSpaceSetting::Auto => ColorSpaceMode::Auto,
        ColorSpaceSetting::Gamma => ColorSpaceMode::Gamma,
        ColorSpaceSetting::Linear => ColorSpaceMode::Linear,
    }
}

fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}
