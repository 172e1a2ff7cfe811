use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{Antialiasing, ColorSpaceMode, ExportBackend, GpuPowerPreference};

#[derive(Parser, Debug)]
#[command(
    name = "emberwall",
    author,
    version,
    about = "Animated fire-smoke wallpaper",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Config file to read instead of the default `emberwall.toml`.
    #[arg(long, global = true, value_name = "FILE", env = "EMBERWALL_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Render in a desktop window instead of wallpaper mode.
    #[arg(long)]
    pub window: bool,

    /// Render a single frozen frame instead of animating.
    #[arg(long)]
    pub still: bool,

    /// Shader time in seconds used by `--still`.
    #[arg(long, value_name = "SECONDS", requires = "still")]
    pub still_time: Option<f64>,

    /// FPS cap (0 = render on every refresh).
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<f32>,

    /// Override the render resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Multiplier applied to the animation clock.
    #[arg(long, value_name = "FACTOR", value_parser = parse_speed)]
    pub speed: Option<f64>,

    /// Anti-aliasing policy: `auto`, `off`, or an MSAA sample count (2/4/8/16).
    #[arg(long, value_name = "MODE", value_parser = parse_antialias)]
    pub antialias: Option<Antialiasing>,

    /// Output color space handling: `auto`, `gamma`, or `linear`.
    #[arg(long, value_name = "MODE", value_parser = parse_color_space)]
    pub color_space: Option<ColorSpaceMode>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "PREFERENCE", value_parser = parse_power)]
    pub power: Option<GpuPowerPreference>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one still frame to a PNG file and exit.
    Export(ExportArgs),
    /// Print the colour of a single pixel using the CPU shading function.
    Sample(SampleArgs),
    /// Inspect or validate the configuration file.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Output path; defaults to a timestamped file in the current directory.
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Shader time in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f64,

    /// Image size; defaults to the configured size or 1920x1080.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Renderer: `cpu` (double-precision reference), `gpu`, or `auto`
    /// (GPU with CPU fallback).
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend, default_value = "cpu")]
    pub backend: ExportBackend,
}

#[derive(Parser, Debug)]
pub struct SampleArgs {
    /// Viewport size the pixel is evaluated in.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "800x600")]
    pub size: (u32, u32),

    /// Fragment coordinate `X,Y` (bottom-left origin); defaults to the centre.
    #[arg(long, value_name = "X,Y", value_parser = parse_pixel)]
    pub pixel: Option<(f64, f64)>,

    /// Shader time in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f64,

    /// Print every intermediate value as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration directory and file.
    Where,
    /// Parse and validate a config file (defaults to the active one).
    Check {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    emberconfig::parse_size(value)
}

pub fn parse_antialias(value: &str) -> Result<Antialiasing, String> {
    let setting = emberconfig::parse_antialias(value)?;
    Ok(crate::run::map_antialias(setting))
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ColorSpaceMode::Auto),
        "gamma" | "srgb-off" => Ok(ColorSpaceMode::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceMode::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected auto, gamma, or linear"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown power preference '{other}'; expected low or high")),
    }
}

pub fn parse_backend(value: &str) -> Result<ExportBackend, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "cpu" => Ok(ExportBackend::Cpu),
        "gpu" => Ok(ExportBackend::Gpu),
        "auto" => Ok(ExportBackend::Auto),
        other => Err(format!("unknown export backend '{other}'; expected cpu, gpu, or auto")),
    }
}

pub fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid FPS '{value}'"))?;
    if !fps.is_finite() || fps < 0.0 {
        return Err("FPS must be zero or positive".into());
    }
    Ok(fps)
}

pub fn parse_speed(value: &str) -> Result<f64, String> {
    let speed: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid speed '{value}'"))?;
    if !speed.is_finite() || speed <= 0.0 {
        return Err("speed must be a positive number".into());
    }
    Ok(speed)
}

pub fn parse_pixel(value: &str) -> Result<(f64, f64), String> {
    let (x, y) = value
        .split_once([',', 'x'])
        .ok_or_else(|| format!("expected X,Y, got '{value}'"))?;
    let x = x
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid x coordinate '{}'", x.trim()))?;
    let y = y
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid y coordinate '{}'", y.trim()))?;
    if !x.is_finite() || !y.is_finite() {
        return Err("pixel coordinates must be finite".into());
    }
    Ok((x, y))
}
