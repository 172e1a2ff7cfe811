//! TOML configuration for emberwall.
//!
//! Every section is optional; missing keys fall back to the built-in look
//! (burnt red into orange, real-time drift, uncapped FPS). Command-line flags
//! override whatever the file resolves to.
//!
//! ```toml
//! version = 1
//!
//! [palette]
//! start = "#d91a0d"
//! end = [1.0, 0.5, 0.0]
//!
//! [animation]
//! speed = 0.5
//! time_offset = "90s"
//! fps = 30
//!
//! [render]
//! antialias = "off"
//! size = "2560x1440"
//! color_space = "gamma"
//! power = "low"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use smokefield::{ColorRamp, Rgb};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmberConfig {
    pub version: u32,
    #[serde(default)]
    pub palette: PaletteSection,
    #[serde(default)]
    pub animation: AnimationSection,
    #[serde(default)]
    pub render: RenderSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PaletteSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<ColorSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<ColorSetting>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnimationSection {
    /// Multiplier applied to wall-clock time before it reaches the shader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_offset: Option<Duration>,
    /// Frame cap; `0` means render on every display refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(
        default,
        deserialize_with = "deserialize_antialias_opt",
        serialize_with = "serialize_antialias_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub antialias: Option<AntialiasSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_space: Option<ColorSpaceSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerSetting>,
}

/// A colour written either as a hex string or as three floats in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ColorSetting {
    Hex(String),
    Channels([f64; 3]),
}

impl ColorSetting {
    pub fn resolve(&self) -> Result<Rgb, smokefield::PaletteError> {
        match self {
            ColorSetting::Hex(raw) => raw.parse(),
            ColorSetting::Channels(channels) => Rgb::from_channels(*channels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntialiasSetting {
    Auto,
    Off,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
}

impl AntialiasSetting {
    /// Explicit MSAA sample count, `None` for `Auto`.
    pub fn sample_count(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Off => Some(1),
            Self::Samples2 => Some(2),
            Self::Samples4 => Some(4),
            Self::Samples8 => Some(8),
            Self::Samples16 => Some(16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpaceSetting {
    Auto,
    Gamma,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

impl Default for EmberConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            palette: PaletteSection::default(),
            animation: AnimationSection::default(),
            render: RenderSection::default(),
        }
    }
}

impl EmberConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: EmberConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` when it exists, otherwise returns the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Colour ramp with unset endpoints taken from [`ColorRamp::EMBER`].
    ///
    /// Only meaningful on a validated config; an unparsable colour falls back
    /// to the default endpoint.
    pub fn ramp(&self) -> ColorRamp {
        let fallback = ColorRamp::EMBER;
        let resolve = |setting: &Option<ColorSetting>, default: Rgb| {
            setting
                .as_ref()
                .and_then(|value| value.resolve().ok())
                .unwrap_or(default)
        };
        ColorRamp::new(
            resolve(&self.palette.start, fallback.start),
            resolve(&self.palette.end, fallback.end),
        )
    }

    pub fn speed(&self) -> f64 {
        self.animation.speed.unwrap_or(1.0)
    }

    pub fn time_offset(&self) -> Duration {
        self.animation.time_offset.unwrap_or(Duration::ZERO)
    }

    /// Frame cap with `0` normalised to "uncapped".
    pub fn fps(&self) -> Option<f32> {
        self.animation.fps.filter(|fps| *fps > 0.0)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.render
            .size
            .as_deref()
            .and_then(|raw| parse_size(raw).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        for (name, setting) in [
            ("palette.start", &self.palette.start),
            ("palette.end", &self.palette.end),
        ] {
            if let Some(setting) = setting {
                setting
                    .resolve()
                    .map_err(|err| ConfigError::Invalid(format!("{name}: {err}")))?;
            }
        }

        if let Some(speed) = self.animation.speed {
            if !speed.is_finite() || speed <= 0.0 {
                return Err(ConfigError::Invalid(
                    "animation.speed must be a positive number".into(),
                ));
            }
        }

        if let Some(fps) = self.animation.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("animation.fps must be >= 0".into()));
            }
        }

        if let Some(size) = &self.render.size {
            parse_size(size)
                .map_err(|err| ConfigError::Invalid(format!("render.size: {err}")))?;
        }

        Ok(())
    }
}

/// Parses `WIDTHxHEIGHT` (either `x` or `X`) into non-zero pixel dimensions.
pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_antialias(raw: &str) -> Result<AntialiasSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(AntialiasSetting::Auto),
        "off" | "none" | "disable" | "disabled" | "0" | "1" => Ok(AntialiasSetting::Off),
        "2" => Ok(AntialiasSetting::Samples2),
        "4" => Ok(AntialiasSetting::Samples4),
        "8" => Ok(AntialiasSetting::Samples8),
        "16" => Ok(AntialiasSetting::Samples16),
        other => Err(format!(
            "invalid antialias setting '{other}'; use auto/off or 2/4/8/16"
        )),
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration_opt<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => {
            serializer.serialize_str(&humantime::format_duration(*duration).to_string())
        }
        None => serializer.serialize_none(),
    }
}

fn serialize_antialias_opt<S>(
    value: &Option<AntialiasSetting>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.map(AntialiasSetting::sample_count) {
        Some(None) => serializer.serialize_str("auto"),
        Some(Some(1)) => serializer.serialize_str("off"),
        Some(Some(samples)) => serializer.serialize_str(&samples.to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_antialias_opt<'de, D>(deserializer: D) -> Result<Option<AntialiasSetting>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let result = match helper {
        None => None,
        Some(Helper::Str(raw)) => Some(parse_antialias(&raw).map_err(de::Error::custom)?),
        Some(Helper::Num(value)) => {
            if value < 0 {
                return Err(de::Error::custom("antialias value must be non-negative"));
            }
            Some(parse_antialias(&value.to_string()).map_err(de::Error::custom)?)
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[palette]
start = "#d91a0d"
end = [1.0, 0.5, 0.0]

[animation]
speed = 0.5
time_offset = "90s"
fps = 30

[render]
antialias = 4
size = "2560x1440"
color_space = "linear"
power = "low"
"##;

    #[test]
    fn parses_sample_config() {
        let config = EmberConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.speed(), 0.5);
        assert_eq!(config.time_offset(), Duration::from_secs(90));
        assert_eq!(config.fps(), Some(30.0));
        assert_eq!(config.size(), Some((2560, 1440)));
        assert_eq!(config.render.antialias, Some(AntialiasSetting::Samples4));
        assert_eq!(config.render.color_space, Some(ColorSpaceSetting::Linear));
        assert_eq!(config.render.power, Some(PowerSetting::Low));

        let ramp = config.ramp();
        assert_eq!(ramp.start.to_string(), "#d91a0d");
        assert_eq!(ramp.end, Rgb::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn empty_file_uses_builtin_look() {
        let config = EmberConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.ramp(), ColorRamp::EMBER);
        assert_eq!(config.speed(), 1.0);
        assert_eq!(config.time_offset(), Duration::ZERO);
        assert_eq!(config.fps(), None);
        assert_eq!(config.size(), None);
    }

    #[test]
    fn zero_fps_means_uncapped() {
        let config = EmberConfig::from_toml_str("version = 1\n[animation]\nfps = 0\n").unwrap();
        assert_eq!(config.fps(), None);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = EmberConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_colours() {
        let hex = EmberConfig::from_toml_str("version = 1\n[palette]\nstart = \"#12\"\n");
        assert!(matches!(hex, Err(ConfigError::Invalid(msg)) if msg.contains("palette.start")));

        let channels = EmberConfig::from_toml_str("version = 1\n[palette]\nend = [0.0, 2.0, 0.0]\n");
        assert!(matches!(channels, Err(ConfigError::Invalid(msg)) if msg.contains("palette.end")));
    }

    #[test]
    fn rejects_non_positive_speed_and_negative_fps() {
        let speed = EmberConfig::from_toml_str("version = 1\n[animation]\nspeed = 0\n");
        assert!(matches!(speed, Err(ConfigError::Invalid(_))));
        let fps = EmberConfig::from_toml_str("version = 1\n[animation]\nfps = -1\n");
        assert!(matches!(fps, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_size_and_antialias() {
        let size = EmberConfig::from_toml_str("version = 1\n[render]\nsize = \"0x600\"\n");
        assert!(matches!(size, Err(ConfigError::Invalid(_))));
        let aa = EmberConfig::from_toml_str("version = 1\n[render]\nantialias = 3\n");
        assert!(matches!(aa, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn serialises_durations_in_human_form() {
        let config = EmberConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("time_offset = \"1m 30s\""));
        let reparsed = EmberConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn load_or_default_handles_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("emberwall.toml");
        assert_eq!(EmberConfig::load_or_default(&missing).unwrap(), EmberConfig::default());

        std::fs::write(&missing, "version = 1\n[animation]\nspeed = 2.0\n").unwrap();
        assert_eq!(EmberConfig::load(&missing).unwrap().speed(), 2.0);
    }

    #[test]
    fn parse_size_accepts_both_separators() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size(" 1920X1080 "), Ok((1920, 1080)));
        assert!(parse_size("1920").is_err());
    }
}
