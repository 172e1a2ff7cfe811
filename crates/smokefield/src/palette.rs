use std::fmt;
use std::str::FromStr;

use crate::math::mix;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("colour '{0}' must be six hex digits (e.g. #d91a0d)")]
    Length(String),
    #[error("colour '{0}' contains non-hex characters")]
    Digits(String),
    #[error("colour channel {channel} = {value} is outside [0, 1]")]
    Channel { channel: usize, value: String },
}

/// Linear RGB triple with channels nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Builds a colour from float channels, rejecting values outside `[0, 1]`.
    pub fn from_channels(channels: [f64; 3]) -> Result<Self, PaletteError> {
        for (channel, value) in channels.iter().enumerate() {
            if !(0.0..=1.0).contains(value) {
                return Err(PaletteError::Channel {
                    channel,
                    value: value.to_string(),
                });
            }
        }
        Ok(Self::new(channels[0], channels[1], channels[2]))
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    /// Channel-wise `mix`; `t` is used as given.
    pub fn lerp(self, other: Rgb, t: f64) -> Self {
        Self::new(
            mix(self.r, other.r, t),
            mix(self.g, other.g, t),
            mix(self.b, other.b, t),
        )
    }

    /// Opaque RGBA for GPU uniform upload.
    pub fn to_rgba_f32(self) -> [f32; 4] {
        [self.r as f32, self.g as f32, self.b as f32, 1.0]
    }

    /// Opaque RGBA8; overbright channels saturate at 255.
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantise = |value: f64| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantise(self.r), quantise(self.g), quantise(self.b), 255]
    }
}

impl FromStr for Rgb {
    type Err = PaletteError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 {
            return Err(PaletteError::Length(value.to_string()));
        }
        if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(PaletteError::Digits(value.to_string()));
        }

        let mut channels = [0.0; 3];
        for (index, channel) in channels.iter_mut().enumerate() {
            let byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
                .map_err(|_| PaletteError::Digits(value.to_string()))?;
            *channel = f64::from(byte) / 255.0;
        }
        Ok(Self::new(channels[0], channels[1], channels[2]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, _] = self.to_rgba8();
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// Two-colour gradient the smoke is tinted with, left (`start`) to right (`end`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRamp {
    pub start: Rgb,
    pub end: Rgb,
}

impl ColorRamp {
    /// Deep burnt red into fiery orange.
    pub const EMBER: ColorRamp = ColorRamp {
        start: Rgb::new(0.85, 0.1, 0.05),
        end: Rgb::new(1.0, 0.5, 0.0),
    };

    pub const fn new(start: Rgb, end: Rgb) -> Self {
        Self { start, end }
    }

    /// Interpolates the ramp; the factor is clamped into `[0, 1]` first so the
    /// result never extrapolates past either endpoint hue.
    pub fn sample(&self, mix_factor: f64) -> Rgb {
        self.start.lerp(self.end, mix_factor.clamp(0.0, 1.0))
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::EMBER
    }
}
