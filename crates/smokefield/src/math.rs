use std::ops::{Add, Div, Mul, Sub};

/// Two-component vector mirroring GLSL `vec2` semantics (component-wise ops).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn floor(self) -> Self {
        Self::new(self.x.floor(), self.y.floor())
    }

    /// Component-wise [`fract`].
    pub fn fract(self) -> Self {
        Self::new(fract(self.x), fract(self.y))
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x * rhs.x, self.y * rhs.y)
    }
}

impl Div for Vec2 {
    type Output = Vec2;

    fn div(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x / rhs.x, self.y / rhs.y)
    }
}

/// Fixed-angle rotation equivalent to GLSL `mat2(c, -s, s, c) * p`.
///
/// GLSL matrices are column-major, so the first column is `(c, -s)` and the
/// product expands to `(c*x + s*y, -s*x + c*y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    sin: f64,
    cos: f64,
}

impl Rotation {
    pub fn new(angle: f64) -> Self {
        Self {
            sin: angle.sin(),
            cos: angle.cos(),
        }
    }

    pub fn apply(self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.cos * p.x + self.sin * p.y,
            -self.sin * p.x + self.cos * p.y,
        )
    }
}

/// Fractional part in `[0, 1)`.
///
/// `x - floor(x)` rounds up to exactly `1.0` for tiny negative inputs; that
/// case wraps to `0.0` so the half-open range holds for every finite input.
pub fn fract(x: f64) -> f64 {
    let f = x - x.floor();
    if f < 1.0 {
        f
    } else {
        0.0
    }
}

/// Linear interpolation with GLSL `mix` semantics (no clamping of `t`).
pub fn mix(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Cubic Hermite easing `3t² - 2t³`.
pub fn hermite(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    hermite(t)
}
