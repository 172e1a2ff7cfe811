//! GLSL for the smoke pass.
//!
//! The fragment shader is assembled at start-up: a `#define` prelude carrying
//! the numeric constants from `smokefield`, followed by a fixed body that
//! mirrors `smokefield::shade` step for step. Keeping the numbers in one place
//! keeps the two programs structurally identical. The shader runs in single
//! precision, so the sine hash lands on different lattice values than the
//! double-precision reference and pixels differ, while the look does not.

use std::borrow::Cow;
use std::fmt::Write as _;

use smokefield::noise::{GAIN, HASH_SCALE, HASH_WEIGHTS, LACUNARITY, OCTAVES, OCTAVE_ROTATION};
use smokefield::shade::{
    DRIFT_SPEED, EDGE_NOISE_BIAS, EDGE_NOISE_GAIN, FAR_SCALE, GLOW, LAYER_WEIGHT, MASK_HIGH,
    MASK_LOW, NEAR_SCALE,
};
use wgpu::naga::ShaderStage;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Compiles the smoke fragment shader through wgpu's GLSL frontend.
pub(crate) fn compile_fragment_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    let source = fragment_source();
    tracing::trace!(bytes = source.len(), "compiling smoke fragment shader");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("smoke fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Full fragment shader source: header, constant prelude, body.
pub fn fragment_source() -> String {
    let mut source = String::with_capacity(HEADER.len() + BODY.len() + 1024);
    source.push_str(HEADER);
    for (name, value) in shader_constants() {
        let _ = writeln!(source, "#define {name} {value}");
    }
    source.push_str(BODY);
    source
}

/// `(macro name, GLSL literal)` pairs injected ahead of the body.
pub fn shader_constants() -> Vec<(&'static str, String)> {
    vec![
        ("HASH_WEIGHTS", vec2_literal(HASH_WEIGHTS.x, HASH_WEIGHTS.y)),
        ("HASH_SCALE", float_literal(HASH_SCALE)),
        ("OCTAVES", OCTAVES.to_string()),
        ("OCTAVE_ROTATION", float_literal(OCTAVE_ROTATION)),
        ("LACUNARITY", float_literal(LACUNARITY)),
        ("GAIN", float_literal(GAIN)),
        ("DRIFT_SPEED", float_literal(DRIFT_SPEED)),
        ("NEAR_SCALE", float_literal(NEAR_SCALE)),
        ("FAR_SCALE", float_literal(FAR_SCALE)),
        ("LAYER_WEIGHT", float_literal(LAYER_WEIGHT)),
        ("EDGE_NOISE_GAIN", float_literal(EDGE_NOISE_GAIN)),
        ("EDGE_NOISE_BIAS", float_literal(EDGE_NOISE_BIAS)),
        ("MASK_LOW", float_literal(MASK_LOW)),
        ("MASK_HIGH", float_literal(MASK_HIGH)),
        ("GLOW", float_literal(GLOW)),
    ]
}

/// Formats a float so GLSL always parses it as a float literal.
fn float_literal(value: f64) -> String {
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn vec2_literal(x: f64, y: f64) -> String {
    format!("vec2({}, {})", float_literal(x), float_literal(y))
}

/// Uniform block mirrored by `SmokeUniforms` on the CPU side; std140 layout.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform SmokeParams {
    vec4 resolution_time;
    vec4 color_start;
    vec4 color_end;
} params;

";

const BODY: &str = r"
float hash21(vec2 p) {
    return fract(sin(dot(p, HASH_WEIGHTS)) * HASH_SCALE);
}

float value_noise(vec2 p) {
    vec2 cell = floor(p);
    vec2 f = fract(p);
    vec2 u = f * f * (3.0 - 2.0 * f);

    float a = hash21(cell);
    float b = hash21(cell + vec2(1.0, 0.0));
    float c = hash21(cell + vec2(0.0, 1.0));
    float d = hash21(cell + vec2(1.0, 1.0));

    return mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
}

float fbm(vec2 p) {
    float s = sin(OCTAVE_ROTATION);
    float c = cos(OCTAVE_ROTATION);
    mat2 rotation = mat2(c, -s, s, c);
    float value = 0.0;
    float amplitude = GAIN;
    for (int octave = 0; octave < OCTAVES; octave++) {
        value += amplitude * value_noise(p);
        p = rotation * p * LACUNARITY;
        amplitude *= GAIN;
    }
    return value;
}

void main() {
    vec2 resolution = max(params.resolution_time.xy, vec2(1.0));
    float time = params.resolution_time.z;

    // wgpu rasterises with a top-left origin; flip into bottom-left.
    vec2 fragCoord = vec2(gl_FragCoord.x, resolution.y - gl_FragCoord.y);
    vec2 uv = fragCoord / resolution;
    vec2 pos = vec2(uv.x * (resolution.x / resolution.y), uv.y);

    float movement = time * DRIFT_SPEED;
    float nearLayer = fbm(pos * NEAR_SCALE + vec2(0.0, -movement));
    float farLayer = fbm(pos * FAR_SCALE + vec2(movement, 0.0));
    float density = nearLayer * LAYER_WEIGHT + farLayer * LAYER_WEIGHT;

    float mixFactor = clamp(uv.x + (nearLayer * EDGE_NOISE_GAIN - EDGE_NOISE_BIAS), 0.0, 1.0);
    vec3 color = mix(params.color_start.rgb, params.color_end.rgb, mixFactor);
    color *= smoothstep(MASK_LOW, MASK_HIGH, density) * GLOW;

    outColor = vec4(color, 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
