//! FXAA: luma-based edge detection with a directional blur.

#[derive(Debug, Clone)]
pub struct FxaaConfig {
    /// maximum blur span in texels
    pub span_max: f32,
    pub reduce_mul: f32,
    pub reduce_min: f32,
}

impl Default for FxaaConfig {
    fn default() -> Self {
        Self {
            span_max: 8.0,
            reduce_mul: 1.0 / 8.0,
            reduce_min: 1.0 / 128.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FxaaPushConstants {
    pub span_max: f32,
    pub reduce_mul: f32,
    pub reduce_min: f32,
    pub _pad: f32,
}

/// Rec.601 luma, the edge-detect metric.
pub fn luma(rgb: [f32; 3]) -> f32 {
    rgb[0] * 0.299 + rgb[1] * 0.587 + rgb[2] * 0.114
}

pub const FXAA_FRAG_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_src;

layout(push_constant) uniform Push {
    float spanMax;
    float reduceMul;
    float reduceMin;
} pc;

float luma(vec3 c) { return dot(c, vec3(0.299, 0.587, 0.114)); }

void main() {
    vec2 texel = 1.0 / vec2(textureSize(u_src, 0));

    float lumaNW = luma(texture(u_src, v_uv + vec2(-1.0, -1.0) * texel).rgb);
    float lumaNE = luma(texture(u_src, v_uv + vec2(1.0, -1.0) * texel).rgb);
    float lumaSW = luma(texture(u_src, v_uv + vec2(-1.0, 1.0) * texel).rgb);
    float lumaSE = luma(texture(u_src, v_uv + vec2(1.0, 1.0) * texel).rgb);
    float lumaM = luma(texture(u_src, v_uv).rgb);

    float lumaMin = min(lumaM, min(min(lumaNW, lumaNE), min(lumaSW, lumaSE)));
    float lumaMax = max(lumaM, max(max(lumaNW, lumaNE), max(lumaSW, lumaSE)));

    vec2 dir = vec2(-((lumaNW + lumaNE) - (lumaSW + lumaSE)),
                    ((lumaNW + lumaSW) - (lumaNE + lumaSE)));

    float dirReduce = max((lumaNW + lumaNE + lumaSW + lumaSE) * 0.25 * pc.reduceMul,
                          pc.reduceMin);
    float rcpDirMin = 1.0 / (min(abs(dir.x), abs(dir.y)) + dirReduce);
    dir = clamp(dir * rcpDirMin, vec2(-pc.spanMax), vec2(pc.spanMax)) * texel;

    vec3 rgbA = 0.5 * (texture(u_src, v_uv + dir * (1.0/3.0 - 0.5)).rgb
                     + texture(u_src, v_uv + dir * (2.0/3.0 - 0.5)).rgb);
    vec3 rgbB = rgbA * 0.5 + 0.25 * (texture(u_src, v_uv + dir * -0.5).rgb
                                   + texture(u_src, v_uv + dir * 0.5).rgb);

    float lumaB = luma(rgbB);
    o_color = vec4((lumaB < lumaMin || lumaB > lumaMax) ? rgbA : rgbB, 1.0);
}
"#;
