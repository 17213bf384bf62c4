//! Temporal accumulation: history reprojection through motion vectors,
//! YCoCg neighborhood clamping, confidence-weighted blending.

#[derive(Debug, Clone)]
pub struct TemporalConfig {
    pub enabled: bool,
    /// share of the clamped history in the blend
    pub history_weight: f32,
    /// neighborhood AABB expansion; the reference treats 1.0 and 2.0
    /// differently, so it stays tunable
    pub color_box_scale: f32,
    /// view-space depth delta that rejects history as disoccluded
    pub depth_reject: f32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_weight: 0.9,
            color_box_scale: 1.25,
            depth_reject: 0.1,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TemporalPushConstants {
    pub history_weight: f32,
    pub color_box_scale: f32,
    pub depth_reject: f32,
    /// 1 on the first frame after a cut/recreate: history is invalid
    pub reset: u32,
    pub jitter: [f32; 2],
    pub prev_jitter: [f32; 2],
}

// RGB <-> YCoCg, mirrored in the shader. The clamp box is built in YCoCg
// so chroma outliers reject without darkening luma edges.

pub fn rgb_to_ycocg(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    [
        0.25 * r + 0.5 * g + 0.25 * b,
        0.5 * r - 0.5 * b,
        -0.25 * r + 0.5 * g - 0.25 * b,
    ]
}

pub fn ycocg_to_rgb(ycocg: [f32; 3]) -> [f32; 3] {
    let [y, co, cg] = ycocg;
    [y + co - cg, y + cg, y - co - cg]
}

/// Clamp a history color into the neighborhood box, both in YCoCg.
pub fn clamp_history(history: [f32; 3], aabb_min: [f32; 3], aabb_max: [f32; 3]) -> [f32; 3] {
    [
        history[0].clamp(aabb_min[0], aabb_max[0]),
        history[1].clamp(aabb_min[1], aabb_max[1]),
        history[2].clamp(aabb_min[2], aabb_max[2]),
    ]
}

/// Expand a neighborhood AABB around its center by the box scale.
pub fn scale_aabb(
    aabb_min: [f32; 3],
    aabb_max: [f32; 3],
    scale: f32,
) -> ([f32; 3], [f32; 3]) {
    let mut lo = [0.0f32; 3];
    let mut hi = [0.0f32; 3];
    for i in 0..3 {
        let center = (aabb_min[i] + aabb_max[i]) * 0.5;
        let extent = (aabb_max[i] - aabb_min[i]) * 0.5 * scale;
        lo[i] = center - extent;
        hi[i] = center + extent;
    }
    (lo, hi)
}

pub const TEMPORAL_FRAG_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_current;
layout(set = 0, binding = 1) uniform sampler2D u_history;
layout(set = 0, binding = 2) uniform sampler2D u_motion;
layout(set = 0, binding = 3) uniform sampler2D u_depth;
layout(set = 0, binding = 4) uniform sampler2D u_prevDepth;

layout(push_constant) uniform Push {
    float historyWeight;
    float colorBoxScale;
    float depthReject;
    uint reset;
    vec2 jitter;
    vec2 prevJitter;
} pc;

vec3 rgbToYcocg(vec3 c) {
    return vec3(0.25*c.r + 0.5*c.g + 0.25*c.b,
                0.5*c.r - 0.5*c.b,
                -0.25*c.r + 0.5*c.g - 0.25*c.b);
}

vec3 ycocgToRgb(vec3 c) {
    return vec3(c.x + c.y - c.z, c.x + c.z, c.x - c.y - c.z);
}

void main() {
    vec3 current = texture(u_current, v_uv).rgb;
    vec2 motion = texture(u_motion, v_uv).xy;
    vec2 histUv = v_uv - motion;

    bool offscreen = any(lessThan(histUv, vec2(0.0))) || any(greaterThan(histUv, vec2(1.0)));
    if (pc.reset != 0u || offscreen) {
        o_color = vec4(current, 1.0);
        return;
    }

    // depth disocclusion
    float depth = texture(u_depth, v_uv).r;
    float prevDepth = texture(u_prevDepth, histUv).r;
    if (abs(depth - prevDepth) > pc.depthReject) {
        o_color = vec4(current, 1.0);
        return;
    }

    // 3x3 neighborhood AABB in YCoCg
    vec2 texel = 1.0 / vec2(textureSize(u_current, 0));
    vec3 lo = vec3(1e9);
    vec3 hi = vec3(-1e9);
    for (int x = -1; x <= 1; x++) {
        for (int y = -1; y <= 1; y++) {
            vec3 n = rgbToYcocg(texture(u_current, v_uv + vec2(x, y) * texel).rgb);
            lo = min(lo, n);
            hi = max(hi, n);
        }
    }
    vec3 center = (lo + hi) * 0.5;
    vec3 extent = (hi - lo) * 0.5 * pc.colorBoxScale;
    lo = center - extent;
    hi = center + extent;

    vec3 history = rgbToYcocg(texture(u_history, histUv).rgb);
    vec3 clamped = clamp(history, lo, hi);

    // confidence drops with how much the clamp moved the history
    float confidence = pc.historyWeight * exp(-length(history - clamped) * 4.0);
    vec3 blended = mix(rgbToYcocg(current), clamped, confidence);
    o_color = vec4(ycocgToRgb(blended), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ycocg_roundtrip() {
        for rgb in [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.8, 0.2, 0.1], [0.25, 0.5, 0.75]] {
            let back = ycocg_to_rgb(rgb_to_ycocg(rgb));
            for i in 0..3 {
                assert!((back[i] - rgb[i]).abs() < 1e-6, "{:?} -> {:?}", rgb, back);
            }
        }
    }

    #[test]
    fn test_grey_has_no_chroma() {
        let y = rgb_to_ycocg([0.5, 0.5, 0.5]);
        assert!((y[1]).abs() < 1e-6);
        assert!((y[2]).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_history_inside_box_unchanged() {
        let h = clamp_history([0.5, 0.0, 0.0], [0.0, -0.5, -0.5], [1.0, 0.5, 0.5]);
        assert_eq!(h, [0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_clamp_history_outlier_clamped() {
        let h = clamp_history([2.0, 0.9, -0.9], [0.0, -0.5, -0.5], [1.0, 0.5, 0.5]);
        assert_eq!(h, [1.0, 0.5, -0.5]);
    }

    #[test]
    fn test_scale_aabb_default() {
        let (lo, hi) = scale_aabb([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], 1.25);
        assert!((lo[0] + 0.125).abs() < 1e-6);
        assert!((hi[0] - 1.125).abs() < 1e-6);
    }

    #[test]
    fn test_default_tunables() {
        let c = TemporalConfig::default();
        assert!((c.history_weight - 0.9).abs() < 1e-6);
        assert!((c.color_box_scale - 1.25).abs() < 1e-6);
    }
}
