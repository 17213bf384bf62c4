//! Bloom: threshold extract, a four-level half-resolution blur chain,
//! additive composite.

#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// `r_bloom_threshold`: luma above this bleeds
    pub threshold: f32,
    /// `r_bloom_intensity`: composite scale
    pub intensity: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            intensity: 0.3,
        }
    }
}

/// Number of successively half-sized blur levels.
pub const BLOOM_MIP_LEVELS: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BloomPushConstants {
    pub threshold: f32,
    pub intensity: f32,
    /// 1 = horizontal blur pass, 0 = vertical
    pub horizontal: u32,
    pub _pad: u32,
}

/// The chain's render-target sizes for a given frame size, each level
/// half the previous, clamped at 1.
pub fn mip_chain_sizes(width: u32, height: u32) -> [(u32, u32); BLOOM_MIP_LEVELS] {
    let mut sizes = [(0u32, 0u32); BLOOM_MIP_LEVELS];
    let mut w = width.max(1);
    let mut h = height.max(1);
    for size in &mut sizes {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        *size = (w, h);
    }
    sizes
}

/// 9-tap Gaussian weights used by the separable blur.
pub const GAUSS_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

/// Brightness extract: `b = color * max(0, luma - threshold)`.
pub const BLOOM_EXTRACT_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_scene;

layout(push_constant) uniform Push {
    float threshold;
    float intensity;
    uint horizontal;
} pc;

void main() {
    vec3 color = texture(u_scene, v_uv).rgb;
    float luma = dot(color, vec3(0.2126, 0.7152, 0.0722));
    o_color = vec4(color * max(0.0, luma - pc.threshold), 1.0);
}
"#;

/// One direction of the separable 9-tap Gaussian.
pub const BLOOM_BLUR_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_src;

layout(push_constant) uniform Push {
    float threshold;
    float intensity;
    uint horizontal;
} pc;

const float weight[5] = float[](0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

void main() {
    vec2 texel = 1.0 / vec2(textureSize(u_src, 0));
    vec2 dir = pc.horizontal != 0u ? vec2(texel.x, 0.0) : vec2(0.0, texel.y);

    vec3 result = texture(u_src, v_uv).rgb * weight[0];
    for (int i = 1; i < 5; i++) {
        result += texture(u_src, v_uv + dir * float(i)).rgb * weight[i];
        result += texture(u_src, v_uv - dir * float(i)).rgb * weight[i];
    }
    o_color = vec4(result, 1.0);
}
"#;

/// Additive composite of the blurred chain over the scene.
pub const BLOOM_COMPOSITE_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_scene;
layout(set = 0, binding = 1) uniform sampler2D u_bloom0;
layout(set = 0, binding = 2) uniform sampler2D u_bloom1;
layout(set = 0, binding = 3) uniform sampler2D u_bloom2;
layout(set = 0, binding = 4) uniform sampler2D u_bloom3;

layout(push_constant) uniform Push {
    float threshold;
    float intensity;
    uint horizontal;
} pc;

void main() {
    vec3 scene = texture(u_scene, v_uv).rgb;
    vec3 bloom = texture(u_bloom0, v_uv).rgb
               + texture(u_bloom1, v_uv).rgb
               + texture(u_bloom2, v_uv).rgb
               + texture(u_bloom3, v_uv).rgb;
    o_color = vec4(scene + bloom * pc.intensity, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_sizes_halve() {
        let sizes = mip_chain_sizes(1920, 1080);
        assert_eq!(sizes[0], (960, 540));
        assert_eq!(sizes[1], (480, 270));
        assert_eq!(sizes[2], (240, 135));
        assert_eq!(sizes[3], (120, 67));
    }

    #[test]
    fn test_mip_sizes_clamp_at_one() {
        let sizes = mip_chain_sizes(4, 4);
        assert_eq!(sizes[BLOOM_MIP_LEVELS - 1], (1, 1));
    }

    #[test]
    fn test_gauss_weights_normalized() {
        // center + 2 * sides integrates to ~1
        let total: f32 = GAUSS_WEIGHTS[0] + 2.0 * GAUSS_WEIGHTS[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-3, "weights sum to {}", total);
    }
}
