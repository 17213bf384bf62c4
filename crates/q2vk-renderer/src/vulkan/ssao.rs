//! Screen-space ambient occlusion.
//!
//! Hemisphere sampling with a per-pixel random rotation from a small
//! tiled noise texture, range-checked falloff, then a 5x5 box blur.

use rand::Rng;

/// Hemisphere kernel size.
pub const SSAO_KERNEL_SIZE: usize = 64;
/// Noise texture dimension (tiled across the screen).
pub const SSAO_NOISE_DIM: usize = 4;

#[derive(Debug, Clone)]
pub struct SsaoConfig {
    /// `r_ssao_intensity`
    pub intensity: f32,
    /// `r_ssao_radius`, view-space units
    pub radius: f32,
    /// depth bias against self-occlusion
    pub bias: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            radius: 0.5,
            bias: 0.025,
        }
    }
}

/// Push constants for the SSAO pass.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SsaoPushConstants {
    pub proj: [[f32; 4]; 4],
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
    pub noise_scale: [f32; 2],
    pub _pad: [f32; 3],
}

/// Sample points in the +Z hemisphere, biased toward the center so close
/// occluders weigh more.
pub fn build_kernel<R: Rng>(rng: &mut R) -> Vec<[f32; 4]> {
    let mut kernel = Vec::with_capacity(SSAO_KERNEL_SIZE);
    for i in 0..SSAO_KERNEL_SIZE {
        let mut sample = [
            rng.gen_range(-1.0f32..1.0),
            rng.gen_range(-1.0f32..1.0),
            rng.gen_range(0.0f32..1.0),
        ];
        let len = (sample[0] * sample[0] + sample[1] * sample[1] + sample[2] * sample[2]).sqrt();
        if len > 0.0 {
            for c in &mut sample {
                *c /= len;
            }
        } else {
            sample = [0.0, 0.0, 1.0];
        }

        // scale samples toward the origin
        let mut scale = i as f32 / SSAO_KERNEL_SIZE as f32;
        scale = 0.1 + scale * scale * 0.9;
        kernel.push([sample[0] * scale, sample[1] * scale, sample[2] * scale, 0.0]);
    }
    kernel
}

/// Random XY rotation vectors, uploaded as an RGBA16F-style texture
/// (stored here as f32 quads).
pub fn build_noise<R: Rng>(rng: &mut R) -> Vec<[f32; 4]> {
    (0..SSAO_NOISE_DIM * SSAO_NOISE_DIM)
        .map(|_| {
            [
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                0.0,
                0.0,
            ]
        })
        .collect()
}

/// Main SSAO fragment shader: view normal from depth derivatives, 64-tap
/// hemisphere, smooth range check.
pub const SSAO_FRAG_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out float o_ao;

layout(set = 0, binding = 0) uniform sampler2D u_depth;
layout(set = 0, binding = 1) uniform sampler2D u_noise;
layout(set = 0, binding = 2) uniform Kernel { vec4 samples[64]; } u_kernel;

layout(push_constant) uniform Push {
    mat4 proj;
    float radius;
    float bias;
    float intensity;
    vec2 noiseScale;
} pc;

vec3 viewPos(vec2 uv) {
    float z = texture(u_depth, uv).r;
    vec4 clip = vec4(uv * 2.0 - 1.0, z, 1.0);
    vec4 view = inverse(pc.proj) * clip;
    return view.xyz / view.w;
}

void main() {
    vec3 pos = viewPos(v_uv);
    // reconstruct the view normal from depth derivatives
    vec3 normal = normalize(cross(dFdx(pos), dFdy(pos)));
    vec3 rand = texture(u_noise, v_uv * pc.noiseScale).xyz;

    vec3 tangent = normalize(rand - normal * dot(rand, normal));
    vec3 bitangent = cross(normal, tangent);
    mat3 tbn = mat3(tangent, bitangent, normal);

    float occlusion = 0.0;
    for (int i = 0; i < 64; i++) {
        vec3 samplePos = pos + (tbn * u_kernel.samples[i].xyz) * pc.radius;
        vec4 offset = pc.proj * vec4(samplePos, 1.0);
        offset.xyz /= offset.w;
        offset.xy = offset.xy * 0.5 + 0.5;

        float sampleDepth = viewPos(offset.xy).z;
        float rangeCheck = smoothstep(0.0, 1.0, pc.radius / abs(pos.z - sampleDepth));
        occlusion += (sampleDepth >= samplePos.z + pc.bias ? 1.0 : 0.0) * rangeCheck;
    }
    occlusion = 1.0 - (occlusion / 64.0) * pc.intensity;
    o_ao = occlusion;
}
"#;

/// 5x5 box blur over the raw AO term.
pub const SSAO_BLUR_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out float o_ao;

layout(set = 0, binding = 0) uniform sampler2D u_ao;

void main() {
    vec2 texel = 1.0 / vec2(textureSize(u_ao, 0));
    float sum = 0.0;
    for (int x = -2; x <= 2; x++) {
        for (int y = -2; y <= 2; y++) {
            sum += texture(u_ao, v_uv + vec2(x, y) * texel).r;
        }
    }
    o_ao = sum / 25.0;
}
"#;
