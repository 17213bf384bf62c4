//! Post-process chain sequencing.
//!
//! Every pass is a full-screen triangle; each writes into one of two
//! ping-pong color images that feed the next pass. The order is fixed:
//! SSAO → bloom → FSR spatial → temporal → FXAA → final.

use super::spatial_upscale::FsrConfig;

/// One scheduled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Ssao,
    Bloom,
    FsrEasu,
    FsrRcas,
    Temporal,
    Fxaa,
    /// polyblend overlay + gamma; always last, writes the swapchain
    Final,
}

/// Which post passes are enabled this frame (resolved from cvars).
#[derive(Debug, Clone)]
pub struct PostConfig {
    pub ssao: bool,
    pub bloom: bool,
    pub fsr: Option<FsrConfig>,
    pub temporal: bool,
    pub fxaa: bool,
}

/// The pass sequence for a frame. The Final pass always runs; everything
/// else drops out when disabled. FSR contributes its two passes only when
/// actually downscaled.
pub fn plan_passes(config: &PostConfig) -> Vec<PassKind> {
    let mut passes = Vec::with_capacity(7);
    if config.ssao {
        passes.push(PassKind::Ssao);
    }
    if config.bloom {
        passes.push(PassKind::Bloom);
    }
    if let Some(fsr) = &config.fsr {
        if fsr.active() {
            passes.push(PassKind::FsrEasu);
            passes.push(PassKind::FsrRcas);
        }
    }
    if config.temporal {
        passes.push(PassKind::Temporal);
    }
    if config.fxaa {
        passes.push(PassKind::Fxaa);
    }
    passes.push(PassKind::Final);
    passes
}

/// Ping-pong target assignment: pass N reads the image pass N-1 wrote.
/// Returns (input, output) indices into the two post color images for
/// each planned pass; the Final pass writes target `usize::MAX`
/// (the swapchain).
pub fn assign_targets(passes: &[PassKind]) -> Vec<(usize, usize)> {
    let mut assignments = Vec::with_capacity(passes.len());
    let mut current = 0usize;
    for pass in passes {
        let (input, output) = if *pass == PassKind::Final {
            (current, usize::MAX)
        } else {
            (current, current ^ 1)
        };
        assignments.push((input, output));
        if *pass != PassKind::Final {
            current ^= 1;
        }
    }
    assignments
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FinalPushConstants {
    /// damage/underwater tint, premixed by the client
    pub blend: [f32; 4],
    /// 1/gamma
    pub inv_gamma: f32,
    pub _pad: [f32; 3],
}

/// Final pass: polyblend overlay then gamma.
pub const FINAL_FRAG_GLSL: &str = r#"
#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_src;

layout(push_constant) uniform Push {
    vec4 blend;
    float invGamma;
} pc;

void main() {
    vec3 color = texture(u_src, v_uv).rgb;
    color = mix(color, pc.blend.rgb, pc.blend.a);
    o_color = vec4(pow(color, vec3(pc.invGamma)), 1.0);
}
"#;

/// Vertex shader shared by every post pass: one oversized triangle.
pub const FULLSCREEN_VERT_GLSL: &str = r#"
#version 450
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = vec2((gl_VertexIndex << 1) & 2, gl_VertexIndex & 2);
    gl_Position = vec4(v_uv * 2.0 - 1.0, 0.0, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> PostConfig {
        PostConfig {
            ssao: true,
            bloom: true,
            fsr: Some(FsrConfig { render_scale: 0.75, sharpness: 0.2 }),
            temporal: true,
            fxaa: true,
        }
    }

    #[test]
    fn test_full_chain_order() {
        let passes = plan_passes(&full_config());
        assert_eq!(
            passes,
            vec![
                PassKind::Ssao,
                PassKind::Bloom,
                PassKind::FsrEasu,
                PassKind::FsrRcas,
                PassKind::Temporal,
                PassKind::Fxaa,
                PassKind::Final,
            ]
        );
    }

    #[test]
    fn test_final_always_present() {
        let config = PostConfig {
            ssao: false,
            bloom: false,
            fsr: None,
            temporal: false,
            fxaa: false,
        };
        assert_eq!(plan_passes(&config), vec![PassKind::Final]);
    }

    #[test]
    fn test_fsr_skipped_at_native_scale() {
        let mut config = full_config();
        config.fsr = Some(FsrConfig { render_scale: 1.0, sharpness: 0.5 });
        let passes = plan_passes(&config);
        assert!(!passes.contains(&PassKind::FsrEasu));
        assert!(!passes.contains(&PassKind::FsrRcas));
    }

    #[test]
    fn test_targets_ping_pong() {
        let passes = plan_passes(&full_config());
        let targets = assign_targets(&passes);
        // each pass reads what the previous one wrote
        for w in targets.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
        // final writes the swapchain
        assert_eq!(targets.last().unwrap().1, usize::MAX);
        // no pass reads its own output
        for (input, output) in &targets {
            assert_ne!(input, output);
        }
    }
}
