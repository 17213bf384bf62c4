// cl_smooth.rs — spline interpolation helpers
//
// Catmull-Rom evaluation used by the cubic entity interpolation path
// (`cl_cubic_interp`). The spline passes through p1 and p2; p0 and p3 only
// shape the tangents, so falling back to linear when history is short is
// positionally continuous.

use q2vk_common::q_shared::Vec3;

/// Catmull-Rom spline interpolation for smooth curves.
pub fn catmull_rom_interpolate(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Catmull-Rom interpolation for Vec3.
pub fn catmull_rom_interpolate_vec3(p0: &Vec3, p1: &Vec3, p2: &Vec3, p3: &Vec3, t: f32) -> Vec3 {
    [
        catmull_rom_interpolate(p0[0], p1[0], p2[0], p3[0], t),
        catmull_rom_interpolate(p0[1], p1[1], p2[1], p3[1], t),
        catmull_rom_interpolate(p0[2], p1[2], p2[2], p3[2], t),
    ]
}
