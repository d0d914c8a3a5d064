use glam::Vec3;

pub const SH_C0: f32 = 0.2820947917738781;
pub const MAX_SH_DEGREE: u32 = 3;
pub const MAX_SH_COEFFS: usize = sh_coeffs_for_degree(MAX_SH_DEGREE) as usize;

pub const fn sh_coeffs_for_degree(degree: u32) -> u32 {
    (degree + 1).pow(2)
}

pub fn sh_degree_from_coeffs(coeffs_per_channel: u32) -> Option<u32> {
    match coeffs_per_channel {
        1 => Some(0),
        4 => Some(1),
        9 => Some(2),
        16 => Some(3),
        _ => None,
    }
}

pub fn channel_to_sh(rgb: f32) -> f32 {
    (rgb - 0.5) / SH_C0
}

pub fn rgb_to_sh(rgb: Vec3) -> Vec3 {
    glam::vec3(
        channel_to_sh(rgb.x),
        channel_to_sh(rgb.y),
        channel_to_sh(rgb.z),
    )
}

/// Evaluate spherical harmonics at a view direction.
/// Based on: Efficient Spherical Harmonic Evaluation, Peter-Pike Sloan, JCGT 2013
///
/// `coeffs` holds at least `sh_coeffs_for_degree(degree)` entries. The result is the raw SH
/// value, without the DC offset.
pub fn sh_coeffs_to_color(degree: u32, viewdir: Vec3, coeffs: &[Vec3]) -> Vec3 {
    let mut color = SH_C0 * coeffs[0];

    if degree == 0 {
        return color;
    }

    let Vec3 { x, y, z } = viewdir;

    let ftmp0a: f32 = 0.48860251190292;
    color += ftmp0a * (-y * coeffs[1] + z * coeffs[2] - x * coeffs[3]);

    if degree == 1 {
        return color;
    }

    let z2 = z * z;
    let fc1 = x * x - y * y;
    let fs1 = 2.0 * x * y;

    let ftmp0b = -1.092548430592079 * z;
    let ftmp1a = 0.5462742152960395;
    let psh4 = ftmp1a * fs1;
    let psh5 = ftmp0b * y;
    let psh6 = 0.9461746957575601 * z2 - 0.3153915652525201;
    let psh7 = ftmp0b * x;
    let psh8 = ftmp1a * fc1;

    color += psh4 * coeffs[4]
        + psh5 * coeffs[5]
        + psh6 * coeffs[6]
        + psh7 * coeffs[7]
        + psh8 * coeffs[8];

    if degree == 2 {
        return color;
    }

    let ftmp0c = -2.285228997322329 * z2 + 0.4570457994644658;
    let ftmp1b = 1.445305721320277 * z;
    let ftmp2a = -0.5900435899266435;
    let fc2 = x * fc1 - y * fs1;
    let fs2 = x * fs1 + y * fc1;

    let psh9 = ftmp2a * fs2;
    let psh10 = ftmp1b * fs1;
    let psh11 = ftmp0c * y;
    let psh12 = z * (1.865881662950577 * z2 - 1.119528997770346);
    let psh13 = ftmp0c * x;
    let psh14 = ftmp1b * fc1;
    let psh15 = ftmp2a * fc2;

    color
        + psh9 * coeffs[9]
        + psh10 * coeffs[10]
        + psh11 * coeffs[11]
        + psh12 * coeffs[12]
        + psh13 * coeffs[13]
        + psh14 * coeffs[14]
        + psh15 * coeffs[15]
}

/// Final splat color for a view direction: SH plus the DC offset, clamped to be non-negative.
pub fn eval_color(degree: u32, viewdir: Vec3, coeffs: &[Vec3]) -> Vec3 {
    (sh_coeffs_to_color(degree, viewdir, coeffs) + 0.5).max(Vec3::ZERO)
}
