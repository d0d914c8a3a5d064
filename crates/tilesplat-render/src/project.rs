use glam::{Affine3A, Mat2, Mat3, UVec2, Vec2, Vec3, Vec3Swizzles};
use rayon::prelude::*;

use crate::bounding_box::TileBBox;
use crate::camera::Camera;
use crate::gaussian::Gaussian;
use crate::sh::eval_color;
use crate::{COV_BLUR, calc_tile_bounds};

/// Splats further than this from the camera are culled.
pub const FAR_PLANE: f32 = 1e10;

/// Smallest opacity that can still produce a visible alpha.
pub const MIN_ALPHA: f32 = 1.0 / 255.0;

/// Per frame camera state shared by every splat.
#[derive(Debug, Clone, Copy)]
pub struct ProjectUniforms {
    pub viewmat: Affine3A,
    pub camera_position: Vec3,
    pub focal: Vec2,
    pub pixel_center: Vec2,
    pub img_size: UVec2,
    pub tile_bounds: UVec2,
    pub sh_degree: u32,
    pub near_plane: f32,
}

impl ProjectUniforms {
    pub fn new(camera: &Camera, img_size: UVec2, sh_degree: u32, near_plane: f32) -> Self {
        Self {
            viewmat: camera.world_to_local(),
            camera_position: camera.position,
            focal: camera.focal(img_size),
            pixel_center: camera.center(img_size),
            img_size,
            tile_bounds: calc_tile_bounds(img_size),
            sh_degree,
            near_plane,
        }
    }
}

/// A splat after projection, ready to be binned and composited.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectedSplat {
    pub xy: [f32; 2],
    /// Upper triangle of the inverse 2D covariance.
    pub conic: [f32; 3],
    pub color: [f32; 3],
    pub opacity: f32,
    /// View space depth.
    pub depth: f32,
    pub radius: f32,
    pub tile_bbox: [u32; 4],
}

impl ProjectedSplat {
    pub fn tile_bbox(&self) -> TileBBox {
        TileBBox::from_array(self.tile_bbox)
    }
}

/// Project a view space covariance to screen space with the EWA Jacobian.
pub fn calc_cov2d(cov3d: Mat3, mean_c: Vec3, focal: Vec2, img_size: UVec2, pixel_center: Vec2) -> Mat2 {
    let img_size = img_size.as_vec2();
    let lims_pos = (1.15 * img_size - pixel_center) / focal;
    let lims_neg = (-0.15 * img_size - pixel_center) / focal;
    let rz = 1.0 / mean_c.z;
    let uv = (mean_c.xy() * rz).clamp(lims_neg, lims_pos);
    let duv_dxy = focal * rz;

    let j0 = glam::vec3(duv_dxy.x, 0.0, -duv_dxy.x * uv.x);
    let j1 = glam::vec3(0.0, duv_dxy.y, -duv_dxy.y * uv.y);
    let a = j0.dot(cov3d * j0) + COV_BLUR;
    let b = j0.dot(cov3d * j1);
    let c = j1.dot(cov3d * j1) + COV_BLUR;
    Mat2::from_cols(glam::vec2(a, b), glam::vec2(b, c))
}

/// Three sigma radius of a 2D covariance, in whole pixels.
pub fn compute_bbox_extent(cov2d: Mat2) -> f32 {
    let a = cov2d.x_axis.x;
    let c = cov2d.y_axis.y;
    let mid = 0.5 * (a + c);
    let lambda_max = mid + (mid * mid - cov2d.determinant()).max(0.1).sqrt();
    (3.0 * lambda_max.sqrt()).ceil()
}

/// Project a single splat. Returns `None` when it can't contribute to the image.
pub fn project_splat(
    uniforms: &ProjectUniforms,
    gaussian: &Gaussian,
    cov3d: Mat3,
) -> Option<ProjectedSplat> {
    let mean_c = uniforms.viewmat.transform_point3(gaussian.mean);
    // Written so NaN depths fail the test too.
    if !(mean_c.z >= uniforms.near_plane && mean_c.z <= FAR_PLANE) {
        return None;
    }

    if !(gaussian.opacity >= MIN_ALPHA) {
        return None;
    }

    let rot = Mat3::from(uniforms.viewmat.matrix3);
    let cov_cam = rot * cov3d * rot.transpose();
    let cov2d = calc_cov2d(
        cov_cam,
        mean_c,
        uniforms.focal,
        uniforms.img_size,
        uniforms.pixel_center,
    );

    let det = cov2d.determinant();
    if !(det > 0.0 && det.is_finite()) {
        return None;
    }
    let conic = cov2d.inverse();

    let radius = compute_bbox_extent(cov2d);
    if !(radius > 0.0 && radius.is_finite()) {
        return None;
    }

    let xy = uniforms.focal * mean_c.xy() / mean_c.z + uniforms.pixel_center;
    if !xy.is_finite() {
        return None;
    }

    let img_size = uniforms.img_size.as_vec2();
    if xy.x + radius <= 0.0
        || xy.y + radius <= 0.0
        || xy.x - radius >= img_size.x
        || xy.y - radius >= img_size.y
    {
        return None;
    }

    let tile_bbox = TileBBox::from_circle(xy, radius, uniforms.tile_bounds);
    if tile_bbox.is_empty() {
        return None;
    }

    let viewdir = (gaussian.mean - uniforms.camera_position).normalize_or_zero();
    let color = eval_color(uniforms.sh_degree, viewdir, &gaussian.sh_coeffs);
    if !color.is_finite() {
        return None;
    }

    Some(ProjectedSplat {
        xy: xy.to_array(),
        conic: [conic.x_axis.x, conic.x_axis.y, conic.y_axis.y],
        color: color.to_array(),
        opacity: gaussian.opacity,
        depth: mean_c.z,
        radius,
        tile_bbox: tile_bbox.to_array(),
    })
}

/// Project every splat in parallel. Culled splats get a zeroed record and a tile count of 0.
pub fn project_splats(
    uniforms: &ProjectUniforms,
    gaussians: &[Gaussian],
    covariances: &[Mat3],
    projected: &mut [ProjectedSplat],
    tile_counts: &mut [u32],
) {
    assert!(
        gaussians.len() == covariances.len()
            && gaussians.len() == projected.len()
            && gaussians.len() == tile_counts.len(),
        "Per splat buffers must all have one entry per splat"
    );

    let _span = tracing::trace_span!("Preprocess", num = gaussians.len()).entered();

    gaussians
        .par_iter()
        .zip(covariances.par_iter())
        .zip(projected.par_iter_mut().zip(tile_counts.par_iter_mut()))
        .for_each(|((gaussian, &cov3d), (out, count))| {
            match project_splat(uniforms, gaussian, cov3d) {
                Some(splat) => {
                    *count = splat.tile_bbox().num_tiles();
                    *out = splat;
                }
                None => {
                    *count = 0;
                    *out = ProjectedSplat::default();
                }
            }
        });
}
