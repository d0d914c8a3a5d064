use glam::{Mat3, Quat, Vec3};
use rayon::prelude::*;

use crate::gaussian::Gaussian;
use crate::render::RenderError;

/// `R * S * S^T * R^T` for a (unit) rotation and per axis scale.
pub fn calc_cov3d(scale: Vec3, rotation: Quat) -> Mat3 {
    let m = Mat3::from_quat(rotation) * Mat3::from_diagonal(scale);
    m * m.transpose()
}

/// World space covariances of a scene, reused across frames until the scene or the scale
/// modifier changes.
#[derive(Debug, Default)]
pub struct CovarianceCache {
    covs: Vec<Mat3>,
    scale_modifier: Option<f32>,
}

impl CovarianceCache {
    /// Forget the cached values, the next [`Self::update`] recomputes everything.
    pub fn invalidate(&mut self) {
        self.scale_modifier = None;
    }

    /// Make sure the cache holds covariances for `gaussians` at `scale_modifier`.
    /// Returns whether anything was recomputed.
    pub fn update(
        &mut self,
        gaussians: &[Gaussian],
        scale_modifier: f32,
    ) -> Result<bool, RenderError> {
        // Compare bit patterns so a NaN modifier doesn't recompute on every frame.
        let up_to_date = self
            .scale_modifier
            .is_some_and(|cached| cached.to_bits() == scale_modifier.to_bits())
            && self.covs.len() == gaussians.len();
        if up_to_date {
            return Ok(false);
        }

        let _span = tracing::trace_span!("ComputeCov3D", num = gaussians.len()).entered();

        self.covs.clear();
        self.covs
            .try_reserve_exact(gaussians.len())
            .map_err(|source| RenderError::Allocation {
                what: "covariances",
                source,
            })?;
        gaussians
            .par_iter()
            .map(|g| calc_cov3d(g.scale * scale_modifier, g.rotation))
            .collect_into_vec(&mut self.covs);

        self.scale_modifier = Some(scale_modifier);
        Ok(true)
    }

    pub fn covariances(&self) -> &[Mat3] {
        &self.covs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn axis_aligned_covariance() {
        let cov = calc_cov3d(glam::vec3(1.0, 2.0, 3.0), Quat::IDENTITY);
        assert_eq!(cov, Mat3::from_diagonal(glam::vec3(1.0, 4.0, 9.0)));
    }

    #[test]
    fn rotated_covariance_is_symmetric() {
        let rot = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.2, 0.7);
        let cov = calc_cov3d(glam::vec3(0.5, 1.5, 0.1), rot);
        let diff = cov - cov.transpose();
        for col in [diff.x_axis, diff.y_axis, diff.z_axis] {
            assert!(col.abs().max_element() < 1e-6);
        }
        // Rotation doesn't change the total variance.
        let trace = cov.x_axis.x + cov.y_axis.y + cov.z_axis.z;
        assert_approx_eq!(trace, 0.25 + 2.25 + 0.01, 1e-5);
    }

    #[test]
    fn cache_recomputes_on_modifier_change() {
        let gaussians = vec![Gaussian::from_rgb(
            Vec3::ZERO,
            Vec3::ONE,
            Quat::IDENTITY,
            1.0,
            Vec3::ONE,
        )];
        let mut cache = CovarianceCache::default();
        assert!(cache.update(&gaussians, 1.0).expect("Alloc"));
        assert!(!cache.update(&gaussians, 1.0).expect("Alloc"));
        assert!(cache.update(&gaussians, 2.0).expect("Alloc"));
        assert_eq!(cache.covariances()[0], Mat3::from_diagonal(Vec3::splat(4.0)));
        cache.invalidate();
        assert!(cache.update(&gaussians, 2.0).expect("Alloc"));
    }
}
