use glam::{Quat, Vec3};

use crate::render::RenderError;
use crate::sh::{MAX_SH_COEFFS, MAX_SH_DEGREE};

/// A single decoded 3D Gaussian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mean: Vec3,
    /// Per axis standard deviation, already exponentiated.
    pub scale: Vec3,
    /// Opacity in [0, 1], already passed through a sigmoid.
    pub opacity: f32,
    /// Unit rotation quaternion.
    pub rotation: Quat,
    /// SH coefficients per basis function, each holding rgb.
    pub sh_coeffs: [Vec3; MAX_SH_COEFFS],
}

impl Gaussian {
    /// A Gaussian with a constant color and no view dependence.
    pub fn from_rgb(mean: Vec3, scale: Vec3, rotation: Quat, opacity: f32, rgb: Vec3) -> Self {
        let mut sh_coeffs = [Vec3::ZERO; MAX_SH_COEFFS];
        sh_coeffs[0] = crate::sh::rgb_to_sh(rgb);
        Self {
            mean,
            scale,
            opacity,
            rotation: normalize_rotation(rotation),
            sh_coeffs,
        }
    }
}

/// Flat input record, as produced by an importer.
///
/// - `position`: xyz, w is ignored.
/// - `scale_opacity`: decoded xyz scale and opacity in w.
/// - `rotation`: quaternion as w, x, y, z.
/// - `sh`: 16 coefficients, interleaved as `[coeff][rgb]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GaussianRecord {
    pub position: [f32; 4],
    pub scale_opacity: [f32; 4],
    pub rotation: [f32; 4],
    pub sh: [f32; MAX_SH_COEFFS * 3],
}

impl From<&GaussianRecord> for Gaussian {
    fn from(record: &GaussianRecord) -> Self {
        let [px, py, pz, _] = record.position;
        let [sx, sy, sz, opacity] = record.scale_opacity;
        let [w, x, y, z] = record.rotation;
        let mut sh_coeffs = [Vec3::ZERO; MAX_SH_COEFFS];
        for (coeff, rgb) in sh_coeffs.iter_mut().zip(record.sh.chunks_exact(3)) {
            *coeff = Vec3::from_slice(rgb);
        }
        Self {
            mean: glam::vec3(px, py, pz),
            scale: glam::vec3(sx, sy, sz),
            opacity,
            rotation: normalize_rotation(Quat::from_xyzw(x, y, z, w)),
            sh_coeffs,
        }
    }
}

/// Normalize a quaternion, falling back to the identity when it has no usable length.
pub fn normalize_rotation(rotation: Quat) -> Quat {
    let len = rotation.length();
    if len.is_finite() && len > 1e-12 {
        rotation / len
    } else {
        Quat::IDENTITY
    }
}

/// The immutable set of Gaussians making up a scene.
#[derive(Debug, Clone, Default)]
pub struct GaussianStore {
    gaussians: Vec<Gaussian>,
    sh_degree: u32,
}

impl GaussianStore {
    pub fn new(gaussians: Vec<Gaussian>, sh_degree: u32) -> Result<Self, RenderError> {
        if sh_degree > MAX_SH_DEGREE {
            return Err(RenderError::InvalidShDegree(sh_degree));
        }
        if u32::try_from(gaussians.len()).is_err() {
            return Err(RenderError::TooManySplats(gaussians.len()));
        }
        Ok(Self {
            gaussians,
            sh_degree,
        })
    }

    pub fn from_records(records: &[GaussianRecord], sh_degree: u32) -> Result<Self, RenderError> {
        Self::new(records.iter().map(Gaussian::from).collect(), sh_degree)
    }

    /// Decode tightly packed [`GaussianRecord`]s. The buffer does not need to be aligned.
    pub fn from_bytes(bytes: &[u8], sh_degree: u32) -> Result<Self, RenderError> {
        let stride = size_of::<GaussianRecord>();
        if bytes.len() % stride != 0 {
            return Err(RenderError::MalformedRecords {
                len: bytes.len(),
                stride,
            });
        }
        let gaussians = bytes
            .chunks_exact(stride)
            .map(|chunk| Gaussian::from(&bytemuck::pod_read_unaligned::<GaussianRecord>(chunk)))
            .collect();
        Self::new(gaussians, sh_degree)
    }

    pub fn gaussians(&self) -> &[Gaussian] {
        &self.gaussians
    }

    pub fn sh_degree(&self) -> u32 {
        self.sh_degree
    }

    pub fn len(&self) -> usize {
        self.gaussians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaussians.is_empty()
    }
}
