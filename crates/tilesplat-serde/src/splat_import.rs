use std::io::Read;
use std::path::Path;

use glam::{Quat, Vec3};
use serde::de::DeserializeSeed;
use serde_ply::RowVisitor;
use thiserror::Error;
use tilesplat_render::gaussian::normalize_rotation;
use tilesplat_render::sh::{MAX_SH_COEFFS, MAX_SH_DEGREE, rgb_to_sh, sh_coeffs_for_degree};
use tilesplat_render::{Gaussian, GaussianStore, RenderError};

use crate::ply_gaussian::{MAX_REST_COEFFS, PlyGaussian};

/// Scale used when a file has no `scale_*` properties.
const DEFAULT_SCALE: f32 = 0.01;

#[derive(Debug, Error)]
pub enum SplatImportError {
    #[error("IO error while importing ply file.")]
    Io(#[from] std::io::Error),

    #[error("Invalid ply format")]
    InvalidFormat,

    #[error("Ply file has no vertex element")]
    MissingVertices,

    #[error("Ply file ended after {read} of {expected} splats")]
    Truncated { read: usize, expected: usize },

    #[error("Failed to parse ply file.")]
    ParseError(#[from] serde_ply::DeserializeError),

    #[error("Invalid splat data.")]
    InvalidSplats(#[from] RenderError),
}

/// Which properties the vertex element carries.
struct VertexLayout {
    has_scale: bool,
    has_rotation: bool,
    has_opacity: bool,
    rest_per_channel: usize,
    sh_degree: u32,
}

/// Highest SH degree whose higher order bands fit in `rest_count` planar coefficients.
fn sh_degree_from_rest(rest_count: usize) -> u32 {
    (0..=MAX_SH_DEGREE)
        .rev()
        .find(|&d| (sh_coeffs_for_degree(d) as usize - 1) * 3 <= rest_count)
        .unwrap_or(0)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Interleave planar higher order SH into `[coeff][rgb]`, after the DC term.
fn interleave_coeffs(sh_dc: Vec3, sh_rest: &[f32], coeffs_per_channel: usize, out: &mut [Vec3]) {
    out[0] = sh_dc;
    for (i, coeff) in out.iter_mut().skip(1).enumerate() {
        *coeff = Vec3::from_array(std::array::from_fn(|ch| sh_rest[ch * coeffs_per_channel + i]));
    }
}

fn decode_gaussian(row: &PlyGaussian, layout: &VertexLayout) -> Gaussian {
    let scale = if layout.has_scale {
        glam::vec3(row.scale_0.exp(), row.scale_1.exp(), row.scale_2.exp())
    } else {
        Vec3::splat(DEFAULT_SCALE)
    };

    // Ply files are in scalar order.
    let rotation = if layout.has_rotation {
        normalize_rotation(Quat::from_xyzw(row.rot_1, row.rot_2, row.rot_3, row.rot_0))
    } else {
        Quat::IDENTITY
    };

    let opacity = if layout.has_opacity {
        sigmoid(row.opacity)
    } else {
        1.0
    };

    // Prefer rgb if specified.
    let sh_dc = if let (Some(r), Some(g), Some(b)) = (row.red, row.green, row.blue) {
        rgb_to_sh(glam::vec3(r, g, b))
    } else {
        glam::vec3(row.f_dc_0, row.f_dc_1, row.f_dc_2)
    };

    let mut sh_coeffs = [Vec3::ZERO; MAX_SH_COEFFS];
    let num_coeffs = sh_coeffs_for_degree(layout.sh_degree) as usize;
    interleave_coeffs(
        sh_dc,
        &row.sh_rest_coeffs(),
        layout.rest_per_channel,
        &mut sh_coeffs[..num_coeffs],
    );

    Gaussian {
        mean: glam::vec3(row.x, row.y, row.z),
        scale,
        opacity,
        rotation,
        sh_coeffs,
    }
}

/// Read a 3D Gaussian splatting ply file into a scene.
///
/// Rows with any non-finite value are skipped.
pub fn load_splats_from_ply(mut reader: impl Read) -> Result<GaussianStore, SplatImportError> {
    let _span = tracing::trace_span!("LoadPly").entered();

    let mut file = serde_ply::ChunkPlyFile::new();
    reader.read_to_end(file.buffer_mut())?;

    let header = file.header().ok_or(SplatImportError::InvalidFormat)?;
    let vertex = header
        .get_element("vertex")
        .ok_or(SplatImportError::MissingVertices)?;

    let rest_count = vertex
        .properties
        .iter()
        .filter(|p| p.name.starts_with("f_rest_"))
        .count()
        .min(MAX_REST_COEFFS);
    let sh_degree = sh_degree_from_rest(rest_count);
    if (sh_coeffs_for_degree(sh_degree) as usize - 1) * 3 != rest_count {
        log::warn!("Ply has {rest_count} f_rest coefficients, only using SH degree {sh_degree}");
    }

    let layout = VertexLayout {
        has_scale: vertex.has_property("scale_0"),
        has_rotation: vertex.has_property("rot_0"),
        has_opacity: vertex.has_property("opacity"),
        rest_per_channel: rest_count / 3,
        sh_degree,
    };
    let total_splats = vertex.count;

    let mut gaussians = Vec::with_capacity(total_splats);
    let mut rows = 0;
    let mut skipped = 0;

    while rows < total_splats {
        let Some(element) = file.current_element() else {
            return Err(SplatImportError::Truncated {
                read: rows,
                expected: total_splats,
            });
        };
        if element.name != "vertex" {
            return Err(SplatImportError::InvalidFormat);
        }

        let before = rows;
        RowVisitor::new(|gauss: PlyGaussian| {
            rows += 1;
            if gauss.is_finite() {
                gaussians.push(decode_gaussian(&gauss, &layout));
            } else {
                skipped += 1;
            }
        })
        .deserialize(&mut file)?;

        if rows == before {
            return Err(SplatImportError::Truncated {
                read: rows,
                expected: total_splats,
            });
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} splats with non-finite values");
    }
    log::info!(
        "Loaded {} splats with SH degree {sh_degree}",
        gaussians.len()
    );

    Ok(GaussianStore::new(gaussians, sh_degree)?)
}

pub fn load_splats_from_path(path: impl AsRef<Path>) -> Result<GaussianStore, SplatImportError> {
    let file = std::fs::File::open(path)?;
    load_splats_from_ply(std::io::BufReader::new(file))
}
