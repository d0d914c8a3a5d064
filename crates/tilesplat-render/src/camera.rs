use glam::{Affine3A, Mat3, Quat, UVec2, Vec2, Vec3};

/// A pinhole camera. Local space looks down +Z, with +X to the right and +Y down the image.
///
/// Only the vertical field of view is stored. Pixels are square, so the horizontal field of
/// view follows from whatever viewport the camera renders into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub fov_y: f64,
    /// Principal point in normalized image coordinates, (0.5, 0.5) is the image center.
    pub center_uv: Vec2,
    pub position: Vec3,
    pub rotation: Quat,
}

impl Camera {
    pub fn new(position: Vec3, rotation: Quat, fov_y: f64, center_uv: Vec2) -> Self {
        Self {
            fov_y,
            center_uv,
            position,
            rotation,
        }
    }

    /// Place a camera at `position` looking at `target`. `up` is the world up direction.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3, fov_y: f64) -> Self {
        Self::new(
            position,
            look_rotation(target - position, up),
            fov_y,
            glam::vec2(0.5, 0.5),
        )
    }

    /// Horizontal field of view when rendering into `img_size`.
    pub fn fov_x(&self, img_size: UVec2) -> f64 {
        focal_to_fov(fov_to_focal(self.fov_y, img_size.y), img_size.x)
    }

    pub fn focal(&self, img_size: UVec2) -> Vec2 {
        Vec2::splat(fov_to_focal(self.fov_y, img_size.y) as f32)
    }

    pub fn center(&self, img_size: UVec2) -> Vec2 {
        self.center_uv * img_size.as_vec2()
    }

    pub fn local_to_world(&self) -> Affine3A {
        Affine3A::from_rotation_translation(self.rotation, self.position)
    }

    pub fn world_to_local(&self) -> Affine3A {
        self.local_to_world().inverse()
    }
}

fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(forward) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    // Fall back to another up axis when looking straight along it.
    let up = if forward.cross(up).length_squared() < 1e-8 {
        if forward.z.abs() < 0.9 { Vec3::Z } else { Vec3::X }
    } else {
        up
    };
    let right = (-up).cross(forward).normalize();
    let down = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, down, forward)).normalize()
}

pub fn fov_to_focal(fov_rad: f64, pixels: u32) -> f64 {
    0.5 * (pixels as f64) / (fov_rad * 0.5).tan()
}

pub fn focal_to_fov(focal: f64, pixels: u32) -> f64 {
    2.0 * f64::atan((pixels as f64) / (2.0 * focal))
}
