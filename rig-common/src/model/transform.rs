//! Decomposed affine transform

use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale of a joint relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Compose as `T * R * S`
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Decompose an affine matrix (rotation is renormalized)
    pub fn from_mat4(m: &Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self {
            translation,
            rotation: rotation.normalize(),
            scale,
        }
    }

    /// True when every component is within `epsilon` of `other`.
    ///
    /// Rotations are compared up to sign since `q` and `-q` describe the
    /// same orientation.
    pub fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        let rotation_eq = self.rotation.abs_diff_eq(other.rotation, epsilon)
            || self.rotation.abs_diff_eq(-other.rotation, epsilon);
        rotation_eq
            && self.translation.abs_diff_eq(other.translation, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matrix() {
        assert_eq!(Transform::IDENTITY.to_mat4(), Mat4::IDENTITY);
    }

    #[test]
    fn test_mat4_roundtrip() {
        let t = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let back = Transform::from_mat4(&t.to_mat4());
        assert!(back.abs_diff_eq(&t, 1e-5), "{back:?} != {t:?}");
    }

    #[test]
    fn test_rotation_sign_is_ignored() {
        let q = Quat::from_rotation_y(0.3);
        let a = Transform::from_rotation(q);
        let b = Transform::from_rotation(-q);
        assert!(a.abs_diff_eq(&b, 1e-6));
    }
}
