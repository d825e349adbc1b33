//! Rigid poses for tracker and reference frames.
//!
//! A [`Pose`] maps points from its local frame into its parent frame:
//! `p' = orientation * p + position`.

use glam::{EulerRot, Quat, Vec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Smallest quaternion norm that can still be normalized safely.
const MIN_QUAT_NORM: f32 = 1e-6;

/// A 3D pose (position + orientation).
///
/// Position is in meters. Orientation is a unit quaternion and is
/// re-normalized after every composition so float drift cannot accumulate
/// over thousands of frames.
///
/// # Example
///
/// ```
/// use motion_types::Pose;
/// use glam::{Quat, Vec3};
///
/// let seat = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_y(0.3));
/// let back = seat.compose(&seat.inverse());
/// assert!(back.approx_eq(&Pose::identity(), 1e-5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in meters.
    #[cfg_attr(feature = "serde", serde(with = "vec3_serde"))]
    pub position: Vec3,

    /// Orientation as unit quaternion.
    #[cfg_attr(feature = "serde", serde(with = "quat_serde"))]
    pub orientation: Quat,
}

#[cfg(feature = "serde")]
mod quat_serde {
    use glam::Quat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct QuatData {
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    }

    pub fn serialize<S: Serializer>(q: &Quat, s: S) -> Result<S::Ok, S::Error> {
        QuatData {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Quat, D::Error> {
        let data = QuatData::deserialize(d)?;
        Ok(Quat::from_xyzw(data.x, data.y, data.z, data.w))
    }
}

#[cfg(feature = "serde")]
mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Vec3Data {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        Vec3Data {
            x: v.x,
            y: v.y,
            z: v.z,
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let data = Vec3Data::deserialize(d)?;
        Ok(Vec3::new(data.x, data.y, data.z))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Creates a pose from position and orientation.
    #[must_use]
    pub const fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Creates the identity pose (at origin, no rotation).
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }

    /// Creates a pose with only translation.
    #[must_use]
    pub const fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Creates a pose with only rotation.
    #[must_use]
    pub const fn from_rotation(orientation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation,
        }
    }

    /// Composes this pose with another (`self ∘ other`).
    ///
    /// The result applies `other` first, then `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.orientation * other.position + self.position,
            orientation: (self.orientation * other.orientation).normalize(),
        }
    }

    /// Applies this pose first, then `next` (`next ∘ self`).
    ///
    /// This is the operand order of the host runtime's pose multiply, which
    /// reads left to right in the order the transforms are applied.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        next.compose(self)
    }

    /// Returns the inverse pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.orientation.inverse();
        Self {
            position: inv_rotation * (-self.position),
            orientation: inv_rotation,
        }
    }

    /// Applies the pose to a point.
    #[must_use]
    pub fn apply_point(&self, point: Vec3) -> Vec3 {
        self.orientation * point + self.position
    }

    /// Returns a copy with a unit-length orientation.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            position: self.position,
            orientation: self.orientation.normalize(),
        }
    }

    /// Returns `true` if every component is finite and not subnormal and
    /// the orientation can be normalized.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let components = self
            .position
            .to_array()
            .into_iter()
            .chain(self.orientation.to_array());
        let mut all_usable = true;
        for c in components {
            all_usable &= c.is_finite() && !c.is_subnormal();
        }
        all_usable && self.orientation.length() > MIN_QUAT_NORM
    }

    /// Checks the pose and returns it with a normalized orientation.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidPose`] for `NaN`, infinite or denormal
    /// components or a zero-length orientation.
    pub fn validated(self) -> Result<Self, TypesError> {
        if self.is_valid() {
            Ok(self.normalized())
        } else {
            Err(TypesError::invalid_pose(format!("{self:?}")))
        }
    }

    /// Returns `true` if both poses match within `epsilon`.
    ///
    /// `q` and `-q` describe the same orientation and compare equal.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        let position_close = (self.position - other.position).length() < epsilon;
        let dot = self.orientation.dot(other.orientation).abs();
        position_close && (1.0 - dot) < epsilon
    }
}

/// Euler angles in radians, matching the host runtime's
/// roll-pitch-yaw convention: roll about Z, then pitch about X, then yaw
/// about Y.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EulerAngles {
    /// Rotation about X in radians.
    pub pitch: f32,
    /// Rotation about Y in radians.
    pub yaw: f32,
    /// Rotation about Z in radians.
    pub roll: f32,
}

impl EulerAngles {
    /// Creates Euler angles from radians.
    #[must_use]
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Decomposes a quaternion.
    #[must_use]
    pub fn from_quat(q: Quat) -> Self {
        let (yaw, pitch, roll) = q.to_euler(EulerRot::YXZ);
        Self { pitch, yaw, roll }
    }

    /// Recomposes the quaternion `Ry(yaw) · Rx(pitch) · Rz(roll)`.
    #[must_use]
    pub fn to_quat(self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn pose_identity() {
        let pose = Pose::identity();
        assert_eq!(pose.position, Vec3::ZERO);
        assert_eq!(pose.orientation, Quat::IDENTITY);
        assert_eq!(Pose::default(), pose);
    }

    #[test]
    fn pose_compose_order() {
        let rotate = Pose::from_rotation(Quat::from_rotation_y(FRAC_PI_2));
        let shift = Pose::from_translation(Vec3::X);

        // shift first, then rotate: +X rotated about Y lands on -Z
        let p = rotate.compose(&shift).apply_point(Vec3::ZERO);
        assert_relative_eq!(p.z, -1.0, epsilon = 1e-6);

        // `then` reads in application order
        let q = shift.then(&rotate).apply_point(Vec3::ZERO);
        assert_relative_eq!(q.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn pose_inverse_roundtrip() {
        let pose = Pose::new(Vec3::new(0.1, -0.2, 0.3), Quat::from_rotation_x(0.4));
        let point = Vec3::new(1.0, 2.0, 3.0);
        let back = pose.inverse().apply_point(pose.apply_point(point));
        assert!((back - point).length() < 1e-5);
    }

    #[test]
    fn pose_compose_renormalizes() {
        let drifted = Pose::from_rotation(Quat::from_xyzw(0.0, 0.0, 0.0, 1.001));
        let composed = drifted.compose(&drifted);
        assert_relative_eq!(composed.orientation.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn pose_validity() {
        assert!(Pose::identity().is_valid());

        let nan = Pose::from_translation(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(!nan.is_valid());
        assert!(nan.validated().is_err());

        let denormal = Pose::from_translation(Vec3::new(f32::MIN_POSITIVE / 2.0, 0.0, 0.0));
        assert!(!denormal.is_valid());

        let degenerate = Pose::from_rotation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert!(!degenerate.is_valid());
    }

    #[test]
    fn pose_approx_eq_ignores_quaternion_sign() {
        let q = Quat::from_rotation_z(0.7);
        let a = Pose::from_rotation(q);
        let b = Pose::from_rotation(-q);
        assert!(a.approx_eq(&b, 1e-6));
    }

    #[test]
    fn euler_roundtrip() {
        let angles = EulerAngles::new(0.1, -0.4, 0.25);
        let back = EulerAngles::from_quat(angles.to_quat());
        assert_relative_eq!(back.pitch, angles.pitch, epsilon = 1e-5);
        assert_relative_eq!(back.yaw, angles.yaw, epsilon = 1e-5);
        assert_relative_eq!(back.roll, angles.roll, epsilon = 1e-5);
    }

    #[test]
    fn euler_pure_pitch() {
        let angles = EulerAngles::from_quat(Quat::from_rotation_x(0.3));
        assert_relative_eq!(angles.pitch, 0.3, epsilon = 1e-6);
        assert_relative_eq!(angles.yaw, 0.0, epsilon = 1e-6);
        assert_relative_eq!(angles.roll, 0.0, epsilon = 1e-6);
    }
}
