//! Six-degree-of-freedom samples produced by motion platforms.
//!
//! Motion software publishes the rig's displacement as six scalar channels.
//! Translational channels are meters, rotational channels are degrees.

use glam::Vec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::pose::{EulerAngles, Pose};
use crate::time::Timestamp;

/// One motion channel of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DofAxis {
    /// Lateral translation (meters, positive to the right).
    Sway,
    /// Longitudinal translation (meters, positive forward).
    Surge,
    /// Vertical translation (meters, positive up).
    Heave,
    /// Rotation about the vertical axis (degrees).
    Yaw,
    /// Rotation about the longitudinal axis (degrees).
    Roll,
    /// Rotation about the lateral axis (degrees).
    Pitch,
}

impl DofAxis {
    /// All axes in channel order.
    pub const ALL: [Self; 6] = [
        Self::Sway,
        Self::Surge,
        Self::Heave,
        Self::Yaw,
        Self::Roll,
        Self::Pitch,
    ];

    /// Index of this axis in [`DofSample::values`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Sway => 0,
            Self::Surge => 1,
            Self::Heave => 2,
            Self::Yaw => 3,
            Self::Roll => 4,
            Self::Pitch => 5,
        }
    }

    /// Returns `true` for yaw, roll and pitch.
    #[must_use]
    pub const fn is_rotational(self) -> bool {
        matches!(self, Self::Yaw | Self::Roll | Self::Pitch)
    }

    /// Lowercase channel name, used in logs and recorder headers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sway => "sway",
            Self::Surge => "surge",
            Self::Heave => "heave",
            Self::Yaw => "yaw",
            Self::Roll => "roll",
            Self::Pitch => "pitch",
        }
    }
}

impl std::fmt::Display for DofAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A timestamped reading of all six channels.
///
/// # Example
///
/// ```
/// use motion_types::{DofAxis, DofSample, Timestamp};
///
/// let mut sample = DofSample::zero(Timestamp::from_millis(10));
/// sample.set(DofAxis::Heave, 0.02);
/// assert_eq!(sample.get(DofAxis::Heave), 0.02);
///
/// let pose = sample.to_pose();
/// assert!((pose.position.y - 0.02).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DofSample {
    /// Time the sample was taken.
    pub timestamp: Timestamp,

    /// Channel values in [`DofAxis::ALL`] order.
    pub values: [f64; 6],
}

impl DofSample {
    /// Creates a sample from channel values in [`DofAxis::ALL`] order.
    #[must_use]
    pub const fn new(timestamp: Timestamp, values: [f64; 6]) -> Self {
        Self { timestamp, values }
    }

    /// Creates a sample with every channel at zero.
    #[must_use]
    pub const fn zero(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            values: [0.0; 6],
        }
    }

    /// Returns the value of one channel.
    #[must_use]
    pub const fn get(&self, axis: DofAxis) -> f64 {
        self.values[axis.index()]
    }

    /// Sets the value of one channel.
    pub const fn set(&mut self, axis: DofAxis, value: f64) {
        self.values[axis.index()] = value;
    }

    /// Returns `true` if every channel is finite and not subnormal.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.values.iter().all(|v| v.is_finite() && !v.is_subnormal())
    }

    /// Checks the sample.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidSample`] naming the first unusable channel.
    pub fn validated(self) -> Result<Self, TypesError> {
        for axis in DofAxis::ALL {
            let v = self.get(axis);
            if !v.is_finite() || v.is_subnormal() {
                return Err(TypesError::invalid_sample(axis, v));
            }
        }
        Ok(self)
    }

    /// Converts the sample to a rig pose.
    ///
    /// Sway maps to +X, heave to +Y and surge to -Z (forward in the host
    /// runtime's right-handed, Y-up frame). The orientation is
    /// `Ry(yaw) · Rx(pitch) · Rz(roll)` with angles converted from degrees.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_pose(&self) -> Pose {
        let position = Vec3::new(
            self.get(DofAxis::Sway) as f32,
            self.get(DofAxis::Heave) as f32,
            -self.get(DofAxis::Surge) as f32,
        );
        let angles = EulerAngles::new(
            self.get(DofAxis::Pitch).to_radians() as f32,
            self.get(DofAxis::Yaw).to_radians() as f32,
            self.get(DofAxis::Roll).to_radians() as f32,
        );
        Pose::new(position, angles.to_quat())
    }

    /// Converts a pose back into channel values, the inverse of
    /// [`to_pose`](Self::to_pose).
    ///
    /// Lets pose-producing trackers feed the same pipeline as motion
    /// platforms.
    #[must_use]
    pub fn from_pose(timestamp: Timestamp, pose: &Pose) -> Self {
        let angles = EulerAngles::from_quat(pose.orientation.normalize());
        let mut sample = Self::zero(timestamp);
        sample.set(DofAxis::Sway, f64::from(pose.position.x));
        sample.set(DofAxis::Heave, f64::from(pose.position.y));
        sample.set(DofAxis::Surge, -f64::from(pose.position.z));
        sample.set(DofAxis::Yaw, f64::from(angles.yaw).to_degrees());
        sample.set(DofAxis::Roll, f64::from(angles.roll).to_degrees());
        sample.set(DofAxis::Pitch, f64::from(angles.pitch).to_degrees());
        sample
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn axis_indices_follow_channel_order() {
        for (i, axis) in DofAxis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
        }
        assert!(DofAxis::Yaw.is_rotational());
        assert!(!DofAxis::Heave.is_rotational());
        assert_eq!(DofAxis::Pitch.to_string(), "pitch");
    }

    #[test]
    fn sample_get_set() {
        let mut sample = DofSample::zero(Timestamp::zero());
        sample.set(DofAxis::Roll, 4.5);
        assert_eq!(sample.get(DofAxis::Roll), 4.5);
        assert_eq!(sample.values[4], 4.5);
    }

    #[test]
    fn sample_validation() {
        let mut sample = DofSample::zero(Timestamp::zero());
        assert!(sample.is_valid());

        sample.set(DofAxis::Yaw, f64::NAN);
        assert!(!sample.is_valid());
        let err = sample.validated().unwrap_err();
        assert!(err.to_string().contains("yaw"));

        sample.set(DofAxis::Yaw, f64::MIN_POSITIVE / 4.0);
        assert!(!sample.is_valid());
    }

    #[test]
    fn translation_mapping() {
        let sample = DofSample::new(Timestamp::zero(), [0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
        let pose = sample.to_pose();
        assert_relative_eq!(pose.position.x, 0.1, epsilon = 1e-6);
        assert_relative_eq!(pose.position.y, 0.3, epsilon = 1e-6);
        assert_relative_eq!(pose.position.z, -0.2, epsilon = 1e-6);
    }

    #[test]
    fn pure_pitch_maps_to_x_rotation() {
        let mut sample = DofSample::zero(Timestamp::zero());
        sample.set(DofAxis::Pitch, 10.0);
        let pose = sample.to_pose();
        let expected = glam::Quat::from_rotation_x(10.0_f32.to_radians());
        assert!(pose.orientation.dot(expected).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn pose_roundtrip() {
        let sample = DofSample::new(
            Timestamp::from_millis(5),
            [0.01, -0.02, 0.03, 12.0, -3.0, 7.5],
        );
        let back = DofSample::from_pose(sample.timestamp, &sample.to_pose());
        assert_eq!(back.timestamp, sample.timestamp);
        for axis in DofAxis::ALL {
            assert_relative_eq!(back.get(axis), sample.get(axis), epsilon = 1e-4);
        }
    }
}
