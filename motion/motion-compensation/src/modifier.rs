//! Per-axis gain on the compensated motion.
//!
//! Users sometimes want less than full compensation on an axis, e.g. keep
//! some pitch so acceleration cues stay visible. The modifier scales the
//! tracker's displacement from its reference pose, axis by axis, in a
//! "forward" frame aligned with the seat instead of the tracking space.

use motion_types::{EulerAngles, Pose};
use tracing::info;

use crate::config::ModifierConfig;

/// Scales tracker motion relative to the reference pose.
///
/// # Example
///
/// ```
/// use motion_compensation::{ModifierConfig, PoseModifier};
/// use motion_types::{EulerAngles, Pose};
///
/// let config = ModifierConfig::default()
///     .with_rotation(0.0, 1.0, 1.0)
///     .with_enabled(true);
/// let modifier = PoseModifier::new(&config);
///
/// let pitched = Pose::from_rotation(EulerAngles::new(0.2, 0.1, 0.0).to_quat());
/// let out = modifier.apply(&pitched, &Pose::identity());
/// let angles = EulerAngles::from_quat(out.orientation);
/// assert!(angles.pitch.abs() < 1e-5);
/// assert!((angles.yaw - 0.1).abs() < 1e-5);
/// ```
#[derive(Debug, Clone)]
pub struct PoseModifier {
    gains: ModifierConfig,
    fwd_to_stage: Pose,
    stage_to_fwd: Pose,
    apply_rotation: bool,
    apply_translation: bool,
}

impl PoseModifier {
    /// Creates a modifier from configuration, active if the configuration
    /// enables it.
    #[must_use]
    pub fn new(config: &ModifierConfig) -> Self {
        let mut modifier = Self {
            gains: *config,
            fwd_to_stage: Pose::identity(),
            stage_to_fwd: Pose::identity(),
            apply_rotation: false,
            apply_translation: false,
        };
        modifier.set_active(config.enabled);
        modifier
    }

    /// Switches the modifier on or off.
    ///
    /// Rotation is only touched if a rotational gain differs from 1, and
    /// likewise for translation.
    #[allow(clippy::float_cmp)]
    pub fn set_active(&mut self, active: bool) {
        let g = &self.gains;
        self.apply_rotation = active && (g.pitch != 1.0 || g.yaw != 1.0 || g.roll != 1.0);
        self.apply_translation = active && (g.sway != 1.0 || g.heave != 1.0 || g.surge != 1.0);
        self.gains.enabled = active;
        info!(
            active,
            rotation = self.apply_rotation,
            translation = self.apply_translation,
            "pose modifier"
        );
    }

    /// Returns true if the modifier is switched on.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.gains.enabled
    }

    /// Returns true if applying the modifier can change a pose.
    #[must_use]
    pub const fn is_effective(&self) -> bool {
        self.apply_rotation || self.apply_translation
    }

    /// Sets the forward frame, given as a pose in tracking space.
    pub fn set_forward(&mut self, fwd_to_stage: &Pose) {
        self.fwd_to_stage = fwd_to_stage.normalized();
        self.stage_to_fwd = self.fwd_to_stage.inverse();
    }

    /// Returns the forward frame.
    #[must_use]
    pub const fn forward(&self) -> &Pose {
        &self.fwd_to_stage
    }

    /// Scales the displacement of `target` from `reference`.
    ///
    /// Returns `target` unchanged when inactive or when every gain is 1.
    #[must_use]
    pub fn apply(&self, target: &Pose, reference: &Pose) -> Pose {
        if !self.is_effective() {
            return *target;
        }

        let mut current = target.then(&self.stage_to_fwd);
        let reference = reference.then(&self.stage_to_fwd);

        if self.apply_rotation {
            let delta = reference.inverse().then(&current);
            let angles = EulerAngles::from_quat(delta.orientation);
            let scaled = EulerAngles::new(
                angles.pitch * self.gains.pitch,
                angles.yaw * self.gains.yaw,
                angles.roll * self.gains.roll,
            );
            current.orientation = scaled.to_quat() * reference.orientation;
        }

        if self.apply_translation {
            let translation = current.position - reference.position;
            let scaled = translation
                * glam::Vec3::new(self.gains.sway, self.gains.heave, self.gains.surge);
            current.position = reference.position + scaled;
        }

        current.then(&self.fwd_to_stage).normalized()
    }
}
