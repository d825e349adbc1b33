//! Cascaded smoothing filters for tracker poses.
//!
//! Position runs through an exponential moving average, orientation through
//! a spherical interpolation cascade. Both support one to three stages.
//!
//! A plain cascade of `n` EMAs lags `n` times as much as one stage. The
//! translation filter combines its stages with binomial weights instead
//! (`2·e1 - e2`, `3·e1 - 3·e2 + e3`), which removes the steady-state lag on
//! a ramp.

use glam::{Quat, Vec3};
use motion_types::Pose;
use tracing::info;

use crate::config::FilterConfig;
use crate::error::{CompensationError, Result};

/// Number of cascaded stages in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOrder {
    /// One stage.
    Single,
    /// Two stages.
    Double,
    /// Three stages.
    Triple,
}

impl FilterOrder {
    /// Number of stages.
    #[must_use]
    pub const fn stages(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

impl TryFrom<u8> for FilterOrder {
    type Error = CompensationError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double),
            3 => Ok(Self::Triple),
            _ => Err(CompensationError::out_of_range(
                "filter.order",
                f64::from(value),
                1.0,
                3.0,
            )),
        }
    }
}

/// Clamps a strength to `[0, 1]`. `NaN` becomes 0.
pub(crate) fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

/// Exponential moving average over positions.
///
/// # Example
///
/// ```
/// use motion_compensation::{EmaFilter, FilterOrder};
/// use glam::Vec3;
///
/// let mut filter = EmaFilter::new(FilterOrder::Single, 0.5);
/// filter.reset(Vec3::ZERO);
/// let out = filter.filter(Vec3::splat(1.0));
/// assert!((out.x - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct EmaFilter {
    order: FilterOrder,
    strength: f32,
    vertical_factor: f32,
    alpha: Vec3,
    stages: [Vec3; 3],
}

impl EmaFilter {
    /// Creates a filter with a vertical factor of 1.
    #[must_use]
    pub fn new(order: FilterOrder, strength: f32) -> Self {
        let mut filter = Self {
            order,
            strength: 0.0,
            vertical_factor: 1.0,
            alpha: Vec3::ONE,
            stages: [Vec3::ZERO; 3],
        };
        filter.apply_strength(strength);
        filter
    }

    /// Creates a filter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured order is outside `[1, 3]`.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let order = FilterOrder::try_from(config.order)?;
        let mut filter = Self::new(order, config.strength);
        filter.vertical_factor = config.vertical_factor.max(0.0);
        filter.apply_strength(config.strength);
        Ok(filter)
    }

    /// Returns the filter order.
    #[must_use]
    pub const fn order(&self) -> FilterOrder {
        self.order
    }

    /// Returns the current strength.
    #[must_use]
    pub const fn strength(&self) -> f32 {
        self.strength
    }

    /// Sets the strength, clamped to `[0, 1]`, and returns the value used.
    pub fn set_strength(&mut self, strength: f32) -> f32 {
        let clamped = self.apply_strength(strength);
        info!(
            requested = strength,
            strength = clamped,
            order = self.order.stages(),
            "translation filter strength set"
        );
        clamped
    }

    fn apply_strength(&mut self, strength: f32) -> f32 {
        self.strength = clamp_strength(strength);
        let alpha = 1.0 - self.strength;
        let vertical = (1.0 - self.vertical_factor * self.strength).max(0.0);
        self.alpha = Vec3::new(alpha, vertical, alpha);
        self.strength
    }

    /// Feeds one position and returns the smoothed position.
    ///
    /// With a strength of exactly 0 the input is returned unchanged and the
    /// stages follow it.
    #[allow(clippy::float_cmp)]
    pub fn filter(&mut self, value: Vec3) -> Vec3 {
        if self.strength == 0.0 {
            self.stages = [value; 3];
            return value;
        }

        let keep = Vec3::ONE - self.alpha;
        let mut input = value;
        for stage in self.stages.iter_mut().take(self.order.stages()) {
            *stage = self.alpha * input + keep * *stage;
            input = *stage;
        }

        let [e1, e2, e3] = self.stages;
        match self.order {
            FilterOrder::Single => e1,
            FilterOrder::Double => 2.0 * e1 - e2,
            FilterOrder::Triple => 3.0 * e1 - 3.0 * e2 + e3,
        }
    }

    /// Re-seeds every stage to `value`.
    pub fn reset(&mut self, value: Vec3) {
        self.stages = [value; 3];
    }
}

/// Spherical interpolation cascade over orientations.
#[derive(Debug, Clone)]
pub struct SlerpFilter {
    order: FilterOrder,
    strength: f32,
    stages: [Quat; 3],
}

impl SlerpFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(order: FilterOrder, strength: f32) -> Self {
        Self {
            order,
            strength: clamp_strength(strength),
            stages: [Quat::IDENTITY; 3],
        }
    }

    /// Creates a filter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured order is outside `[1, 3]`.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        Ok(Self::new(FilterOrder::try_from(config.order)?, config.strength))
    }

    /// Returns the filter order.
    #[must_use]
    pub const fn order(&self) -> FilterOrder {
        self.order
    }

    /// Returns the current strength.
    #[must_use]
    pub const fn strength(&self) -> f32 {
        self.strength
    }

    /// Sets the strength, clamped to `[0, 1]`, and returns the value used.
    pub fn set_strength(&mut self, strength: f32) -> f32 {
        self.strength = clamp_strength(strength);
        info!(
            requested = strength,
            strength = self.strength,
            order = self.order.stages(),
            "rotation filter strength set"
        );
        self.strength
    }

    /// Feeds one orientation and returns the smoothed orientation.
    ///
    /// Each stage moves from its input toward its previous value by the
    /// strength, so 0 follows the input and 1 holds still.
    #[allow(clippy::float_cmp)]
    pub fn filter(&mut self, value: Quat) -> Quat {
        if self.strength == 0.0 {
            self.stages = [value; 3];
            return value;
        }

        let mut input = value.normalize();
        for stage in self.stages.iter_mut().take(self.order.stages()) {
            *stage = input.slerp(*stage, self.strength).normalize();
            input = *stage;
        }
        input
    }

    /// Re-seeds every stage to `value`.
    pub fn reset(&mut self, value: Quat) {
        self.stages = [value.normalize(); 3];
    }
}

/// Position and orientation filters applied together.
///
/// # Example
///
/// ```
/// use motion_compensation::{FilterChain, FilterConfig};
/// use motion_types::Pose;
/// use glam::{Quat, Vec3};
///
/// let mut chain = FilterChain::new(&FilterConfig::new(3, 0.8), &FilterConfig::new(1, 0.8))?;
/// let pose = Pose::new(Vec3::new(0.1, 0.2, 0.3), Quat::from_rotation_y(0.2));
/// chain.reset(&pose);
/// assert!(chain.filter(&pose).approx_eq(&pose, 1e-5));
/// # Ok::<(), motion_compensation::CompensationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FilterChain {
    translation: EmaFilter,
    rotation: SlerpFilter,
}

impl FilterChain {
    /// Creates a chain from translation and rotation configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either order is outside `[1, 3]`.
    pub fn new(translation: &FilterConfig, rotation: &FilterConfig) -> Result<Self> {
        let chain = Self {
            translation: EmaFilter::from_config(translation)?,
            rotation: SlerpFilter::from_config(rotation)?,
        };
        info!(
            translation_order = chain.translation.order().stages(),
            translation_strength = chain.translation.strength(),
            rotation_order = chain.rotation.order().stages(),
            rotation_strength = chain.rotation.strength(),
            "filter chain configured"
        );
        Ok(chain)
    }

    /// Returns the translation filter.
    #[must_use]
    pub const fn translation(&self) -> &EmaFilter {
        &self.translation
    }

    /// Returns the rotation filter.
    #[must_use]
    pub const fn rotation(&self) -> &SlerpFilter {
        &self.rotation
    }

    /// Sets the translation strength and returns the clamped value.
    pub fn set_translation_strength(&mut self, strength: f32) -> f32 {
        self.translation.set_strength(strength)
    }

    /// Sets the rotation strength and returns the clamped value.
    pub fn set_rotation_strength(&mut self, strength: f32) -> f32 {
        self.rotation.set_strength(strength)
    }

    /// Filters position and orientation independently.
    pub fn filter(&mut self, pose: &Pose) -> Pose {
        Pose::new(
            self.translation.filter(pose.position),
            self.rotation.filter(pose.orientation),
        )
    }

    /// Re-seeds both filters to `pose`.
    pub fn reset(&mut self, pose: &Pose) {
        self.translation.reset(pose.position);
        self.rotation.reset(pose.orientation);
    }
}
