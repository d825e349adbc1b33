//! Configuration types for the compensation pipeline.
//!
//! Every value is read-only at runtime except the filter strengths, which
//! can be adjusted through the tracker. [`TrackerConfig::validate`] is run by
//! `Tracker::init` and rejects out-of-range values before any state is built.

use motion_types::{DofAxis, Duration};
use serde::{Deserialize, Serialize};

use crate::error::{CompensationError, Result};

/// Main configuration for a tracker.
///
/// # Example
///
/// ```
/// use motion_compensation::{FilterConfig, StabilizerKind, TrackerConfig};
/// use motion_types::Duration;
///
/// let config = TrackerConfig::default()
///     .with_translation(FilterConfig::new(2, 0.4))
///     .with_stabilizer_kind(StabilizerKind::Median)
///     .with_connection_timeout(Duration::from_secs(1));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Position filter cascade.
    pub translation: FilterConfig,
    /// Orientation filter cascade.
    pub rotation: FilterConfig,
    /// Jitter reduction on raw DOF samples.
    pub stabilizer: StabilizerConfig,
    /// Delta cache lookup.
    pub cache: CacheConfig,
    /// Background sampling.
    pub sampler: SamplerConfig,
    /// Per-axis gain applied to the delta.
    pub modifier: ModifierConfig,
    /// How long acquisition may fail before the connection counts as lost.
    pub connection_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            translation: FilterConfig::default(),
            rotation: FilterConfig::default(),
            stabilizer: StabilizerConfig::default(),
            cache: CacheConfig::default(),
            sampler: SamplerConfig::default(),
            modifier: ModifierConfig::default(),
            connection_timeout: Duration::from_secs(3),
        }
    }
}

impl TrackerConfig {
    /// Sets the translation filter.
    #[must_use]
    pub const fn with_translation(mut self, translation: FilterConfig) -> Self {
        self.translation = translation;
        self
    }

    /// Sets the rotation filter.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: FilterConfig) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the stabilizer configuration.
    #[must_use]
    pub const fn with_stabilizer(mut self, stabilizer: StabilizerConfig) -> Self {
        self.stabilizer = stabilizer;
        self
    }

    /// Sets only the stabilizer algorithm.
    #[must_use]
    pub const fn with_stabilizer_kind(mut self, kind: StabilizerKind) -> Self {
        self.stabilizer.kind = kind;
        self
    }

    /// Sets the cache configuration.
    #[must_use]
    pub const fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the sampler configuration.
    #[must_use]
    pub const fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Sets the modifier configuration.
    #[must_use]
    pub const fn with_modifier(mut self, modifier: ModifierConfig) -> Self {
        self.modifier = modifier;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Collects every invalid value, one error per key.
    #[must_use]
    pub fn problems(&self) -> Vec<CompensationError> {
        let mut problems = Vec::new();
        problems.extend(self.translation.check("translation"));
        problems.extend(self.rotation.check("rotation"));
        problems.extend(self.stabilizer.check());
        problems.extend(self.sampler.check());
        problems.extend(self.modifier.check());
        if self.connection_timeout.is_zero() {
            problems.push(CompensationError::invalid_config(
                "connection_timeout must be positive",
            ));
        }
        problems
    }
}

/// Pushes an out-of-range error unless `min <= value <= max` (finite).
fn check_range(
    problems: &mut Vec<CompensationError>,
    key: impl Into<String>,
    value: f64,
    min: f64,
    max: f64,
) {
    if !value.is_finite() || value < min || value > max {
        problems.push(CompensationError::out_of_range(key, value, min, max));
    }
}

/// Configuration for one filter cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of cascaded stages (1 to 3).
    pub order: u8,
    /// Smoothing strength (0 = passthrough, 1 = frozen).
    pub strength: f32,
    /// Multiplier for the strength on the vertical axis.
    ///
    /// Only used by the translation filter.
    pub vertical_factor: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order: 2,
            strength: 0.5,
            vertical_factor: 1.0,
        }
    }
}

impl FilterConfig {
    /// Creates a filter configuration with a vertical factor of 1.
    #[must_use]
    pub const fn new(order: u8, strength: f32) -> Self {
        Self {
            order,
            strength,
            vertical_factor: 1.0,
        }
    }

    /// Sets the vertical strength multiplier.
    #[must_use]
    pub const fn with_vertical_factor(mut self, factor: f32) -> Self {
        self.vertical_factor = factor;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is outside `[1, 3]`, the strength is
    /// outside `[0, 1]` or the vertical factor is negative.
    pub fn validate(&self) -> Result<()> {
        match self.check("filter").into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check(&self, prefix: &str) -> Vec<CompensationError> {
        let mut problems = Vec::new();
        check_range(
            &mut problems,
            format!("{prefix}.order"),
            f64::from(self.order),
            1.0,
            3.0,
        );
        check_range(
            &mut problems,
            format!("{prefix}.strength"),
            f64::from(self.strength),
            0.0,
            1.0,
        );
        check_range(
            &mut problems,
            format!("{prefix}.vertical_factor"),
            f64::from(self.vertical_factor),
            0.0,
            f64::MAX,
        );
        problems
    }
}

/// Stabilizer algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StabilizerKind {
    /// The last sample wins.
    PassThrough,
    /// Frequency-tuned exponential average per DOF.
    Ema,
    /// Mean of the window.
    Average,
    /// Recency-weighted mean of the window.
    WeightedAverage,
    /// Median of the window.
    Median,
    /// Value where the cumulative recency weight crosses 50%.
    #[default]
    WeightedMedian,
    /// Second-order Butterworth low-pass per DOF, tuned like [`Self::Ema`].
    BiQuad,
}

/// Configuration for the DOF stabilizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Algorithm.
    pub kind: StabilizerKind,
    /// Time window for the order-statistic variants.
    pub window: Duration,
    /// Smoothing strength for [`StabilizerKind::Ema`] and
    /// [`StabilizerKind::BiQuad`] (0 to 1).
    pub strength: f64,
    /// Per-DOF strength multipliers in [`DofAxis::ALL`] order.
    pub factors: [f64; 6],
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            kind: StabilizerKind::default(),
            window: Duration::from_millis(50),
            strength: 0.5,
            factors: [1.0; 6],
        }
    }
}

impl StabilizerConfig {
    /// Creates a configuration for a window-based algorithm.
    #[must_use]
    pub fn windowed(kind: StabilizerKind, window: Duration) -> Self {
        Self {
            kind,
            window,
            ..Default::default()
        }
    }

    /// Creates a configuration for the EMA algorithm.
    #[must_use]
    pub fn ema(strength: f64) -> Self {
        Self {
            kind: StabilizerKind::Ema,
            strength,
            ..Default::default()
        }
    }

    /// Creates a configuration for the biquad algorithm.
    #[must_use]
    pub fn biquad(strength: f64) -> Self {
        Self {
            kind: StabilizerKind::BiQuad,
            strength,
            ..Default::default()
        }
    }

    /// Sets the strength multiplier for one DOF.
    #[must_use]
    pub const fn with_factor(mut self, axis: DofAxis, factor: f64) -> Self {
        self.factors[axis.index()] = factor;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the strength is outside `[0, 1]` or a factor is
    /// negative.
    pub fn validate(&self) -> Result<()> {
        match self.check().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check(&self) -> Vec<CompensationError> {
        let mut problems = Vec::new();
        check_range(&mut problems, "stabilizer.strength", self.strength, 0.0, 1.0);
        for axis in DofAxis::ALL {
            check_range(
                &mut problems,
                format!("stabilizer.factors.{axis}"),
                self.factors[axis.index()],
                0.0,
                f64::MAX,
            );
        }
        problems
    }
}

/// Configuration for time-indexed caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum distance for a near match.
    pub tolerance: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tolerance: Duration::from_millis(2),
        }
    }
}

impl CacheConfig {
    /// Creates a cache configuration.
    ///
    /// A zero tolerance only accepts exact matches before falling back to
    /// the nearest entry.
    #[must_use]
    pub const fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }
}

/// Configuration for the background sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Read on a dedicated thread. When off, the source is read on the
    /// caller's thread once per query.
    pub background: bool,
    /// Time between two reads.
    pub interval: Duration,
    /// Retry budget passed to the source when it is first opened.
    pub open_retries: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            background: true,
            interval: Duration::from_millis(2),
            open_retries: 3,
        }
    }
}

impl SamplerConfig {
    /// Sets the sampling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Creates a configuration that reads on the caller's thread.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            background: false,
            ..Default::default()
        }
    }

    fn check(&self) -> Vec<CompensationError> {
        if self.interval.is_zero() {
            vec![CompensationError::invalid_config(
                "sampler.interval must be positive",
            )]
        } else {
            Vec::new()
        }
    }
}

/// Per-axis gains applied to the pose delta.
///
/// A gain of 1 keeps the axis unchanged and 0 cancels its compensation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifierConfig {
    /// Whether the modifier starts enabled.
    pub enabled: bool,
    /// Gain on rotation about the lateral axis.
    pub pitch: f32,
    /// Gain on rotation about the vertical axis.
    pub yaw: f32,
    /// Gain on rotation about the longitudinal axis.
    pub roll: f32,
    /// Gain on lateral translation.
    pub sway: f32,
    /// Gain on vertical translation.
    pub heave: f32,
    /// Gain on longitudinal translation.
    pub surge: f32,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pitch: 1.0,
            yaw: 1.0,
            roll: 1.0,
            sway: 1.0,
            heave: 1.0,
            surge: 1.0,
        }
    }
}

impl ModifierConfig {
    /// Sets the rotational gains.
    #[must_use]
    pub const fn with_rotation(mut self, pitch: f32, yaw: f32, roll: f32) -> Self {
        self.pitch = pitch;
        self.yaw = yaw;
        self.roll = roll;
        self
    }

    /// Sets the translational gains.
    #[must_use]
    pub const fn with_translation(mut self, sway: f32, heave: f32, surge: f32) -> Self {
        self.sway = sway;
        self.heave = heave;
        self.surge = surge;
        self
    }

    /// Sets whether the modifier starts enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn check(&self) -> Vec<CompensationError> {
        let mut problems = Vec::new();
        let gains = [
            ("modifier.pitch", self.pitch),
            ("modifier.yaw", self.yaw),
            ("modifier.roll", self.roll),
            ("modifier.sway", self.sway),
            ("modifier.heave", self.heave),
            ("modifier.surge", self.surge),
        ];
        for (key, gain) in gains {
            check_range(&mut problems, key, f64::from(gain), 0.0, f64::MAX);
        }
        problems
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.problems().is_empty());
        assert_eq!(config.cache.tolerance, Duration::from_millis(2));
        assert_eq!(config.sampler.interval, Duration::from_millis(2));
    }

    #[test]
    fn filter_order_out_of_range() {
        for order in [0, 4] {
            let config = TrackerConfig::default().with_rotation(FilterConfig::new(order, 0.5));
            let err = config.validate().unwrap_err();
            assert!(matches!(err, CompensationError::OutOfRange { .. }));
            assert!(err.to_string().contains("rotation.order"));
        }
    }

    #[test]
    fn filter_strength_out_of_range() {
        let mut config = TrackerConfig::default();
        config.translation.strength = 1.5;
        assert!(config.validate().is_err());

        config.translation.strength = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn problems_reports_every_key() {
        let mut config = TrackerConfig::default()
            .with_translation(FilterConfig::new(9, -1.0).with_vertical_factor(-2.0));
        config.modifier.pitch = f32::INFINITY;
        config.sampler.interval = Duration::zero();

        let problems = config.problems();
        assert_eq!(problems.len(), 5);
    }

    #[test]
    fn stabilizer_factor_validation() {
        let config = StabilizerConfig::ema(0.5).with_factor(DofAxis::Yaw, -1.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("yaw"));

        assert!(StabilizerConfig::ema(1.2).validate().is_err());
    }

    #[test]
    fn zero_connection_timeout_rejected() {
        let config = TrackerConfig::default().with_connection_timeout(Duration::zero());
        assert!(matches!(
            config.validate(),
            Err(CompensationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn builders_set_fields() {
        let modifier = ModifierConfig::default()
            .with_rotation(0.0, 1.0, 0.5)
            .with_translation(1.0, 2.0, 0.0)
            .with_enabled(true);
        assert!(modifier.enabled);
        assert_eq!(modifier.pitch, 0.0);
        assert_eq!(modifier.heave, 2.0);

        let stabilizer = StabilizerConfig::windowed(StabilizerKind::Median, Duration::from_millis(20));
        assert_eq!(stabilizer.kind, StabilizerKind::Median);
        assert_eq!(stabilizer.window, Duration::from_millis(20));
    }
}
