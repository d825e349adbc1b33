//! Error types for motion data.

use thiserror::Error;

use crate::dof::DofAxis;

/// Errors that can occur when validating motion data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Pose with `NaN`, infinite or denormal components, or a degenerate
    /// orientation.
    #[error("invalid pose: {0}")]
    InvalidPose(String),

    /// A DOF channel holds an unusable value.
    #[error("invalid sample: {axis} = {value}")]
    InvalidSample {
        /// Offending channel.
        axis: DofAxis,
        /// Value read on that channel.
        value: f64,
    },
}

impl TypesError {
    /// Creates an invalid pose error.
    #[must_use]
    pub fn invalid_pose(detail: impl Into<String>) -> Self {
        Self::InvalidPose(detail.into())
    }

    /// Creates an invalid sample error.
    #[must_use]
    pub const fn invalid_sample(axis: DofAxis, value: f64) -> Self {
        Self::InvalidSample { axis, value }
    }
}
