//! Error types for the motion-compensation crate.

use motion_types::TypesError;
use thiserror::Error;

/// Errors that can occur while setting up or feeding the compensation
/// pipeline.
///
/// Frame-path operations never surface these directly. They log and return
/// "no correction" instead, so only setup calls (`init`, `open`, `validate`)
/// hand them to the caller.
#[derive(Debug, Error)]
pub enum CompensationError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration value outside its allowed range.
    #[error("configuration value {key} = {value} not in [{min}, {max}]")]
    OutOfRange {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// The pose source cannot deliver data.
    #[error("pose source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source delivered an unusable sample.
    #[error("invalid sample: {0}")]
    InvalidSample(#[from] TypesError),

    /// No data has been produced yet.
    #[error("no data: {0}")]
    NoData(String),

    /// Operation requires a successful `init()`.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// I/O failure while spawning the sampler or exporting a recording.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompensationError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates an out-of-range configuration error.
    #[must_use]
    pub fn out_of_range(key: impl Into<String>, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            key: key.into(),
            value,
            min,
            max,
        }
    }

    /// Creates a source unavailable error.
    #[must_use]
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable(reason.into())
    }

    /// Creates a no data error.
    #[must_use]
    pub fn no_data(reason: impl Into<String>) -> Self {
        Self::NoData(reason.into())
    }

    /// Creates a not initialized error.
    #[must_use]
    pub fn not_initialized(reason: impl Into<String>) -> Self {
        Self::NotInitialized(reason.into())
    }
}

/// Result type for compensation operations.
pub type Result<T> = std::result::Result<T, CompensationError>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use motion_types::DofAxis;

    #[test]
    fn error_invalid_config() {
        let err = CompensationError::invalid_config("unknown stabilizer");
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn error_out_of_range() {
        let err = CompensationError::out_of_range("translation.order", 4.0, 1.0, 3.0);
        let msg = err.to_string();
        assert!(msg.contains("translation.order"));
        assert!(msg.contains('4'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn error_source_unavailable() {
        let err = CompensationError::source_unavailable("no writer connected");
        assert!(err.to_string().contains("pose source unavailable"));
        assert!(err.to_string().contains("no writer"));
    }

    #[test]
    fn error_from_types_error() {
        let err: CompensationError = TypesError::invalid_sample(DofAxis::Heave, f64::NAN).into();
        assert!(matches!(err, CompensationError::InvalidSample(_)));
        assert!(err.to_string().contains("heave"));
    }

    #[test]
    fn error_no_data_and_not_initialized() {
        assert!(CompensationError::no_data("empty").to_string().contains("no data"));
        assert!(
            CompensationError::not_initialized("tracker")
                .to_string()
                .contains("not initialized")
        );
    }
}
