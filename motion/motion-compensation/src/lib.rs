//! Motion compensation for VR on motion simulators.
//!
//! A motion rig moves the seat, and with it the headset. This crate
//! computes, once per frame, the pose delta that cancels that movement so
//! the virtual scene stays put while the seat moves.
//!
//! # Pipeline
//!
//! - [`PoseSource`] - Raw six-DOF samples from the rig (or a tracker)
//! - [`Sampler`] - Background thread reading the source at a fixed cadence
//! - [`Stabilizer`] - Windowed order statistics that remove jitter
//! - [`FilterChain`] - Cascaded EMA / SLERP smoothing of the pose
//! - [`PoseModifier`] - Optional per-axis gain on the compensated motion
//! - [`Tracker`] - Calibration and activation state machine
//!
//! # Support
//!
//! - [`PoseCache`] - Time-indexed lookup with tolerance
//! - [`Recorder`] - Optional capture of values and poses for analysis
//! - [`EventSink`] - Fire-and-forget notifications for user feedback
//!
//! # Threading
//!
//! The tracker is driven from the render thread through `&mut self`. The
//! only other thread is the sampler's; it shares nothing with the render
//! thread except the internally locked [`Stabilizer`] and the source.
//!
//! # Example
//!
//! ```
//! use motion_compensation::{
//!     DofFeed, FeedSource, SamplerConfig, StabilizerKind, Tracker, TrackerConfig, TracingSink,
//! };
//! use motion_types::{DofAxis, DofSample, Timestamp};
//!
//! // the motion software publishes its DOF values here
//! let feed = DofFeed::new();
//! feed.connect();
//! feed.publish(DofSample::zero(Timestamp::zero()));
//!
//! let config = TrackerConfig::default()
//!     .with_stabilizer_kind(StabilizerKind::PassThrough)
//!     .with_sampler(SamplerConfig::synchronous());
//! let mut tracker = Tracker::new(config, FeedSource::new(feed.clone()), TracingSink);
//!
//! // first activation captures the reference pose
//! assert!(tracker.toggle_active(Timestamp::zero()));
//!
//! let mut sample = DofSample::zero(Timestamp::from_millis(10));
//! sample.set(DofAxis::Heave, 0.05);
//! feed.publish(sample);
//!
//! let delta = tracker.get_pose_delta(Timestamp::from_millis(11)).unwrap();
//! // the rig moved up, so the correction moves down
//! assert!(delta.position.y < 0.0);
//! ```
//!
//! # Quality Standards
//!
//! - Zero clippy/doc warnings
//! - Zero `unwrap`/`expect` in library code

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod cache;
mod config;
mod error;
mod event;
mod filter;
mod modifier;
mod recorder;
mod sampler;
mod source;
mod stabilizer;
mod tracker;

// Re-export configuration types
pub use config::{
    CacheConfig, FilterConfig, ModifierConfig, SamplerConfig, StabilizerConfig, StabilizerKind,
    TrackerConfig,
};

// Re-export filter types
pub use filter::{EmaFilter, FilterChain, FilterOrder, SlerpFilter};

// Re-export stabilization types
pub use stabilizer::{Stabilizer, ema_cutoff, wrap_degrees};

// Re-export cache types
pub use cache::{CacheMatch, MatchKind, PoseCache};

// Re-export source types
pub use source::{Calibratable, DofFeed, FeedSource, PoseSource, ReplaySource};

// Re-export sampling and tracking types
pub use modifier::PoseModifier;
pub use sampler::Sampler;
pub use tracker::{Tracker, TrackerState};

// Re-export recording and event types
pub use event::{ChannelSink, Event, EventSink, TracingSink, TrackerStatus};
pub use recorder::{DofKind, FrameRow, MAX_ROWS, MemoryRecorder, PoseKind, Recorder, SharedRecorder};

// Re-export error types
pub use error::{CompensationError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        Calibratable, CompensationError, DofFeed, Event, EventSink, FeedSource, FilterChain,
        FilterConfig, PoseCache, PoseModifier, PoseSource, ReplaySource, Sampler, Stabilizer,
        StabilizerKind, Tracker, TrackerConfig, TrackerState,
    };
}
