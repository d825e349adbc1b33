//! Core data types for motion-compensated head tracking.
//!
//! This crate provides the value types shared by the compensation pipeline:
//! - [`Timestamp`] and [`Duration`] on a single nanosecond timeline
//! - [`Pose`] rigid transforms with quaternion orientation
//! - [`DofSample`] six-channel readings from a motion platform
//!
//! # Layer 0 Crate
//!
//! Nothing here does I/O or spawns threads. The types can be used by
//! platform drivers, replay tools and the compensation core alike.
//!
//! # Conventions
//!
//! Poses live in a right-handed, Y-up frame with -Z pointing forward.
//! Translational DOF channels are meters, rotational channels are degrees.
//! See [`DofSample::to_pose`] for the exact mapping.
//!
//! # Example
//!
//! ```
//! use motion_types::{DofAxis, DofSample, Pose, Timestamp};
//!
//! let mut sample = DofSample::zero(Timestamp::from_millis(1));
//! sample.set(DofAxis::Surge, 0.05);
//!
//! let pose = sample.to_pose();
//! assert!(pose.position.z < 0.0);
//! assert!(pose.is_valid());
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod dof;
mod error;
mod pose;
mod time;

// Re-export core types
pub use dof::{DofAxis, DofSample};
pub use error::TypesError;
pub use pose::{EulerAngles, Pose};
pub use time::{Duration, Timestamp};

// Re-exported so callers build poses with the same math types.
pub use glam::{Quat, Vec3};
