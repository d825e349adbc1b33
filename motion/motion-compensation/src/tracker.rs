//! Calibration and activation state machine.
//!
//! The [`Tracker`] ties the pipeline together. Once per frame the render
//! thread asks it for the pose delta that cancels the rig's motion:
//!
//! ```text
//! source -> sampler -> stabilizer -> filter chain -> modifier -> delta
//! ```
//!
//! The delta is only produced while the tracker is calibrated (a reference
//! pose is held) and active. Acquisition failures never surface as errors
//! on the frame path; the tracker returns no correction and, if the source
//! stays silent for longer than the connection timeout, deactivates itself.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use motion_types::{Pose, Timestamp};
use tracing::{debug, error, info, warn};

use crate::cache::PoseCache;
use crate::config::TrackerConfig;
use crate::error::{CompensationError, Result};
use crate::event::{Event, EventSink, TrackerStatus};
use crate::filter::{FilterChain, clamp_strength};
use crate::modifier::PoseModifier;
use crate::recorder::{DofKind, PoseKind, Recorder, SharedRecorder};
use crate::sampler::Sampler;
use crate::source::{Calibratable, PoseSource};
use crate::stabilizer::Stabilizer;

/// Coarse tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerState {
    /// `init` has not succeeded yet.
    Uninitialized,
    /// No reference pose is held.
    Uncalibrated,
    /// A reference pose is held but compensation is off.
    Calibrated,
    /// Compensation is on. Implies calibrated.
    Active,
}

/// Computes per-frame pose deltas relative to a calibrated reference.
///
/// # Example
///
/// ```
/// use motion_compensation::{
///     ChannelSink, Event, ReplaySource, SamplerConfig, StabilizerKind, Tracker, TrackerConfig,
/// };
/// use motion_types::{DofSample, Timestamp};
///
/// let source = ReplaySource::new(vec![DofSample::zero(Timestamp::zero())]);
/// let config = TrackerConfig::default()
///     .with_stabilizer_kind(StabilizerKind::PassThrough)
///     .with_sampler(SamplerConfig::synchronous());
/// let (sink, events) = ChannelSink::channel();
///
/// let mut tracker = Tracker::new(config, source, sink);
/// assert!(tracker.toggle_active(Timestamp::zero()));
/// assert!(tracker.get_pose_delta(Timestamp::from_millis(11)).is_some());
/// assert!(events.try_iter().any(|e| e == Event::Activated));
/// ```
pub struct Tracker<S: PoseSource + 'static> {
    config: TrackerConfig,
    sampler: Sampler<S>,
    filter: Option<FilterChain>,
    modifier: PoseModifier,
    reference: Option<Pose>,
    initialized: bool,
    session_ready: bool,
    calibrated: bool,
    active: bool,
    reset_requested: bool,
    connection_lost: bool,
    error: bool,
    // configuration problems already logged
    reported: HashSet<String>,
    failure_since: Option<Timestamp>,
    last_delta: Option<(Timestamp, Pose)>,
    deltas: PoseCache<Pose>,
    events: Box<dyn EventSink>,
    recorder: Option<SharedRecorder>,
}

impl<S: PoseSource + 'static> fmt::Debug for Tracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("state", &self.state())
            .field("status", &self.status())
            .field("reference", &self.reference)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}

impl<S: PoseSource + 'static> Tracker<S> {
    /// Creates an uninitialized tracker.
    ///
    /// Nothing is validated or opened until [`init`](Self::init) or
    /// [`lazy_init`](Self::lazy_init).
    #[must_use]
    pub fn new(config: TrackerConfig, source: S, events: impl EventSink + 'static) -> Self {
        let stabilizer = Arc::new(Stabilizer::new(&config.stabilizer));
        let sampler = Sampler::new(source, stabilizer, &config.sampler);
        Self {
            modifier: PoseModifier::new(&config.modifier),
            deltas: PoseCache::from_config(&config.cache),
            config,
            sampler,
            filter: None,
            reference: None,
            initialized: false,
            session_ready: false,
            calibrated: false,
            active: false,
            reset_requested: false,
            connection_lost: false,
            error: false,
            reported: HashSet::new(),
            failure_since: None,
            last_delta: None,
            events: Box::new(events),
            recorder: None,
        }
    }

    /// Attaches a recorder, shared with the sampler.
    #[must_use]
    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.sampler.set_recorder(Some(Arc::clone(&recorder)));
        self.recorder = Some(recorder);
        self
    }

    /// Returns the configuration, including strengths changed at runtime.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns the sampler.
    #[must_use]
    pub const fn sampler(&self) -> &Sampler<S> {
        &self.sampler
    }

    /// Returns the pose modifier.
    #[must_use]
    pub const fn modifier(&self) -> &PoseModifier {
        &self.modifier
    }

    /// Returns the reference pose of the last successful calibration.
    #[must_use]
    pub const fn reference_pose(&self) -> Option<Pose> {
        self.reference
    }

    /// Validates the configuration and builds the filter chain.
    ///
    /// Every invalid value is logged, each distinct problem once per
    /// tracker. Calling this again after success does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let mut problems = self.config.problems().into_iter();
        if let Some(first) = problems.next() {
            for problem in std::iter::once(&first).chain(problems.as_slice()) {
                if self.reported.insert(problem.to_string()) {
                    error!(error = %problem, "invalid configuration");
                }
            }
            self.fail();
            return Err(first);
        }

        self.filter = Some(FilterChain::new(
            &self.config.translation,
            &self.config.rotation,
        )?);
        self.modifier = PoseModifier::new(&self.config.modifier);
        self.initialized = true;
        info!("tracker initialized");
        Ok(())
    }

    /// Runs session setup once: opens the source and starts sampling.
    ///
    /// Calls [`init`](Self::init) first if needed. Returns true once the
    /// session is ready; later calls return true without doing anything.
    pub fn lazy_init(&mut self, time: Timestamp) -> bool {
        if self.session_ready {
            return true;
        }
        if self.init().is_err() {
            return false;
        }

        match self.sampler.open_and_start(self.config.sampler.open_retries) {
            Ok(()) => {
                self.session_ready = true;
                self.error = false;
                info!(%time, "tracking session ready");
                self.events.emit(Event::Initialized);
                true
            }
            Err(err) => {
                error!(%time, error = %err, "tracking session setup failed");
                self.fail();
                false
            }
        }
    }

    /// Captures the current pose as reference.
    ///
    /// On success the filter chain is re-seeded to the new reference. On
    /// failure the previous reference is kept but the tracker counts as
    /// uncalibrated.
    pub fn reset_reference_pose(&mut self, time: Timestamp) -> bool {
        if self.init().is_err() {
            self.calibrated = false;
            return false;
        }

        let Some(pose) = self.read_pose(time) else {
            warn!(%time, "reference pose unavailable");
            self.calibrated = false;
            return false;
        };

        self.reference = Some(pose);
        if let Some(filter) = self.filter.as_mut() {
            filter.reset(&pose);
        }
        self.calibrated = true;
        self.last_delta = None;
        self.deltas.clear();
        self.record(|r| r.add_pose(&pose, PoseKind::Reference));
        info!(%time, position = ?pose.position, "reference pose captured");
        true
    }

    /// Switches compensation on or off and returns the new state.
    ///
    /// An uncalibrated tracker captures a reference first and only
    /// activates if that succeeds. A failed activation leaves the tracker
    /// off and emits [`Event::Error`].
    pub fn toggle_active(&mut self, time: Timestamp) -> bool {
        self.last_delta = None;
        if !self.lazy_init(time) {
            self.active = false;
            return false;
        }

        if self.calibrated {
            self.active = !self.active;
            self.events.emit(if self.active {
                Event::Activated
            } else {
                Event::Deactivated
            });
        } else if self.reset_reference_pose(time) {
            self.active = true;
            self.error = false;
            self.events.emit(Event::Activated);
        } else {
            self.active = false;
            self.fail();
        }

        info!(%time, active = self.active, "compensation toggled");
        self.active
    }

    /// Drops the calibration.
    ///
    /// An active tracker is switched off on the next
    /// [`get_pose_delta`](Self::get_pose_delta).
    pub fn invalidate_calibration(&mut self) {
        if self.calibrated {
            info!("calibration invalidated");
            self.events.emit(Event::CalibrationLost);
        }
        self.calibrated = false;
        self.last_delta = None;
    }

    /// Captures a new reference pose and reports the outcome as an event.
    ///
    /// A failure switches compensation off.
    pub fn recalibrate(&mut self, time: Timestamp) -> bool {
        if self.reset_reference_pose(time) {
            self.error = false;
            self.events.emit(Event::Calibrated);
            return true;
        }
        if self.active {
            self.active = false;
            self.events.emit(Event::Deactivated);
        }
        self.fail();
        false
    }

    /// Recalibrates on the next [`get_pose_delta`](Self::get_pose_delta).
    pub fn request_reset(&mut self) {
        debug!("reference reset requested");
        self.reset_requested = true;
    }

    /// Returns the pose delta that cancels the rig motion at `time`.
    ///
    /// The delta maps the filtered (and modified) current pose back onto the
    /// reference pose. Returns `None` unless the tracker is calibrated and
    /// active, or when no valid pose can be read.
    ///
    /// A computed delta is memoized per exact `time` and added to the delta
    /// cache. A failed read is not memoized, so asking again for the same
    /// `time` retries the source. Hosts should call
    /// [`clean_up`](Self::clean_up) once per frame to keep the cache bounded.
    pub fn get_pose_delta(&mut self, time: Timestamp) -> Option<Pose> {
        if let Some((memo_time, delta)) = self.last_delta {
            if memo_time == time {
                return Some(delta);
            }
        }

        if self.reset_requested {
            self.reset_requested = false;
            self.recalibrate(time);
        }

        if self.active && !self.calibrated {
            self.active = false;
            info!(%time, "deactivated: calibration lost");
            self.events.emit(Event::Deactivated);
        }
        if !self.active {
            return None;
        }
        let reference = self.reference?;

        self.record(|r| r.add_frame_time(time));
        let delta = self
            .read_pose(time)
            .and_then(|raw| self.compensate(&raw, &reference));

        if let Some(delta) = delta {
            self.last_delta = Some((time, delta));
            self.deltas.add_sample(time, delta, true);
        }
        self.record(|r| {
            if let Err(err) = r.write() {
                debug!(error = %err, "recorder write failed");
            }
        });
        delta
    }

    /// Returns the delta computed closest to `time`.
    ///
    /// Used when a frame is composed at a slightly different instant than
    /// the one its delta was computed for. Every computed delta stays cached
    /// until [`clean_up`](Self::clean_up) passes it.
    #[must_use]
    pub fn cached_delta(&self, time: Timestamp) -> Option<Pose> {
        self.deltas.nearest(time).map(|m| m.value)
    }

    /// Drops cached deltas that can no longer be matched at `time`.
    ///
    /// Call once per frame, typically when the frame ends.
    pub fn clean_up(&self, time: Timestamp) {
        self.deltas.clean_up(time);
    }

    /// Returns the coarse state.
    #[must_use]
    pub const fn state(&self) -> TrackerState {
        if !self.initialized {
            TrackerState::Uninitialized
        } else if self.active {
            TrackerState::Active
        } else if self.calibrated {
            TrackerState::Calibrated
        } else {
            TrackerState::Uncalibrated
        }
    }

    /// Returns every status flag.
    #[must_use]
    pub const fn status(&self) -> TrackerStatus {
        TrackerStatus {
            initialized: self.session_ready,
            calibrated: self.calibrated,
            activated: self.active,
            connection_lost: self.connection_lost,
            error: self.error,
            modified: self.modifier.is_active(),
        }
    }

    /// Returns true while compensation is on.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Sets the translation filter strength and returns the clamped value.
    pub fn set_translation_strength(&mut self, strength: f32) -> f32 {
        let clamped = match self.filter.as_mut() {
            Some(filter) => filter.set_translation_strength(strength),
            None => clamp_strength(strength),
        };
        self.config.translation.strength = clamped;
        clamped
    }

    /// Sets the rotation filter strength and returns the clamped value.
    pub fn set_rotation_strength(&mut self, strength: f32) -> f32 {
        let clamped = match self.filter.as_mut() {
            Some(filter) => filter.set_rotation_strength(strength),
            None => clamp_strength(strength),
        };
        self.config.rotation.strength = clamped;
        clamped
    }

    /// Switches the pose modifier and returns its new state.
    pub fn toggle_modifier(&mut self) -> bool {
        let on = !self.modifier.is_active();
        self.modifier.set_active(on);
        self.config.modifier.enabled = on;
        self.last_delta = None;
        self.events.emit(if on {
            Event::ModifierOn
        } else {
            Event::ModifierOff
        });
        on
    }

    /// Sets the forward frame used by the pose modifier.
    pub fn set_forward_pose(&mut self, forward: &Pose) {
        self.modifier.set_forward(forward);
        self.last_delta = None;
    }

    /// Switches the recorder and returns its new state.
    ///
    /// Returns false if no recorder is attached.
    pub fn toggle_recorder(&mut self) -> bool {
        let Some(recorder) = &self.recorder else {
            warn!("no recorder attached");
            return false;
        };
        let on = recorder.lock().toggle();
        self.events.emit(if on {
            Event::RecorderOn
        } else {
            Event::RecorderOff
        });
        on
    }

    /// Stops sampling and closes the source.
    ///
    /// The next [`lazy_init`](Self::lazy_init) sets the session up again.
    /// Calibration is kept.
    pub fn shutdown(&mut self) {
        self.sampler.stop();
        self.sampler.source().lock().close();
        if self.active {
            self.events.emit(Event::Deactivated);
        }
        self.active = false;
        self.session_ready = false;
        self.last_delta = None;
        info!("tracking session closed");
    }

    /// Reads one validated pose and tracks connection health.
    fn read_pose(&mut self, time: Timestamp) -> Option<Pose> {
        let read = self.sampler.read_data(time).and_then(|sample| {
            let sample = sample.validated()?;
            let pose = sample.to_pose().validated()?;
            Ok((sample, pose))
        });

        match read {
            Ok((sample, pose)) => {
                self.failure_since = None;
                if self.connection_lost {
                    self.connection_lost = false;
                    info!(%time, "connection restored");
                    self.events.emit(Event::ConnectionRestored);
                }
                self.record(|r| {
                    r.add_dof_values(&sample, DofKind::Read);
                    r.add_pose(&pose, PoseKind::Unfiltered);
                });
                Some(pose)
            }
            Err(err) => {
                self.acquisition_failed(time, &err);
                None
            }
        }
    }

    fn acquisition_failed(&mut self, time: Timestamp, err: &CompensationError) {
        let since = *self.failure_since.get_or_insert(time);
        let elapsed = time.saturating_duration_since(since);
        debug!(%time, %elapsed, error = %err, "pose acquisition failed");

        if self.connection_lost || elapsed < self.config.connection_timeout {
            return;
        }
        self.connection_lost = true;
        warn!(%time, %elapsed, "connection lost");
        self.events.emit(Event::ConnectionLost);
        if self.active {
            self.active = false;
            self.events.emit(Event::Deactivated);
        }
    }

    fn compensate(&mut self, raw: &Pose, reference: &Pose) -> Option<Pose> {
        let filter = self.filter.as_mut()?;
        let filtered = filter.filter(raw);
        let modified = self.modifier.apply(&filtered, reference);
        let delta = modified.inverse().then(reference).normalized();

        self.record(|r| {
            r.add_pose(&filtered, PoseKind::Filtered);
            r.add_pose(&modified, PoseKind::Modified);
            r.add_pose(reference, PoseKind::Reference);
        });
        Some(delta)
    }

    fn fail(&mut self) {
        self.error = true;
        self.events.emit(Event::Error);
    }

    fn record(&self, f: impl FnOnce(&mut dyn Recorder)) {
        if let Some(recorder) = &self.recorder {
            f(&mut *recorder.lock());
        }
    }
}

impl<S: PoseSource + 'static> Calibratable for Tracker<S> {
    fn reset_reference_pose(&mut self, time: Timestamp) -> bool {
        Tracker::reset_reference_pose(self, time)
    }

    fn invalidate_calibration(&mut self) {
        Tracker::invalidate_calibration(self);
    }

    fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}
