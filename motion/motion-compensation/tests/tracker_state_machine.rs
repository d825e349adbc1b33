//! Integration tests for the calibration and activation state machine.
//!
//! Every tracker here reads synchronously so the outcome does not depend on
//! thread scheduling.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use approx::assert_relative_eq;
use motion_compensation::{
    ChannelSink, DofFeed, Event, FeedSource, FilterConfig, MemoryRecorder, ModifierConfig,
    PoseKind, ReplaySource, SamplerConfig, SharedRecorder, StabilizerKind, TracingSink,
    Tracker, TrackerConfig, TrackerState,
};
use motion_types::{DofAxis, DofSample, Duration, EulerAngles, Pose, Timestamp};
use parking_lot::Mutex;

// =============================================================================
// Helpers
// =============================================================================

fn ms(v: u64) -> Timestamp {
    Timestamp::from_millis(v)
}

fn sample(t: u64, axis: DofAxis, value: f64) -> DofSample {
    let mut sample = DofSample::zero(ms(t));
    sample.set(axis, value);
    sample
}

fn config() -> TrackerConfig {
    TrackerConfig::default()
        .with_translation(FilterConfig::new(1, 0.5))
        .with_rotation(FilterConfig::new(1, 0.5))
        .with_stabilizer_kind(StabilizerKind::PassThrough)
        .with_sampler(SamplerConfig::synchronous())
        .with_connection_timeout(Duration::from_millis(100))
}

fn replay_tracker(samples: Vec<DofSample>) -> (Tracker<ReplaySource>, Receiver<Event>) {
    let (sink, events) = ChannelSink::channel();
    (Tracker::new(config(), ReplaySource::new(samples), sink), events)
}

fn drain(events: &Receiver<Event>) -> Vec<Event> {
    events.try_iter().collect()
}

// =============================================================================
// Activation
// =============================================================================

#[test]
fn one_call_activation_with_reachable_source() {
    let (mut tracker, events) = replay_tracker(vec![DofSample::zero(ms(0))]);
    assert_eq!(tracker.state(), TrackerState::Uninitialized);

    assert!(tracker.toggle_active(ms(0)));
    assert_eq!(tracker.state(), TrackerState::Active);

    let status = tracker.status();
    assert!(status.initialized);
    assert!(status.calibrated);
    assert!(status.activated);
    assert!(!status.error);
    assert_eq!(drain(&events), vec![Event::Initialized, Event::Activated]);
}

#[test]
fn unreachable_source_leaves_both_flags_false() {
    let (sink, events) = ChannelSink::channel();
    let source = FeedSource::new(DofFeed::new()).with_retry_delay(Duration::zero());
    let mut tracker = Tracker::new(config(), source, sink);

    assert!(!tracker.toggle_active(ms(0)));
    let status = tracker.status();
    assert!(!status.calibrated);
    assert!(!status.activated);
    assert!(status.error);
    assert_eq!(drain(&events), vec![Event::Error]);
    assert!(tracker.get_pose_delta(ms(1)).is_none());
}

#[test]
fn second_toggle_deactivates_and_keeps_calibration() {
    let (mut tracker, events) = replay_tracker(vec![DofSample::zero(ms(0))]);
    assert!(tracker.toggle_active(ms(0)));
    assert!(!tracker.toggle_active(ms(5)));
    assert_eq!(tracker.state(), TrackerState::Calibrated);
    assert!(tracker.get_pose_delta(ms(6)).is_none());

    // reactivation does not recalibrate
    assert!(tracker.toggle_active(ms(7)));
    assert_eq!(
        drain(&events),
        vec![
            Event::Initialized,
            Event::Activated,
            Event::Deactivated,
            Event::Activated
        ]
    );
}

#[test]
fn invalid_configuration_blocks_activation() {
    let (sink, events) = ChannelSink::channel();
    let config = config().with_rotation(FilterConfig::new(2, 1.5));
    let mut tracker = Tracker::new(config, ReplaySource::new(vec![DofSample::zero(ms(0))]), sink);

    assert!(tracker.init().is_err());
    assert!(!tracker.toggle_active(ms(0)));
    assert_eq!(tracker.state(), TrackerState::Uninitialized);
    assert!(drain(&events).iter().all(|e| *e == Event::Error));
}

// =============================================================================
// Pose delta
// =============================================================================

#[test]
fn ramp_lag_decays_geometrically() {
    let ramp: Vec<DofSample> = (0..4)
        .map(|i| sample(i * 10, DofAxis::Sway, 0.01 * i as f64))
        .collect();
    let (mut tracker, _events) = replay_tracker(ramp);
    assert!(tracker.toggle_active(ms(0)));

    let expected: [f32; 4] = [0.0, 0.005, 0.0125, 0.021_25];
    for (i, want) in expected.iter().enumerate() {
        let t = i as u64 * 10;
        let delta = tracker.get_pose_delta(ms(t)).unwrap();
        // the delta undoes the filtered displacement
        assert_relative_eq!(-delta.position.x, *want, epsilon = 1e-6);

        // distance to the steady-state lag halves every frame
        let lag = 0.01 * i as f32 - want;
        let remaining = 0.01 - lag;
        assert_relative_eq!(remaining, 0.01 * 0.5_f32.powi(i as i32), epsilon = 1e-6);
    }
}

#[test]
fn rotation_delta_undoes_yaw() {
    let (mut tracker, _events) = replay_tracker(vec![
        DofSample::zero(ms(0)),
        sample(10, DofAxis::Yaw, 20.0),
    ]);
    tracker.set_rotation_strength(0.0);
    assert!(tracker.toggle_active(ms(0)));

    let delta = tracker.get_pose_delta(ms(10)).unwrap();
    let angles = EulerAngles::from_quat(delta.orientation);
    assert_relative_eq!(angles.yaw, -20.0_f32.to_radians(), epsilon = 1e-5);
    assert_relative_eq!(angles.pitch, 0.0, epsilon = 1e-5);
}

#[test]
fn modifier_scales_delta() {
    let mut config =
        config().with_modifier(ModifierConfig::default().with_translation(1.0, 0.5, 1.0));
    config.translation.strength = 0.0;
    let (sink, _events) = ChannelSink::channel();
    let source = ReplaySource::new(vec![
        DofSample::zero(ms(0)),
        sample(10, DofAxis::Heave, 0.04),
    ]);
    let mut tracker = Tracker::new(config, source, sink);

    assert!(tracker.toggle_active(ms(0)));
    let full = tracker.get_pose_delta(ms(10)).unwrap();
    assert_relative_eq!(full.position.y, -0.04, epsilon = 1e-6);

    assert!(tracker.toggle_modifier());
    assert!(tracker.status().modified);
    let half = tracker.get_pose_delta(ms(11)).unwrap();
    assert_relative_eq!(half.position.y, -0.02, epsilon = 1e-6);
}

#[test]
fn modifier_toggle_emits_events() {
    let (mut tracker, events) = replay_tracker(vec![DofSample::zero(ms(0))]);
    assert!(tracker.toggle_modifier());
    assert!(!tracker.toggle_modifier());
    assert_eq!(drain(&events), vec![Event::ModifierOn, Event::ModifierOff]);
    assert!(!tracker.config().modifier.enabled);
}

// =============================================================================
// Calibration loss and recovery
// =============================================================================

#[test]
fn invalidated_calibration_deactivates_lazily() {
    let (mut tracker, events) = replay_tracker(vec![DofSample::zero(ms(0))]);
    assert!(tracker.toggle_active(ms(0)));
    drain(&events);

    tracker.invalidate_calibration();
    // still flagged active until the next delta request
    assert!(tracker.is_active());
    assert!(tracker.get_pose_delta(ms(1)).is_none());
    assert!(!tracker.is_active());
    assert_eq!(tracker.state(), TrackerState::Uncalibrated);
    assert_eq!(drain(&events), vec![Event::CalibrationLost, Event::Deactivated]);
}

#[test]
fn requested_reset_recalibrates_before_delta() {
    let (mut tracker, events) = replay_tracker(vec![
        DofSample::zero(ms(0)),
        sample(10, DofAxis::Sway, 0.05),
    ]);
    assert!(tracker.toggle_active(ms(0)));
    drain(&events);

    tracker.request_reset();
    let delta = tracker.get_pose_delta(ms(10)).unwrap();
    assert!(delta.approx_eq(&Pose::identity(), 1e-6));
    assert_relative_eq!(tracker.reference_pose().unwrap().position.x, 0.05, epsilon = 1e-6);
    assert_eq!(drain(&events), vec![Event::Calibrated]);
}

#[test]
fn failed_recalibration_deactivates() {
    let (mut tracker, events) = replay_tracker(vec![sample(10, DofAxis::Sway, 0.0)]);
    assert!(tracker.toggle_active(ms(10)));
    drain(&events);

    assert!(!tracker.recalibrate(ms(5)));
    assert!(!tracker.is_active());
    assert!(tracker.status().error);
    assert_eq!(drain(&events), vec![Event::Deactivated, Event::Error]);
}

#[test]
fn connection_loss_after_timeout() {
    let feed = DofFeed::new();
    feed.connect();
    feed.publish(DofSample::zero(ms(0)));
    let (sink, events) = ChannelSink::channel();
    let source = FeedSource::new(feed.clone()).with_retry_delay(Duration::zero());
    let mut tracker = Tracker::new(config(), source, sink);
    assert!(tracker.toggle_active(ms(0)));
    drain(&events);

    feed.disconnect();
    assert!(tracker.get_pose_delta(ms(10)).is_none());
    assert!(tracker.get_pose_delta(ms(60)).is_none());
    assert!(tracker.is_active());
    assert!(drain(&events).is_empty());

    // 100 ms after the first failure
    assert!(tracker.get_pose_delta(ms(110)).is_none());
    assert!(!tracker.is_active());
    assert!(tracker.status().connection_lost);
    assert_eq!(drain(&events), vec![Event::ConnectionLost, Event::Deactivated]);

    feed.connect();
    feed.publish(DofSample::zero(ms(120)));
    assert!(tracker.toggle_active(ms(120)));
    assert!(tracker.get_pose_delta(ms(130)).is_some());
    assert!(!tracker.status().connection_lost);
    assert_eq!(drain(&events), vec![Event::Activated, Event::ConnectionRestored]);
}

#[test]
fn short_outage_is_bridged() {
    let feed = DofFeed::new();
    feed.connect();
    feed.publish(DofSample::zero(ms(0)));
    let (sink, events) = ChannelSink::channel();
    let mut tracker = Tracker::new(config(), FeedSource::new(feed.clone()), sink);
    assert!(tracker.toggle_active(ms(0)));
    drain(&events);

    feed.disconnect();
    assert!(tracker.get_pose_delta(ms(10)).is_none());
    feed.connect();
    feed.publish(DofSample::zero(ms(20)));
    assert!(tracker.get_pose_delta(ms(20)).is_some());

    // the failure clock restarted: a later outage gets the full timeout again
    feed.disconnect();
    assert!(tracker.get_pose_delta(ms(105)).is_none());
    assert!(tracker.get_pose_delta(ms(150)).is_none());
    assert!(tracker.is_active());
    assert!(drain(&events).is_empty());
}

// =============================================================================
// Invalid samples
// =============================================================================

fn feed_tracker() -> (DofFeed, Tracker<FeedSource>) {
    let feed = DofFeed::new();
    feed.connect();
    feed.publish(DofSample::zero(ms(0)));
    let mut tracker = Tracker::new(config(), FeedSource::new(feed.clone()), TracingSink);
    assert!(tracker.toggle_active(ms(0)));
    (feed, tracker)
}

#[test]
fn failed_read_is_retried_at_same_time() {
    let (feed, mut tracker) = feed_tracker();

    feed.publish(sample(10, DofAxis::Sway, f64::NAN));
    assert!(tracker.get_pose_delta(ms(10)).is_none());

    // the source recovers within the same frame
    feed.publish(sample(10, DofAxis::Sway, 0.02));
    let delta = tracker.get_pose_delta(ms(10)).unwrap();
    assert_relative_eq!(delta.position.x, -0.01, epsilon = 1e-6);
    assert_eq!(tracker.get_pose_delta(ms(10)), Some(delta));
}

#[test]
fn invalid_samples_never_reach_the_filter() {
    let (feed, mut tracker) = feed_tracker();

    feed.publish(sample(10, DofAxis::Sway, f64::NAN));
    assert!(tracker.get_pose_delta(ms(10)).is_none());
    feed.publish(sample(20, DofAxis::Heave, f64::MIN_POSITIVE / 2.0));
    assert!(tracker.get_pose_delta(ms(20)).is_none());
    feed.publish(sample(25, DofAxis::Yaw, f64::INFINITY));
    assert!(tracker.get_pose_delta(ms(25)).is_none());
    assert!(tracker.is_active());
    assert!(!tracker.status().connection_lost);

    feed.publish(sample(30, DofAxis::Sway, 0.02));
    let delta = tracker.get_pose_delta(ms(30)).unwrap();

    // same result as a tracker that never saw the bad samples
    let (clean_feed, mut clean) = feed_tracker();
    clean_feed.publish(sample(30, DofAxis::Sway, 0.02));
    let expected = clean.get_pose_delta(ms(30)).unwrap();

    assert_eq!(delta, expected);
    assert_relative_eq!(delta.position.x, -0.01, epsilon = 1e-6);
    assert!(delta.position.is_finite());
    assert!(delta.orientation.is_finite());
}

// =============================================================================
// Cache and recording
// =============================================================================

#[test]
fn cached_delta_matches_nearby_frames() {
    let (mut tracker, _events) = replay_tracker(vec![
        DofSample::zero(ms(0)),
        sample(10, DofAxis::Surge, 0.02),
    ]);
    assert!(tracker.toggle_active(ms(0)));
    assert!(tracker.cached_delta(ms(10)).is_none());

    let delta = tracker.get_pose_delta(ms(10)).unwrap();
    assert_eq!(tracker.cached_delta(ms(11)), Some(delta));

    tracker.clean_up(ms(20));
    assert!(tracker.cached_delta(ms(11)).is_none());
}

#[test]
fn recorder_captures_frames() {
    let memory = Arc::new(Mutex::new(MemoryRecorder::new()));
    let shared: SharedRecorder = memory.clone();
    let (sink, events) = ChannelSink::channel();
    let mut tracker = Tracker::new(
        config(),
        ReplaySource::new(vec![DofSample::zero(ms(0)), sample(10, DofAxis::Heave, 0.01)]),
        sink,
    )
    .with_recorder(shared);

    assert!(tracker.toggle_recorder());
    assert!(tracker.toggle_active(ms(0)));
    tracker.get_pose_delta(ms(10)).unwrap();
    assert!(!tracker.toggle_recorder());

    let recorder = memory.lock();
    assert_eq!(recorder.frame_count(), 1);
    let frame = recorder.frames().next().unwrap();
    assert_eq!(frame.time, ms(10));
    assert!(frame.read.is_some());
    for kind in [
        PoseKind::Unfiltered,
        PoseKind::Filtered,
        PoseKind::Modified,
        PoseKind::Reference,
    ] {
        assert!(frame.pose(kind).is_some(), "{kind:?} missing");
    }
    assert_eq!(
        drain(&events),
        vec![
            Event::RecorderOn,
            Event::Initialized,
            Event::Activated,
            Event::RecorderOff
        ]
    );
}

#[test]
fn shutdown_closes_session() {
    let (mut tracker, events) = replay_tracker(vec![DofSample::zero(ms(0))]);
    assert!(tracker.toggle_active(ms(0)));
    drain(&events);

    tracker.shutdown();
    assert!(!tracker.is_active());
    assert!(!tracker.status().initialized);
    assert_eq!(tracker.state(), TrackerState::Calibrated);
    assert_eq!(drain(&events), vec![Event::Deactivated]);

    // next toggle sets the session up again
    assert!(tracker.toggle_active(ms(5)));
    assert_eq!(drain(&events), vec![Event::Initialized, Event::Activated]);
}
