//! Integration tests for the background sampler.
//!
//! These run a real sampling thread. Assertions only rely on ordering
//! guarantees (start, stop, join), never on exact tick counts.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use motion_compensation::{
    DofFeed, FeedSource, Sampler, SamplerConfig, Stabilizer, StabilizerConfig, StabilizerKind,
    Tracker, TrackerConfig, TracingSink,
};
use motion_types::{DofAxis, DofSample, Duration, Timestamp};

fn passthrough() -> Arc<Stabilizer> {
    Arc::new(Stabilizer::new(&StabilizerConfig::windowed(
        StabilizerKind::PassThrough,
        Duration::zero(),
    )))
}

fn live_feed() -> DofFeed {
    let feed = DofFeed::new();
    feed.connect();
    feed.publish(DofSample::zero(Timestamp::zero()));
    feed
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + std::time::Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(std::time::Duration::from_millis(1));
    }
    condition()
}

#[test]
fn sampler_feeds_stabilizer() {
    let feed = live_feed();
    let stabilizer = passthrough();
    let mut sampler = Sampler::new(
        FeedSource::new(feed.clone()),
        Arc::clone(&stabilizer),
        &SamplerConfig::default(),
    );
    sampler.open_and_start(0).unwrap();
    assert!(sampler.is_sampling());

    let mut sample = DofSample::zero(Timestamp::zero());
    sample.set(DofAxis::Heave, 0.25);
    feed.publish(sample);

    assert!(wait_until(|| {
        stabilizer
            .stabilize()
            .is_some_and(|s| s.get(DofAxis::Heave) == 0.25)
    }));
    sampler.stop();
}

#[test]
fn no_insert_after_stop() {
    let stabilizer = passthrough();
    let mut sampler = Sampler::new(
        FeedSource::new(live_feed()),
        Arc::clone(&stabilizer),
        &SamplerConfig::default().with_interval(Duration::from_millis(1)),
    );
    sampler.open_and_start(0).unwrap();
    let first = stabilizer.window_range().unwrap().1;
    assert!(wait_until(|| stabilizer.window_range().unwrap().1 > first));

    sampler.stop();
    assert!(!sampler.is_sampling());
    let stopped_at = stabilizer.window_range();
    thread::sleep(std::time::Duration::from_millis(10));
    assert_eq!(stabilizer.window_range(), stopped_at);
}

#[test]
fn read_failure_stops_worker_and_query_reconnects() {
    let feed = live_feed();
    let mut sampler = Sampler::new(
        FeedSource::new(feed.clone()).with_retry_delay(Duration::zero()),
        passthrough(),
        &SamplerConfig::default(),
    );
    sampler.open_and_start(0).unwrap();

    feed.disconnect();
    assert!(wait_until(|| !sampler.is_sampling()));
    assert!(sampler.read_data(Timestamp::zero()).is_err());
    assert!(!sampler.is_sampling());

    feed.connect();
    feed.publish(DofSample::zero(Timestamp::zero()));
    assert!(sampler.read_data(Timestamp::zero()).is_ok());
    assert!(sampler.is_sampling());
    sampler.stop();
}

#[test]
fn drop_joins_worker() {
    let stabilizer = passthrough();
    let mut sampler = Sampler::new(
        FeedSource::new(live_feed()),
        Arc::clone(&stabilizer),
        &SamplerConfig::default(),
    );
    sampler.open_and_start(0).unwrap();
    assert!(Arc::strong_count(&stabilizer) > 2);

    drop(sampler);
    // the worker's handle on the stabilizer is gone once it has been joined
    assert_eq!(Arc::strong_count(&stabilizer), 1);
}

#[test]
fn tracker_runs_with_background_sampling() {
    let feed = live_feed();
    let config = TrackerConfig::default().with_stabilizer_kind(StabilizerKind::PassThrough);
    let mut tracker = Tracker::new(config, FeedSource::new(feed.clone()), TracingSink);

    assert!(tracker.toggle_active(Timestamp::zero()));
    assert!(tracker.sampler().is_sampling());

    let mut sample = DofSample::zero(Timestamp::zero());
    sample.set(DofAxis::Sway, 0.1);
    feed.publish(sample);
    assert!(wait_until(|| {
        tracker
            .sampler()
            .stabilizer()
            .stabilize()
            .is_some_and(|s| s.get(DofAxis::Sway) == 0.1)
    }));

    let delta = tracker.get_pose_delta(Timestamp::from_millis(16)).unwrap();
    assert!(delta.position.x < 0.0);

    tracker.shutdown();
    assert!(!tracker.sampler().is_sampling());
    assert!(!tracker.is_active());
}
