//! Pose sources and the calibration capability.
//!
//! A [`PoseSource`] hands out raw DOF samples for an instant. It is opened
//! once per session and reopened with a zero retry budget whenever sampling
//! stalls.

use std::sync::Arc;

use motion_types::{DofSample, Duration, Timestamp};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CompensationError, Result};

/// Something that can deliver raw DOF samples.
pub trait PoseSource: Send {
    /// Connects to the underlying device or channel.
    ///
    /// Up to `retry_budget` additional attempts are made after the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`CompensationError::SourceUnavailable`] if every attempt
    /// fails.
    fn open(&mut self, retry_budget: u32) -> Result<()>;

    /// Reads the sample for `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is closed, has no data or produced an
    /// invalid sample.
    fn read_raw(&mut self, time: Timestamp) -> Result<DofSample>;

    /// Returns true while the source is connected.
    fn is_open(&self) -> bool;

    /// Disconnects. Reading afterwards fails until the next `open`.
    fn close(&mut self) {}
}

impl<S: PoseSource + ?Sized> PoseSource for Box<S> {
    fn open(&mut self, retry_budget: u32) -> Result<()> {
        (**self).open(retry_budget)
    }

    fn read_raw(&mut self, time: Timestamp) -> Result<DofSample> {
        (**self).read_raw(time)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Something whose reference pose can be captured and dropped.
pub trait Calibratable {
    /// Captures the current pose as reference. Returns true on success.
    fn reset_reference_pose(&mut self, time: Timestamp) -> bool;

    /// Forgets the reference pose.
    fn invalidate_calibration(&mut self);

    /// Returns true while a reference pose is held.
    fn is_calibrated(&self) -> bool;
}

#[derive(Debug, Default)]
struct FeedState {
    connected: bool,
    latest: Option<DofSample>,
}

/// In-process channel where motion software publishes its DOF values.
///
/// The writer side calls [`connect`](Self::connect) and
/// [`publish`](Self::publish); a [`FeedSource`] reads the latest value.
/// Clones share the same channel.
///
/// # Example
///
/// ```
/// use motion_compensation::{DofFeed, FeedSource, PoseSource};
/// use motion_types::{DofSample, Timestamp};
///
/// let feed = DofFeed::new();
/// let mut source = FeedSource::new(feed.clone());
/// assert!(source.open(0).is_err());
///
/// feed.connect();
/// feed.publish(DofSample::zero(Timestamp::from_millis(1)));
/// source.open(0)?;
/// assert!(source.read_raw(Timestamp::from_millis(2)).is_ok());
/// # Ok::<(), motion_compensation::CompensationError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DofFeed {
    state: Arc<Mutex<FeedState>>,
}

impl DofFeed {
    /// Creates a feed with no writer connected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the writer as connected.
    pub fn connect(&self) {
        self.state.lock().connected = true;
    }

    /// Marks the writer as gone and drops the last value.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.latest = None;
    }

    /// Returns true while a writer is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Publishes a new sample.
    pub fn publish(&self, sample: DofSample) {
        self.state.lock().latest = Some(sample);
    }

    fn snapshot(&self) -> (bool, Option<DofSample>) {
        let state = self.state.lock();
        (state.connected, state.latest)
    }
}

/// Reads the latest value of a [`DofFeed`].
#[derive(Debug)]
pub struct FeedSource {
    feed: DofFeed,
    open: bool,
    max_age: Option<Duration>,
    retry_delay: Duration,
}

impl FeedSource {
    /// Creates a closed source on `feed`.
    #[must_use]
    pub const fn new(feed: DofFeed) -> Self {
        Self {
            feed,
            open: false,
            max_age: None,
            retry_delay: Duration::from_millis(1),
        }
    }

    /// Rejects samples older than `max_age` relative to the read time.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets the pause between open attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl PoseSource for FeedSource {
    fn open(&mut self, retry_budget: u32) -> Result<()> {
        for attempt in 0..=retry_budget {
            if self.feed.is_connected() {
                self.open = true;
                info!(attempt, "DOF feed opened");
                return Ok(());
            }
            if attempt < retry_budget {
                std::thread::sleep(self.retry_delay.to_std());
            }
        }
        self.open = false;
        debug!(retry_budget, "DOF feed has no writer");
        Err(CompensationError::source_unavailable("no writer connected to DOF feed"))
    }

    fn read_raw(&mut self, time: Timestamp) -> Result<DofSample> {
        if !self.open {
            return Err(CompensationError::source_unavailable("DOF feed is not open"));
        }
        let (connected, latest) = self.feed.snapshot();
        if !connected {
            self.open = false;
            warn!("DOF feed writer disconnected");
            return Err(CompensationError::source_unavailable("DOF feed writer disconnected"));
        }
        let sample = latest.ok_or_else(|| CompensationError::no_data("nothing published yet"))?;
        if let Some(max_age) = self.max_age {
            let age = time.saturating_duration_since(sample.timestamp);
            if age > max_age {
                return Err(CompensationError::no_data(format!(
                    "latest sample is {age} old, limit {max_age}"
                )));
            }
        }
        Ok(sample.validated()?)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Replays a recorded sequence of samples.
///
/// A read returns the last sample at or before the requested time.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<DofSample>,
    open: bool,
}

impl ReplaySource {
    /// Creates a source from samples in any order.
    #[must_use]
    pub fn new(mut samples: Vec<DofSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self {
            samples,
            open: false,
        }
    }

    /// Number of recorded samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl PoseSource for ReplaySource {
    fn open(&mut self, _retry_budget: u32) -> Result<()> {
        if self.samples.is_empty() {
            return Err(CompensationError::source_unavailable("replay has no samples"));
        }
        self.open = true;
        Ok(())
    }

    fn read_raw(&mut self, time: Timestamp) -> Result<DofSample> {
        if !self.open {
            return Err(CompensationError::source_unavailable("replay is not open"));
        }
        let idx = self.samples.partition_point(|s| s.timestamp <= time);
        let sample = idx
            .checked_sub(1)
            .and_then(|i| self.samples.get(i))
            .ok_or_else(|| CompensationError::no_data(format!("replay starts after {time}")))?;
        Ok(sample.validated()?)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}
