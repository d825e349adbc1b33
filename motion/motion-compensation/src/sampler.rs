//! Background sampling of the pose source.
//!
//! Motion software updates its output far more often than the headset
//! renders. A dedicated thread reads the source at a fixed interval and
//! feeds the stabilizer, so the render thread only ever reads a ready
//! estimate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use motion_types::{DofSample, Duration, Timestamp};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SamplerConfig;
use crate::error::{CompensationError, Result};
use crate::recorder::{DofKind, SharedRecorder};
use crate::source::PoseSource;
use crate::stabilizer::Stabilizer;

/// Monotonic time since the sampler was created.
#[derive(Debug, Clone, Copy)]
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now(self) -> Timestamp {
        Timestamp::from_nanos(Duration::from(self.epoch.elapsed()).as_nanos())
    }
}

/// Reads a [`PoseSource`] into a [`Stabilizer`].
///
/// In background mode a worker thread reads every `interval`. In
/// synchronous mode each [`read_data`](Self::read_data) call reads the
/// source once on the caller's thread.
///
/// Dropping the sampler stops the worker.
pub struct Sampler<S: PoseSource + 'static> {
    source: Arc<Mutex<S>>,
    stabilizer: Arc<Stabilizer>,
    recorder: Option<SharedRecorder>,
    config: SamplerConfig,
    clock: Clock,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<S: PoseSource + 'static> std::fmt::Debug for Sampler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("config", &self.config)
            .field("running", &self.is_sampling())
            .finish_non_exhaustive()
    }
}

impl<S: PoseSource + 'static> Sampler<S> {
    /// Creates a stopped sampler.
    #[must_use]
    pub fn new(source: S, stabilizer: Arc<Stabilizer>, config: &SamplerConfig) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            stabilizer,
            recorder: None,
            config: *config,
            clock: Clock::new(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Records every sample taken.
    ///
    /// Takes effect the next time the worker is started.
    pub fn set_recorder(&mut self, recorder: Option<SharedRecorder>) {
        self.recorder = recorder;
    }

    /// Returns the stabilizer fed by this sampler.
    #[must_use]
    pub fn stabilizer(&self) -> &Arc<Stabilizer> {
        &self.stabilizer
    }

    /// Returns the shared source.
    #[must_use]
    pub fn source(&self) -> &Arc<Mutex<S>> {
        &self.source
    }

    /// Returns the configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Returns true if the worker thread is running.
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Opens the source with the given retry budget.
    ///
    /// # Errors
    ///
    /// Returns the source's error if it cannot be opened.
    pub fn open(&self, retry_budget: u32) -> Result<()> {
        self.source.lock().open(retry_budget)
    }

    /// Starts the worker thread. Does nothing if it is already running or
    /// the sampler is synchronous.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(&mut self) -> Result<()> {
        if !self.config.background || self.is_sampling() {
            return Ok(());
        }
        // a worker that exited on a read failure still needs joining
        self.join_worker();

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            source: Arc::clone(&self.source),
            stabilizer: Arc::clone(&self.stabilizer),
            recorder: self.recorder.clone(),
            running: Arc::clone(&self.running),
            interval: self.config.interval.to_std(),
            clock: self.clock,
        };
        match thread::Builder::new()
            .name("motion-sampler".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(interval = %self.config.interval, "sampling started");
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Stops the worker and waits for it to finish.
    ///
    /// No sample is inserted after this returns. Must not be called from the
    /// worker thread itself.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.join_worker();
        if was_running {
            info!("sampling stopped");
        }
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("sampler thread panicked");
            }
        }
    }

    /// Returns the current stabilized sample.
    ///
    /// If the worker is not running (never started, or stopped after a read
    /// failure) the source is reopened with a zero retry budget and sampling
    /// restarts before the estimate is read.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reopened or read.
    pub fn read_data(&mut self, time: Timestamp) -> Result<DofSample> {
        if !self.config.background {
            return self.read_direct(time);
        }

        if !self.is_sampling() {
            self.source.lock().open(0)?;
            self.prime()?;
            self.start()?;
            debug!("sampling resumed");
        }

        self.stabilizer
            .stabilize()
            .ok_or_else(|| CompensationError::no_data("stabilizer has no samples"))
    }

    /// Opens the source and, in background mode, starts sampling.
    ///
    /// The stabilizer is primed with one direct read so the first query
    /// after this returns has data. A failed priming read is not an error;
    /// the worker keeps trying.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened or the thread cannot
    /// be spawned.
    pub fn open_and_start(&mut self, retry_budget: u32) -> Result<()> {
        self.open(retry_budget)?;
        if !self.config.background {
            return Ok(());
        }
        if let Err(err) = self.prime() {
            debug!(%err, "priming read failed");
        }
        self.start()
    }

    /// Clears the stabilizer and seeds it with one read stamped now.
    fn prime(&self) -> Result<()> {
        self.stabilizer.clear();
        let now = self.clock.now();
        let sample = self.source.lock().read_raw(now)?;
        self.insert(&sample, now)
    }

    fn read_direct(&self, time: Timestamp) -> Result<DofSample> {
        let sample = {
            let mut source = self.source.lock();
            if !source.is_open() {
                source.open(0)?;
            }
            source.read_raw(time)?
        };
        self.insert(&sample, time)?;
        self.stabilizer
            .stabilize()
            .ok_or_else(|| CompensationError::no_data("stabilizer has no samples"))
    }

    fn insert(&self, sample: &DofSample, now: Timestamp) -> Result<()> {
        if !self.stabilizer.insert_sample(sample, now) {
            sample.validated()?;
        }
        if let Some(recorder) = &self.recorder {
            recorder.lock().add_dof_values(sample, DofKind::Momentary);
        }
        Ok(())
    }
}

impl<S: PoseSource + 'static> Drop for Sampler<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the sampling thread.
struct Worker<S: PoseSource> {
    source: Arc<Mutex<S>>,
    stabilizer: Arc<Stabilizer>,
    recorder: Option<SharedRecorder>,
    running: Arc<AtomicBool>,
    interval: std::time::Duration,
    clock: Clock,
}

impl<S: PoseSource> Worker<S> {
    fn run(self) {
        let mut next_tick = Instant::now();
        while self.running.load(Ordering::Acquire) {
            let now = self.clock.now();
            let read = self.source.lock().read_raw(now);
            match read {
                Ok(sample) => {
                    if self.stabilizer.insert_sample(&sample, now) {
                        if let Some(recorder) = &self.recorder {
                            recorder.lock().add_dof_values(&sample, DofKind::Sampled);
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "sampling stopped after read failure");
                    break;
                }
            }

            // drift-corrected: the schedule advances by exactly one interval
            next_tick += self.interval;
            let current = Instant::now();
            if next_tick > current {
                thread::sleep(next_tick - current);
            } else if current - next_tick > self.interval {
                // fell more than one interval behind: resynchronize
                next_tick = current;
            }
        }
        self.running.store(false, Ordering::Release);
    }
}
