//! Jitter reduction on raw DOF samples.
//!
//! The sampler thread inserts samples at a fixed cadence while the render
//! thread reads the current estimate. Each of the six channels keeps its own
//! sliding time window, ordered both by time (for pruning) and by value
//! (for order statistics).
//!
//! Rotational channels are unwrapped on insertion so a yaw passing from
//! 179° to -179° is seen as a 2° step. Estimates are wrapped back to
//! `(-180, 180]` on output.
//!
//! The EMA and biquad variants keep no window. They carry one running
//! value per channel that is re-seeded after `clear` or `set_strength`.

use std::collections::VecDeque;

use motion_types::{DofAxis, DofSample, Duration, Timestamp};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{StabilizerConfig, StabilizerKind};

const DISABLE_THRESHOLD: f64 = 0.001;
const BLOCK_THRESHOLD: f64 = 0.999;

/// Rate the biquad coefficients are designed for, one sample per default
/// 2 ms sampler tick.
const BIQUAD_SAMPLE_RATE: f64 = 500.0;

/// Wraps an angle in degrees to `(-180, 180]`.
#[must_use]
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Low-pass cutoff in Hz for a per-channel EMA strength in `(0, 1]`.
///
/// Strength 1 yields 0 Hz, a frozen channel.
#[must_use]
pub fn ema_cutoff(strength: f64) -> f64 {
    12.5 / (2.0 * strength + 0.1) - 12.5 / 2.1
}

/// Second-order Butterworth low-pass in direct form II.
#[derive(Debug, Clone, Copy, Default)]
struct BiQuad {
    gain: f64,
    d1: f64,
    d2: f64,
    w1: f64,
    w2: f64,
}

impl BiQuad {
    fn butterworth(cutoff: f64, sample_rate: f64) -> Self {
        let r = std::f64::consts::FRAC_1_SQRT_2;
        let a = (std::f64::consts::PI * cutoff / sample_rate).tan();
        let a2 = a * a;
        let s = a2 + 2.0 * a * r + 1.0;
        Self {
            gain: a2 / s,
            d1: 2.0 * (1.0 - a2) / s,
            d2: -(a2 - 2.0 * a * r + 1.0) / s,
            w1: 0.0,
            w2: 0.0,
        }
    }

    /// Puts the delay line in the steady state for a constant `value`.
    fn settle(&mut self, value: f64) {
        let denom = 1.0 - self.d1 - self.d2;
        let w = if denom.abs() > f64::EPSILON { value / denom } else { 0.0 };
        self.w1 = w;
        self.w2 = w;
    }

    fn filter(&mut self, value: f64) -> f64 {
        let w0 = self.d1 * self.w1 + self.d2 * self.w2 + value;
        let out = self.gain * (self.w2 + 2.0 * self.w1 + w0);
        self.w2 = self.w1;
        self.w1 = w0;
        out
    }
}

/// How one channel of a running-value stabilizer behaves.
enum Tuning {
    /// Output held at zero.
    Blocked,
    /// Output follows the input.
    Bypassed,
    /// Low-pass at the given cutoff in Hz.
    Cutoff(f64),
}

#[derive(Debug, Default)]
struct Channel {
    by_time: VecDeque<(Timestamp, f64)>,
    by_value: Vec<f64>,
    last_raw: Option<f64>,
    continuous: f64,
    smoothed: f64,
    // rotational channels use both, filtering cos and sin of the angle
    biquad: [BiQuad; 2],
}

impl Channel {
    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Maps a raw reading onto the continuous track.
    fn track(&mut self, raw: f64, rotational: bool) -> f64 {
        self.continuous = match self.last_raw {
            Some(prev) if rotational => self.continuous + wrap_degrees(raw - prev),
            _ => raw,
        };
        self.last_raw = Some(raw);
        self.continuous
    }

    fn push(&mut self, time: Timestamp, value: f64) {
        self.by_time.push_back((time, value));
        let idx = self.by_value.partition_point(|v| v.total_cmp(&value).is_lt());
        self.by_value.insert(idx, value);
    }

    fn prune(&mut self, horizon: Timestamp) {
        while let Some(&(t, value)) = self.by_time.front() {
            if t >= horizon {
                break;
            }
            self.by_time.pop_front();
            let idx = self.by_value.partition_point(|v| v.total_cmp(&value).is_lt());
            if self.by_value.get(idx).is_some_and(|v| v.total_cmp(&value).is_eq()) {
                self.by_value.remove(idx);
            }
        }
    }

    fn biquad(&mut self, value: f64, rotational: bool, cutoff: f64, first: bool) -> f64 {
        if first {
            self.biquad = [BiQuad::butterworth(cutoff, BIQUAD_SAMPLE_RATE); 2];
        }
        if !rotational {
            if first {
                self.biquad[0].settle(value);
            }
            return self.biquad[0].filter(value);
        }

        let (sin, cos) = value.to_radians().sin_cos();
        if first {
            self.biquad[0].settle(cos);
            self.biquad[1].settle(sin);
        }
        let cos = self.biquad[0].filter(cos);
        let sin = self.biquad[1].filter(sin);
        sin.atan2(cos).to_degrees()
    }

    fn reduce(&self, kind: StabilizerKind, horizon: Timestamp) -> Option<f64> {
        let fully_inside = self.by_time.front().is_some_and(|(t, _)| *t >= horizon);
        let in_window = || self.by_time.iter().filter(move |(t, _)| *t >= horizon);

        match kind {
            StabilizerKind::Average => {
                let (sum, count) = in_window().fold((0.0, 0_u32), |(s, c), (_, v)| (s + v, c + 1));
                (count > 0).then(|| sum / f64::from(count))
            }
            StabilizerKind::WeightedAverage => {
                let (sum, total) = in_window().fold((0.0, 0.0), |(s, w), (t, v)| {
                    let weight = recency_weight(*t, horizon);
                    (s + v * weight, w + weight)
                });
                (total > 0.0).then(|| sum / total)
            }
            StabilizerKind::Median => {
                if fully_inside {
                    median(&self.by_value)
                } else {
                    let mut values: Vec<f64> = in_window().map(|(_, v)| *v).collect();
                    values.sort_by(f64::total_cmp);
                    median(&values)
                }
            }
            StabilizerKind::WeightedMedian => {
                let mut weighted: Vec<(f64, f64)> = in_window()
                    .map(|(t, v)| (*v, recency_weight(*t, horizon)))
                    .collect();
                weighted.sort_by(|a, b| a.0.total_cmp(&b.0));
                weighted_median(&weighted)
            }
            StabilizerKind::PassThrough | StabilizerKind::Ema | StabilizerKind::BiQuad => {
                self.by_time.back().map(|(_, v)| *v)
            }
        }
    }
}

/// Linear recency weight: the newest sample weighs most, one at the horizon.
#[allow(clippy::cast_precision_loss)]
fn recency_weight(time: Timestamp, horizon: Timestamp) -> f64 {
    time.saturating_duration_since(horizon).as_nanos() as f64 + 1.0
}

fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some(f64::midpoint(sorted[n / 2 - 1], sorted[n / 2]))
    }
}

fn weighted_median(sorted: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = sorted.iter().map(|(_, w)| w).sum();
    let mut cumulative = 0.0;
    for (value, weight) in sorted {
        cumulative += weight;
        if cumulative * 2.0 >= total {
            return Some(*value);
        }
    }
    sorted.last().map(|(v, _)| *v)
}

#[derive(Debug)]
struct State {
    kind: StabilizerKind,
    window: Duration,
    strength: f64,
    factors: [f64; 6],
    channels: [Channel; 6],
    last: Option<DofSample>,
    last_insert: Option<Timestamp>,
}

impl State {
    fn tuning(&self, i: usize) -> Tuning {
        if self.strength > BLOCK_THRESHOLD {
            return Tuning::Blocked;
        }
        let strength = (self.strength * self.factors[i]).min(1.0);
        if self.strength < DISABLE_THRESHOLD || strength < DISABLE_THRESHOLD {
            return Tuning::Bypassed;
        }
        Tuning::Cutoff(ema_cutoff(strength))
    }

    #[allow(clippy::float_cmp)]
    fn insert_ema(&mut self, continuous: &[f64; 6], now: Timestamp) {
        let first = self.last_insert.is_none();
        let dt = self
            .last_insert
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());

        for axis in DofAxis::ALL {
            let i = axis.index();
            let value = continuous[i];
            let tuning = self.tuning(i);
            let channel = &mut self.channels[i];

            channel.smoothed = match tuning {
                Tuning::Blocked => 0.0,
                Tuning::Bypassed => value,
                Tuning::Cutoff(cutoff) if first => {
                    if cutoff == 0.0 { 0.0 } else { value }
                }
                Tuning::Cutoff(cutoff) => {
                    let k = 1.0 - (-2.0 * std::f64::consts::PI * cutoff * dt).exp();
                    channel.smoothed + (value - channel.smoothed) * k
                }
            };
        }
    }

    /// Runs one sample through each channel's biquad.
    ///
    /// The first sample after a reset settles the filters on that sample,
    /// so the output starts at the input instead of rising from zero.
    fn insert_biquad(&mut self, continuous: &[f64; 6]) {
        let first = self.last_insert.is_none();
        for axis in DofAxis::ALL {
            let i = axis.index();
            let value = continuous[i];
            let tuning = self.tuning(i);
            let channel = &mut self.channels[i];

            channel.smoothed = match tuning {
                Tuning::Blocked => 0.0,
                Tuning::Bypassed => value,
                Tuning::Cutoff(cutoff) => channel.biquad(value, axis.is_rotational(), cutoff, first),
            };
        }
    }
}

/// Windowed per-DOF stabilizer.
///
/// All methods take `&self` and lock internally, so one instance can be
/// shared through an `Arc` between the sampler thread and the render thread.
///
/// # Example
///
/// ```
/// use motion_compensation::{Stabilizer, StabilizerConfig, StabilizerKind};
/// use motion_types::{DofAxis, DofSample, Duration, Timestamp};
///
/// let stabilizer = Stabilizer::new(&StabilizerConfig::windowed(
///     StabilizerKind::Median,
///     Duration::from_millis(10),
/// ));
/// for (ms, heave) in [(0, 0.10), (2, 0.90), (4, 0.11)] {
///     let now = Timestamp::from_millis(ms);
///     let mut sample = DofSample::zero(now);
///     sample.set(DofAxis::Heave, heave);
///     stabilizer.insert_sample(&sample, now);
/// }
///
/// // the spike is rejected
/// let estimate = stabilizer.stabilize().unwrap();
/// assert!((estimate.get(DofAxis::Heave) - 0.11).abs() < 1e-9);
/// ```
#[derive(Debug)]
pub struct Stabilizer {
    state: Mutex<State>,
}

impl Stabilizer {
    /// Creates a stabilizer from configuration.
    #[must_use]
    pub fn new(config: &StabilizerConfig) -> Self {
        info!(
            kind = ?config.kind,
            window = %config.window,
            strength = config.strength,
            "stabilizer configured"
        );
        Self {
            state: Mutex::new(State {
                kind: config.kind,
                window: config.window,
                strength: config.strength.clamp(0.0, 1.0),
                factors: config.factors.map(|f| f.max(0.0)),
                channels: Default::default(),
                last: None,
                last_insert: None,
            }),
        }
    }

    /// Returns the algorithm in use.
    #[must_use]
    pub fn kind(&self) -> StabilizerKind {
        self.state.lock().kind
    }

    /// Returns the current window length.
    #[must_use]
    pub fn window_size(&self) -> Duration {
        self.state.lock().window
    }

    /// Changes the window length.
    ///
    /// Retained samples are not touched; the new horizon applies from the
    /// next insertion on.
    pub fn set_window_size(&self, window: Duration) {
        let mut state = self.state.lock();
        debug!(old = %state.window, new = %window, "stabilizer window changed");
        state.window = window;
    }

    /// Sets the EMA or biquad strength, clamped to `[0, 1]`, and returns
    /// the value used.
    pub fn set_strength(&self, strength: f64) -> f64 {
        let clamped = if strength.is_nan() {
            0.0
        } else {
            strength.clamp(0.0, 1.0)
        };
        let mut state = self.state.lock();
        state.strength = clamped;
        // restart averaging from the next sample
        state.last_insert = None;
        info!(strength = clamped, "stabilizer strength set");
        clamped
    }

    /// Number of samples retained per channel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().channels[0].by_time.len()
    }

    /// Returns true if no sample is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time range `(oldest, newest)` of the retained samples.
    #[must_use]
    pub fn window_range(&self) -> Option<(Timestamp, Timestamp)> {
        let state = self.state.lock();
        let samples = &state.channels[0].by_time;
        Some((samples.front()?.0, samples.back()?.0))
    }

    /// Drops every sample and the EMA and biquad history.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for channel in &mut state.channels {
            channel.clear();
        }
        state.last = None;
        state.last_insert = None;
    }

    /// Inserts one sample taken at `now` and prunes everything older than
    /// `now - window`.
    ///
    /// Samples with `NaN`, infinite or denormal channels are rejected and
    /// `false` is returned.
    pub fn insert_sample(&self, sample: &DofSample, now: Timestamp) -> bool {
        if !sample.is_valid() {
            debug!(?sample, "stabilizer rejected invalid sample");
            return false;
        }

        let mut state = self.state.lock();
        let horizon = now.saturating_sub(state.window);
        let mut continuous = [0.0; 6];
        for axis in DofAxis::ALL {
            let channel = &mut state.channels[axis.index()];
            let value = channel.track(sample.get(axis), axis.is_rotational());
            channel.push(now, value);
            channel.prune(horizon);
            continuous[axis.index()] = value;
        }

        match state.kind {
            StabilizerKind::Ema => state.insert_ema(&continuous, now),
            StabilizerKind::BiQuad => state.insert_biquad(&continuous),
            _ => {}
        }
        state.last = Some(*sample);
        state.last_insert = Some(now);
        true
    }

    /// Returns the current estimate.
    ///
    /// Does not modify the window, so repeated calls between insertions
    /// return the same sample. Returns `None` before the first insertion.
    #[must_use]
    pub fn stabilize(&self) -> Option<DofSample> {
        let state = self.state.lock();
        let last = state.last?;

        let running = matches!(state.kind, StabilizerKind::Ema | StabilizerKind::BiQuad);
        let windowed = !running && state.kind != StabilizerKind::PassThrough;
        if state.kind == StabilizerKind::PassThrough || (windowed && state.window.is_zero()) {
            return Some(last);
        }

        let newest = state.channels[0].by_time.back().map(|(t, _)| *t)?;
        let horizon = newest.saturating_sub(state.window);
        let mut out = last;
        for axis in DofAxis::ALL {
            let channel = &state.channels[axis.index()];
            let estimate = if running {
                Some(channel.smoothed)
            } else {
                channel.reduce(state.kind, horizon)
            };
            if let Some(value) = estimate {
                let value = if axis.is_rotational() {
                    wrap_degrees(value)
                } else {
                    value
                };
                out.set(axis, value);
            }
        }
        Some(out)
    }
}
