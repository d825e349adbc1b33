//! Time-indexed sample cache with tolerance-based lookup.
//!
//! A correction computed for one instant is usually consumed at a slightly
//! different one: the delta is evaluated at the predicted display time but
//! the frame may be composed a millisecond later. The cache keeps recent
//! values in ascending time order and answers with the closest one.

use std::collections::VecDeque;

use motion_types::{Duration, Timestamp};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::CacheConfig;

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// An entry exists at exactly the requested time.
    Exact,
    /// The nearer bracketing entry lies within the tolerance.
    WithinTolerance,
    /// No entry within tolerance; the nearest available entry was used.
    Nearest,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMatch<T> {
    /// Time of the matched entry.
    pub timestamp: Timestamp,
    /// Matched value.
    pub value: T,
    /// How the entry was found.
    pub kind: MatchKind,
}

/// A thread-safe, time-ordered cache.
///
/// Every method takes the internal lock for a bounded amount of work, so the
/// cache can be shared between the render thread and workers.
///
/// # Example
///
/// ```
/// use motion_compensation::PoseCache;
/// use motion_types::{Duration, Timestamp};
///
/// let cache = PoseCache::new(Duration::from_millis(2));
/// cache.add_sample(Timestamp::from_millis(10), 1.0, false);
/// cache.add_sample(Timestamp::from_millis(20), 2.0, false);
///
/// // 11 ms is within 2 ms of the 10 ms entry
/// assert_eq!(cache.get_sample(Timestamp::from_millis(11), 0.0), 1.0);
/// // an empty cache returns the fallback
/// assert_eq!(PoseCache::<f64>::new(Duration::zero()).get_sample(Timestamp::zero(), -1.0), -1.0);
/// ```
#[derive(Debug)]
pub struct PoseCache<T> {
    tolerance: Duration,
    entries: Mutex<VecDeque<(Timestamp, T)>>,
}

impl<T: Clone> PoseCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Creates an empty cache from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.tolerance)
    }

    /// Returns the lookup tolerance.
    #[must_use]
    pub const fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the time range `(oldest, newest)`.
    #[must_use]
    pub fn timestamp_range(&self) -> Option<(Timestamp, Timestamp)> {
        let entries = self.entries.lock();
        Some((entries.front()?.0, entries.back()?.0))
    }

    /// Stores a value.
    ///
    /// An existing entry at exactly `time` is kept unless `overwrite` is set.
    /// Returns `true` if the value was stored.
    pub fn add_sample(&self, time: Timestamp, value: T, overwrite: bool) -> bool {
        let mut entries = self.entries.lock();
        let idx = entries.partition_point(|(t, _)| *t < time);
        match entries.get_mut(idx) {
            Some(entry) if entry.0 == time => {
                if overwrite {
                    entry.1 = value;
                }
                overwrite
            }
            _ => {
                entries.insert(idx, (time, value));
                true
            }
        }
    }

    /// Looks up the entry closest to `time`.
    ///
    /// An exact match wins. Otherwise the nearer of the two bracketing
    /// entries is chosen, the earlier one on a tie. Returns `None` only when
    /// the cache is empty.
    #[must_use]
    pub fn nearest(&self, time: Timestamp) -> Option<CacheMatch<T>> {
        let entries = self.entries.lock();
        let idx = entries.partition_point(|(t, _)| *t < time);

        if let Some((t, value)) = entries.get(idx) {
            if *t == time {
                return Some(CacheMatch {
                    timestamp: *t,
                    value: value.clone(),
                    kind: MatchKind::Exact,
                });
            }
        }

        let before = idx.checked_sub(1).and_then(|i| entries.get(i));
        let after = entries.get(idx);
        let (t, value) = match (before, after) {
            (Some(b), Some(a)) => {
                if time.abs_diff(b.0) <= time.abs_diff(a.0) {
                    b
                } else {
                    a
                }
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => return None,
        };

        let distance = time.abs_diff(*t);
        let kind = if distance <= self.tolerance {
            trace!(requested = %time, matched = %t, "cache near match");
            MatchKind::WithinTolerance
        } else {
            warn!(
                requested = %time,
                matched = %t,
                distance = %distance,
                tolerance = %self.tolerance,
                "cache miss, using nearest entry"
            );
            MatchKind::Nearest
        };

        Some(CacheMatch {
            timestamp: *t,
            value: value.clone(),
            kind,
        })
    }

    /// Returns the value closest to `time`, or `fallback` if the cache is
    /// empty.
    #[must_use]
    pub fn get_sample(&self, time: Timestamp, fallback: T) -> T {
        self.nearest(time).map_or(fallback, |m| m.value)
    }

    /// Removes entries older than `time - tolerance`.
    pub fn clean_up(&self, time: Timestamp) {
        let cutoff = time.saturating_sub(self.tolerance);
        let mut entries = self.entries.lock();
        while entries.front().is_some_and(|(t, _)| *t < cutoff) {
            entries.pop_front();
        }
    }
}
