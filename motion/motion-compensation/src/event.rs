//! Tracker events and status flags.
//!
//! Events are fire-and-forget notifications for user feedback (sounds,
//! overlays, dashboards). Emitting never blocks the render thread.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{info, warn};

/// A discrete tracker event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Session setup finished.
    Initialized,
    /// Compensation switched on.
    Activated,
    /// Compensation switched off.
    Deactivated,
    /// A new reference pose was captured.
    Calibrated,
    /// The reference pose was dropped.
    CalibrationLost,
    /// The source failed for longer than the connection timeout.
    ConnectionLost,
    /// The source delivers again after a connection loss.
    ConnectionRestored,
    /// Pose modifier switched on.
    ModifierOn,
    /// Pose modifier switched off.
    ModifierOff,
    /// Recorder switched on.
    RecorderOn,
    /// Recorder switched off.
    RecorderOff,
    /// An operation failed.
    Error,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Calibrated => "calibrated",
            Self::CalibrationLost => "calibration lost",
            Self::ConnectionLost => "connection lost",
            Self::ConnectionRestored => "connection restored",
            Self::ModifierOn => "modifier on",
            Self::ModifierOff => "modifier off",
            Self::RecorderOn => "recorder on",
            Self::RecorderOff => "recorder off",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Receives tracker events.
///
/// Implementations must return quickly; they are called on the render
/// thread.
pub trait EventSink: Send {
    /// Handles one event.
    fn emit(&self, event: Event);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        if event == Event::Error {
            warn!(%event, "tracker event");
        } else {
            info!(%event, "tracker event");
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// # Example
///
/// ```
/// use motion_compensation::{ChannelSink, Event, EventSink};
///
/// let (sink, events) = ChannelSink::channel();
/// sink.emit(Event::Calibrated);
/// assert_eq!(events.try_recv().unwrap(), Event::Calibrated);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Event>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end.
    #[must_use]
    pub fn channel() -> (Self, Receiver<Event>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        // a dropped receiver just means nobody listens any more
        let _ = self.sender.send(event);
    }
}

/// Snapshot of the tracker's state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct TrackerStatus {
    /// Session setup succeeded.
    pub initialized: bool,
    /// A reference pose is held.
    pub calibrated: bool,
    /// Compensation is on.
    pub activated: bool,
    /// The source has been failing for longer than the timeout.
    pub connection_lost: bool,
    /// The last fallible operation failed.
    pub error: bool,
    /// The pose modifier is on.
    pub modified: bool,
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.initialized, "initialized"),
            (self.calibrated, "calibrated"),
            (self.activated, "activated"),
            (self.connection_lost, "connection_lost"),
            (self.error, "error"),
            (self.modified, "modified"),
        ];
        let set: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
        if set.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&set.join("|"))
        }
    }
}
