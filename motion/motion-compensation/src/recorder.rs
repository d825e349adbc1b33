//! Recording of DOF values and poses for offline analysis.
//!
//! The sampler records every sample it takes. The tracker records one row
//! per frame with the values read and the poses at each stage of the
//! pipeline. Recording failures never affect compensation.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use motion_types::{DofAxis, DofSample, Pose, Timestamp};
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;

/// Ten minutes of frames at 60 fps.
pub const MAX_ROWS: usize = 36_000;

/// Where a recorded DOF sample was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DofKind {
    /// Taken by the sampler thread.
    Sampled,
    /// Stabilized value handed to the tracker.
    Read,
    /// Value read directly on the caller's thread.
    Momentary,
}

/// Pipeline stage of a recorded pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseKind {
    /// Raw pose before filtering.
    Unfiltered,
    /// Pose after the filter chain.
    Filtered,
    /// Pose after the modifier.
    Modified,
    /// Reference pose captured at calibration.
    Reference,
}

impl PoseKind {
    const ALL: [Self; 4] = [Self::Unfiltered, Self::Filtered, Self::Modified, Self::Reference];

    const fn index(self) -> usize {
        match self {
            Self::Unfiltered => 0,
            Self::Filtered => 1,
            Self::Modified => 2,
            Self::Reference => 3,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Unfiltered => "unfiltered",
            Self::Filtered => "filtered",
            Self::Modified => "modified",
            Self::Reference => "reference",
        }
    }
}

/// Sink for recorded values.
pub trait Recorder: Send {
    /// Starts a new frame row.
    fn add_frame_time(&mut self, time: Timestamp);

    /// Records a DOF sample.
    fn add_dof_values(&mut self, sample: &DofSample, kind: DofKind);

    /// Records a pose in the current frame row.
    fn add_pose(&mut self, pose: &Pose, kind: PoseKind);

    /// Commits the current frame row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be stored. Callers log and ignore
    /// it.
    fn write(&mut self) -> Result<()>;

    /// Flips recording on or off and returns the new state.
    fn toggle(&mut self) -> bool;

    /// Returns true while recording.
    fn is_recording(&self) -> bool;
}

/// A recorder shared between the sampler thread and the tracker.
pub type SharedRecorder = Arc<Mutex<dyn Recorder>>;

/// One recorded frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameRow {
    /// Frame time.
    pub time: Timestamp,
    /// DOF values read for the frame.
    pub read: Option<DofSample>,
    /// Poses in [`PoseKind`] order.
    pub poses: [Option<Pose>; 4],
}

impl FrameRow {
    /// Returns the recorded pose of one stage.
    #[must_use]
    pub const fn pose(&self, kind: PoseKind) -> Option<Pose> {
        self.poses[kind.index()]
    }
}

/// Keeps the most recent [`MAX_ROWS`] frames and samples in memory.
///
/// # Example
///
/// ```
/// use motion_compensation::{DofKind, MemoryRecorder, Recorder};
/// use motion_types::{DofSample, Timestamp};
///
/// let mut recorder = MemoryRecorder::new();
/// recorder.toggle();
/// recorder.add_frame_time(Timestamp::from_millis(16));
/// recorder.add_dof_values(&DofSample::zero(Timestamp::from_millis(15)), DofKind::Read);
/// recorder.write()?;
///
/// let mut csv = Vec::new();
/// recorder.write_frames_csv(&mut csv)?;
/// assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 2);
/// # Ok::<(), motion_compensation::CompensationError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    recording: bool,
    current: Option<FrameRow>,
    frames: VecDeque<FrameRow>,
    samples: VecDeque<DofSample>,
}

impl MemoryRecorder {
    /// Creates a recorder that is switched off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &FrameRow> {
        self.frames.iter()
    }

    /// Recorded sampler values, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &DofSample> {
        self.samples.iter()
    }

    /// Number of committed frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.current = None;
        self.frames.clear();
        self.samples.clear();
    }

    /// Writes the frames as CSV with a header line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn write_frames_csv<W: Write>(&self, mut out: W) -> Result<()> {
        let mut header = vec!["time_ns".to_string()];
        header.extend(DofAxis::ALL.iter().map(|a| format!("read_{a}")));
        for kind in PoseKind::ALL {
            for field in ["x", "y", "z", "qx", "qy", "qz", "qw"] {
                header.push(format!("{}_{field}", kind.name()));
            }
        }
        writeln!(out, "{}", header.join(","))?;

        for row in &self.frames {
            let mut fields = vec![row.time.as_nanos().to_string()];
            match row.read {
                Some(sample) => fields.extend(sample.values.iter().map(ToString::to_string)),
                None => fields.extend(std::iter::repeat_n(String::new(), 6)),
            }
            for pose in row.poses {
                match pose {
                    Some(p) => {
                        let components = p.position.to_array().into_iter().chain(p.orientation.to_array());
                        fields.extend(components.map(|c| c.to_string()));
                    }
                    None => fields.extend(std::iter::repeat_n(String::new(), 7)),
                }
            }
            writeln!(out, "{}", fields.join(","))?;
        }
        Ok(())
    }

    /// Writes the sampler values as CSV with a header line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn write_samples_csv<W: Write>(&self, mut out: W) -> Result<()> {
        let header: Vec<String> = std::iter::once("time_ns".to_string())
            .chain(DofAxis::ALL.iter().map(ToString::to_string))
            .collect();
        writeln!(out, "{}", header.join(","))?;
        for sample in &self.samples {
            let fields: Vec<String> = std::iter::once(sample.timestamp.as_nanos().to_string())
                .chain(sample.values.iter().map(ToString::to_string))
                .collect();
            writeln!(out, "{}", fields.join(","))?;
        }
        Ok(())
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T) {
    if queue.len() >= MAX_ROWS {
        queue.pop_front();
    }
    queue.push_back(value);
}

impl Recorder for MemoryRecorder {
    fn add_frame_time(&mut self, time: Timestamp) {
        if self.recording {
            self.current = Some(FrameRow {
                time,
                ..FrameRow::default()
            });
        }
    }

    fn add_dof_values(&mut self, sample: &DofSample, kind: DofKind) {
        if !self.recording {
            return;
        }
        match kind {
            DofKind::Sampled => push_capped(&mut self.samples, *sample),
            DofKind::Read | DofKind::Momentary => {
                if let Some(row) = self.current.as_mut() {
                    row.read = Some(*sample);
                }
            }
        }
    }

    fn add_pose(&mut self, pose: &Pose, kind: PoseKind) {
        if !self.recording {
            return;
        }
        if let Some(row) = self.current.as_mut() {
            row.poses[kind.index()] = Some(*pose);
        }
    }

    fn write(&mut self) -> Result<()> {
        if let Some(row) = self.current.take() {
            push_capped(&mut self.frames, row);
        }
        Ok(())
    }

    fn toggle(&mut self) -> bool {
        self.recording = !self.recording;
        if !self.recording {
            self.current = None;
        }
        info!(recording = self.recording, "recorder toggled");
        self.recording
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
