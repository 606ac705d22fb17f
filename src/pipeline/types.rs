use serde::{Deserialize, Serialize};

use crate::data::{AlignmentOffset, Frame};
use crate::error::DiffractionError;

/// What a stack pass does when a single frame cannot be registered.
///
/// Only recoverable errors (insufficient overlap) are subject to the policy;
/// every other error ends the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Yield the error and stop producing frames.
    Abort,
    /// Emit the frame unshifted, marked as skipped, and continue.
    #[default]
    Skip,
}

/// Which earlier frame the tracked region is registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingReference {
    /// The last successfully registered frame; step offsets accumulate.
    #[default]
    PreviousFrame,
    /// Always the first frame; each offset is already cumulative.
    FirstFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    Aligned,
    Skipped { reason: DiffractionError },
}

/// One frame of an aligned sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    /// Position in the input sequence
    pub index: usize,
    /// Resampled image and mask
    pub frame: Frame,
    /// Offset measured for this frame (against the fixed reference, or the
    /// tracking reference)
    pub offset: AlignmentOffset,
    /// Correction applied to this frame: it was shifted by the negation.
    ///
    /// This is the correction, not the drift so far. A skipped frame is left
    /// unshifted and reports zero here even when earlier frames drifted;
    /// [`TrackAndAlign::cumulative_offset`](crate::pipeline::TrackAndAlign::cumulative_offset)
    /// and [`StackAligner::track_peak`](crate::pipeline::StackAligner::track_peak)
    /// report the running drift.
    pub cumulative_offset: AlignmentOffset,
    pub status: FrameStatus,
}

impl AlignedFrame {
    pub(crate) fn skipped(index: usize, frame: Frame, reason: DiffractionError) -> Self {
        Self {
            index,
            frame,
            offset: AlignmentOffset::zero(),
            cumulative_offset: AlignmentOffset::zero(),
            status: FrameStatus::Skipped { reason },
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, FrameStatus::Skipped { .. })
    }
}
