//! Alignment of image sequences.
//!
//! Both modes return lazy iterators: an input frame is pulled only when the
//! corresponding output is requested, so sequences larger than memory can be
//! streamed through. After the input is exhausted, or after an error has been
//! yielded, the iterators keep returning `None`.

use rayon::prelude::*;
use std::iter::FusedIterator;
use uuid::Uuid;

use crate::algorithms::MaskedCorrelationAligner;
use crate::config::{Config, StackConfig};
use crate::data::{AlignmentOffset, BoundingBox, Frame, ImageTransformer};
use crate::error::{ensure_same_shape, DiffractionError, Result};
use crate::logging::StackSpan;
use crate::pipeline::{AlignedFrame, FailurePolicy, FrameStatus, RegistrationAlgorithm, TrackingReference};

pub struct StackAligner<A = MaskedCorrelationAligner> {
    algorithm: A,
    config: StackConfig,
}

impl StackAligner<MaskedCorrelationAligner> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MaskedCorrelationAligner::new(config.registration.clone()),
            config.stack.clone(),
        )
    }
}

impl<A: RegistrationAlgorithm> StackAligner<A> {
    pub fn new(algorithm: A, config: StackConfig) -> Self {
        Self { algorithm, config }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn with_tracking_reference(mut self, reference: TrackingReference) -> Self {
        self.config.tracking_reference = reference;
        self
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Register every frame against one fixed reference and resample it onto
    /// the reference. Output order and length follow the input.
    pub fn align_to_reference<'a, I>(&'a self, frames: I, reference: &'a Frame) -> AlignToReference<'a, A, I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        AlignToReference {
            aligner: self,
            reference,
            frames: frames.into_iter(),
            index: 0,
            skipped: 0,
            finished: false,
            span: StackSpan::new("align_to_reference"),
        }
    }

    /// Eager variant of [`align_to_reference`](Self::align_to_reference) that
    /// registers frames on the rayon pool.
    ///
    /// Under [`FailurePolicy::Abort`] the first failing frame (in input order)
    /// is returned as the error.
    pub fn align_to_reference_parallel(&self, frames: Vec<Frame>, reference: &Frame) -> Result<Vec<AlignedFrame>> {
        let span = StackSpan::new("align_to_reference_parallel");

        let results: Vec<Result<AlignedFrame>> = frames
            .into_par_iter()
            .enumerate()
            .map(|(index, frame)| self.align_one(index, reference, frame, &span))
            .collect();

        let mut aligned = Vec::with_capacity(results.len());
        let mut skipped = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(frame) => {
                    if frame.is_skipped() {
                        skipped += 1;
                    }
                    aligned.push(frame);
                }
                Err(error) => {
                    span.record_abort(index, &error);
                    return Err(error);
                }
            }
        }

        span.record_completion(aligned.len(), skipped);
        Ok(aligned)
    }

    /// Follow a drifting feature inside `region` through a time-ordered
    /// sequence, correcting every frame by the accumulated drift.
    pub fn track_and_align<I>(&self, frames: I, region: BoundingBox) -> TrackAndAlign<'_, A, I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        self.tracker(frames.into_iter(), region, "track_and_align", true)
    }

    /// Follow a feature inside `region` like
    /// [`track_and_align`](Self::track_and_align), yielding only the drift
    /// accumulated up to each frame. Frames are never resampled.
    ///
    /// A skipped frame yields the drift of the last registered frame.
    pub fn track_peak<I>(&self, frames: I, region: BoundingBox) -> TrackPeak<'_, A, I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        TrackPeak {
            inner: self.tracker(frames.into_iter(), region, "track_peak", false),
        }
    }

    fn tracker<I>(&self, frames: I, region: BoundingBox, mode: &'static str, resample: bool) -> TrackAndAlign<'_, A, I> {
        TrackAndAlign {
            aligner: self,
            frames,
            region,
            resample,
            reference_crop: None,
            first_shape: None,
            cumulative: AlignmentOffset::zero(),
            index: 0,
            skipped: 0,
            finished: false,
            span: StackSpan::new(mode),
        }
    }

    fn align_one(&self, index: usize, reference: &Frame, frame: Frame, span: &StackSpan) -> Result<AlignedFrame> {
        ensure_same_shape("sequence frame", reference.shape(), frame.shape())?;

        match self.algorithm.register_frames(reference, &frame) {
            Ok(offset) => {
                span.record_frame(index, offset);
                Ok(AlignedFrame {
                    index,
                    frame: ImageTransformer::shift(&frame, -offset, self.config.fill_value),
                    offset,
                    cumulative_offset: offset,
                    status: FrameStatus::Aligned,
                })
            }
            Err(error) => self.recover(index, frame, error, span),
        }
    }

    fn recover(&self, index: usize, frame: Frame, error: DiffractionError, span: &StackSpan) -> Result<AlignedFrame> {
        if error.is_recoverable() && self.config.failure_policy == FailurePolicy::Skip {
            span.record_skip(index, &error);
            Ok(AlignedFrame::skipped(index, frame, error))
        } else {
            Err(error)
        }
    }
}

/// Lazy output of [`StackAligner::align_to_reference`].
pub struct AlignToReference<'a, A, I> {
    aligner: &'a StackAligner<A>,
    reference: &'a Frame,
    frames: I,
    index: usize,
    skipped: usize,
    finished: bool,
    span: StackSpan,
}

impl<A, I> AlignToReference<'_, A, I> {
    /// Identifier attached to every log event of this pass.
    pub fn run_id(&self) -> Uuid {
        self.span.run_id()
    }
}

impl<A, I> Iterator for AlignToReference<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
    type Item = Result<AlignedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(frame) = self.frames.next() else {
            self.finished = true;
            self.span.record_completion(self.index, self.skipped);
            return None;
        };

        let index = self.index;
        self.index += 1;

        match self.aligner.align_one(index, self.reference, frame, &self.span) {
            Ok(aligned) => {
                if aligned.is_skipped() {
                    self.skipped += 1;
                }
                Some(Ok(aligned))
            }
            Err(error) => {
                self.finished = true;
                self.span.record_abort(index, &error);
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, self.frames.size_hint().1)
        }
    }
}

impl<A, I> FusedIterator for AlignToReference<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
}

/// Lazy output of [`StackAligner::track_and_align`].
pub struct TrackAndAlign<'a, A, I> {
    aligner: &'a StackAligner<A>,
    frames: I,
    region: BoundingBox,
    resample: bool,
    reference_crop: Option<Frame>,
    first_shape: Option<(usize, usize)>,
    cumulative: AlignmentOffset,
    index: usize,
    skipped: usize,
    finished: bool,
    span: StackSpan,
}

impl<A, I> TrackAndAlign<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
    /// Drift accumulated over the frames consumed so far.
    pub fn cumulative_offset(&self) -> AlignmentOffset {
        self.cumulative
    }

    /// Identifier attached to every log event of this pass.
    pub fn run_id(&self) -> Uuid {
        self.span.run_id()
    }

    fn step(&mut self, index: usize, frame: Frame) -> Result<AlignedFrame> {
        if let Some(shape) = self.first_shape {
            ensure_same_shape("sequence frame", shape, frame.shape())?;
        }
        let crop = frame.crop(&self.region)?;

        let reference = match self.reference_crop.take() {
            Some(reference) => reference,
            None => {
                self.first_shape = Some(frame.shape());
                self.reference_crop = Some(crop);
                self.span.record_frame(index, AlignmentOffset::zero());
                return Ok(AlignedFrame {
                    index,
                    frame,
                    offset: AlignmentOffset::zero(),
                    cumulative_offset: AlignmentOffset::zero(),
                    status: FrameStatus::Aligned,
                });
            }
        };

        let registration = self.aligner.algorithm.register_frames(&reference, &crop);
        let offset = match registration {
            Ok(offset) => offset,
            Err(error) => {
                self.reference_crop = Some(reference);
                return self.aligner.recover(index, frame, error, &self.span);
            }
        };

        self.cumulative = match self.aligner.config.tracking_reference {
            TrackingReference::PreviousFrame => {
                self.reference_crop = Some(crop);
                self.cumulative + offset
            }
            TrackingReference::FirstFrame => {
                self.reference_crop = Some(reference);
                offset
            }
        };
        self.span.record_frame(index, self.cumulative);

        let frame = if self.resample {
            ImageTransformer::shift(&frame, -self.cumulative, self.aligner.config.fill_value)
        } else {
            frame
        };
        Ok(AlignedFrame {
            index,
            frame,
            offset,
            cumulative_offset: self.cumulative,
            status: FrameStatus::Aligned,
        })
    }
}

impl<A, I> Iterator for TrackAndAlign<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
    type Item = Result<AlignedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(frame) = self.frames.next() else {
            self.finished = true;
            self.span.record_completion(self.index, self.skipped);
            return None;
        };

        let index = self.index;
        self.index += 1;

        match self.step(index, frame) {
            Ok(aligned) => {
                if aligned.is_skipped() {
                    self.skipped += 1;
                }
                Some(Ok(aligned))
            }
            Err(error) => {
                self.finished = true;
                self.span.record_abort(index, &error);
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, self.frames.size_hint().1)
        }
    }
}

impl<A, I> FusedIterator for TrackAndAlign<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
}

/// Lazy output of [`StackAligner::track_peak`].
pub struct TrackPeak<'a, A, I> {
    inner: TrackAndAlign<'a, A, I>,
}

impl<A, I> TrackPeak<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id()
    }
}

impl<A, I> Iterator for TrackPeak<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
    type Item = Result<AlignmentOffset>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.map(|_| self.inner.cumulative_offset()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<A, I> FusedIterator for TrackPeak<'_, A, I>
where
    A: RegistrationAlgorithm,
    I: Iterator<Item = Frame>,
{
}
