//! Masked normalized cross-correlation registration.
//!
//! For every integer displacement `d` the score is the Pearson correlation
//! between reference pixels `x` and moving pixels `x + d`, taken only over
//! positions valid in both masks. Pixels holding NaN or infinity are treated
//! as masked. All overlap counts, sums and sums of squares
//! come from six zero-padded FFT cross-correlations, so the cost is that of a
//! handful of transforms of twice the image size.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::algorithms::fft::Fft2d;
use crate::config::{RegistrationConfig, SubpixelMethod};
use crate::data::{AlignmentOffset, Frame, Image, Mask};
use crate::error::{ensure_same_shape, DiffractionError, Result};
use crate::logging::OperationSpan;
use crate::pipeline::RegistrationAlgorithm;

/// Variances below this multiple of machine epsilon times the total masked
/// energy are numerical noise and score zero.
const VARIANCE_TOLERANCE_FACTOR: f64 = 1e6;

/// Outcome of one registration, with the evidence behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub offset: AlignmentOffset,
    /// Normalized correlation at the integer peak, in `[-1, 1]`.
    pub peak_score: f64,
    /// Pixels valid in both masks at the integer peak.
    pub overlap_pixels: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MaskedCorrelationAligner {
    config: RegistrationConfig,
}

impl MaskedCorrelationAligner {
    pub fn new(config: RegistrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Displacement of `moving` relative to `reference`.
    pub fn register(
        &self,
        reference: &Image,
        reference_mask: &Mask,
        moving: &Image,
        moving_mask: &Mask,
    ) -> Result<AlignmentOffset> {
        self.register_detailed(reference, reference_mask, moving, moving_mask)
            .map(|result| result.offset)
    }

    pub fn register_detailed(
        &self,
        reference: &Image,
        reference_mask: &Mask,
        moving: &Image,
        moving_mask: &Mask,
    ) -> Result<RegistrationResult> {
        let shape = reference.dim();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(DiffractionError::InvalidParameter(
                "cannot register an empty image".to_string(),
            ));
        }
        ensure_same_shape("reference mask", shape, reference_mask.dim())?;
        ensure_same_shape("moving image", shape, moving.dim())?;
        ensure_same_shape("moving mask", shape, moving_mask.dim())?;

        let span = OperationSpan::new("masked_registration", shape);
        let _enter = span.enter();

        let surface = CorrelationSurface::compute(reference, reference_mask, moving, moving_mask);
        match surface.locate_peak(&self.config) {
            Ok(result) => {
                tracing::trace!(
                    offset_row = result.offset.row,
                    offset_col = result.offset.col,
                    peak_score = result.peak_score,
                    overlap = result.overlap_pixels,
                    "correlation peak located"
                );
                span.record_success("registration completed");
                Ok(result)
            }
            Err(error) => {
                span.record_failure(&error);
                Err(error)
            }
        }
    }
}

impl RegistrationAlgorithm for MaskedCorrelationAligner {
    fn name(&self) -> &str {
        "MaskedNCC"
    }

    fn register_frames(&self, reference: &Frame, moving: &Frame) -> Result<AlignmentOffset> {
        MaskedCorrelationAligner::register(
            self,
            reference.image(),
            reference.mask(),
            moving.image(),
            moving.mask(),
        )
    }

    fn supports_subpixel(&self) -> bool {
        self.config.subpixel != SubpixelMethod::None
    }
}

/// Scores and overlap counts for every displacement, laid out so that index
/// `(i, j)` holds displacement `(i - (rows - 1), j - (cols - 1))`.
struct CorrelationSurface {
    image_shape: (usize, usize),
    scores: Array2<f64>,
    overlap: Array2<usize>,
}

impl CorrelationSurface {
    fn compute(reference: &Image, reference_mask: &Mask, moving: &Image, moving_mask: &Mask) -> Self {
        let (rows, cols) = reference.dim();
        let padded = (2 * rows - 1, 2 * cols - 1);
        let fft = Fft2d::new(padded);

        let (ref_values, ref_weights) = centered_masked(reference, reference_mask);
        let (mov_values, mov_weights) = centered_masked(moving, moving_mask);

        let ref_energy: f64 = ref_values.iter().map(|v| v * v).sum();
        let mov_energy: f64 = mov_values.iter().map(|v| v * v).sum();
        let tolerance = VARIANCE_TOLERANCE_FACTOR * f64::EPSILON * ref_energy.max(mov_energy);

        let ref_fft = fft.forward_padded(&ref_values);
        let ref_sq_fft = fft.forward_padded(&ref_values.mapv(|v| v * v));
        let ref_mask_fft = fft.forward_padded(&ref_weights);
        let mov_fft = fft.forward_padded(&mov_values);
        let mov_sq_fft = fft.forward_padded(&mov_values.mapv(|v| v * v));
        let mov_mask_fft = fft.forward_padded(&mov_weights);

        let counts = fft.cross_correlate(&ref_mask_fft, &mov_mask_fft);
        let sum_ref = fft.cross_correlate(&ref_fft, &mov_mask_fft);
        let sum_mov = fft.cross_correlate(&ref_mask_fft, &mov_fft);
        let sum_product = fft.cross_correlate(&ref_fft, &mov_fft);
        let sum_ref_sq = fft.cross_correlate(&ref_sq_fft, &mov_mask_fft);
        let sum_mov_sq = fft.cross_correlate(&ref_mask_fft, &mov_sq_fft);

        let mut scores = Array2::<f64>::zeros(padded);
        let mut overlap = Array2::<usize>::zeros(padded);

        for i in 0..padded.0 {
            let wrapped_row = wrap_index(i as isize - (rows as isize - 1), padded.0);
            for j in 0..padded.1 {
                let k = (wrapped_row, wrap_index(j as isize - (cols as isize - 1), padded.1));

                let count = counts[k].round().max(0.0);
                overlap[[i, j]] = count as usize;
                if count < 1.0 {
                    continue;
                }

                let numerator = sum_product[k] - sum_ref[k] * sum_mov[k] / count;
                let ref_var = sum_ref_sq[k] - sum_ref[k] * sum_ref[k] / count;
                let mov_var = sum_mov_sq[k] - sum_mov[k] * sum_mov[k] / count;

                if ref_var > tolerance && mov_var > tolerance {
                    scores[[i, j]] = (numerator / (ref_var * mov_var).sqrt()).clamp(-1.0, 1.0);
                }
            }
        }

        Self {
            image_shape: (rows, cols),
            scores,
            overlap,
        }
    }

    fn displacement(&self, i: usize, j: usize) -> (isize, isize) {
        (
            i as isize - (self.image_shape.0 as isize - 1),
            j as isize - (self.image_shape.1 as isize - 1),
        )
    }

    fn locate_peak(&self, config: &RegistrationConfig) -> Result<RegistrationResult> {
        let within_search = |i: usize, j: usize| match config.max_shift {
            Some(limit) => {
                let (dr, dc) = self.displacement(i, j);
                dr.unsigned_abs() <= limit && dc.unsigned_abs() <= limit
            }
            None => true,
        };

        let best_overlap = self
            .overlap
            .indexed_iter()
            .filter(|((i, j), _)| within_search(*i, *j))
            .map(|(_, &count)| count)
            .max()
            .unwrap_or(0);
        let ratio_floor = (config.overlap_ratio * best_overlap as f64).ceil() as usize;
        let required = config.min_overlap_pixels.max(ratio_floor).max(1);

        let eligible = Array2::from_shape_fn(self.scores.dim(), |(i, j)| {
            within_search(i, j) && self.overlap[[i, j]] >= required
        });

        let best_score = self
            .scores
            .indexed_iter()
            .filter(|(index, _)| eligible[*index])
            .map(|(_, &score)| score)
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
            .ok_or(DiffractionError::InsufficientOverlap {
                best_overlap,
                required,
            })?;

        let maxima: Vec<(usize, usize)> = self
            .scores
            .indexed_iter()
            .filter(|(index, score)| eligible[*index] && **score == best_score)
            .map(|(index, _)| index)
            .collect();

        let count = maxima.len() as f64;
        let mean_row = maxima.iter().map(|&(i, j)| self.displacement(i, j).0 as f64).sum::<f64>() / count;
        let mean_col = maxima.iter().map(|&(i, j)| self.displacement(i, j).1 as f64).sum::<f64>() / count;
        let (peak_i, peak_j) = maxima[0];

        let mut offset = AlignmentOffset::new(mean_row, mean_col);
        if maxima.len() == 1 && config.subpixel == SubpixelMethod::Parabolic {
            offset.row += self.parabolic_correction(&eligible, (peak_i, peak_j), (1, 0));
            offset.col += self.parabolic_correction(&eligible, (peak_i, peak_j), (0, 1));
        }

        Ok(RegistrationResult {
            offset,
            peak_score: best_score,
            overlap_pixels: self.overlap[[peak_i, peak_j]],
        })
    }

    /// Vertex of the parabola through the peak and its two neighbours along
    /// `axis`; zero when a neighbour is missing or not a candidate.
    fn parabolic_correction(&self, eligible: &Array2<bool>, peak: (usize, usize), axis: (usize, usize)) -> f64 {
        let (i, j) = peak;
        let (rows, cols) = self.scores.dim();
        if i < axis.0 || j < axis.1 || i + axis.0 >= rows || j + axis.1 >= cols {
            return 0.0;
        }

        let before = (i - axis.0, j - axis.1);
        let after = (i + axis.0, j + axis.1);
        if !eligible[before] || !eligible[after] {
            return 0.0;
        }

        let left = self.scores[before];
        let center = self.scores[peak];
        let right = self.scores[after];
        let curvature = left - 2.0 * center + right;

        if curvature < -1e-12 {
            (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    }
}

/// Valid pixels minus their mean (zero elsewhere), and the validity as
/// weights. Non-finite pixels count as invalid whatever the mask says.
fn centered_masked(image: &Image, mask: &Mask) -> (Array2<f64>, Array2<f64>) {
    let valid = Array2::from_shape_fn(image.dim(), |index| mask[index] && image[index].is_finite());

    let (sum, count) = image
        .iter()
        .zip(valid.iter())
        .filter(|(_, valid)| **valid)
        .fold((0.0, 0usize), |(sum, count), (&value, _)| (sum + value, count + 1));
    let mean = if count > 0 { sum / count as f64 } else { 0.0 };

    let values = Array2::from_shape_fn(image.dim(), |index| {
        if valid[index] {
            image[index] - mean
        } else {
            0.0
        }
    });
    let weights = valid.mapv(|valid| if valid { 1.0 } else { 0.0 });
    (values, weights)
}

fn wrap_index(displacement: isize, len: usize) -> usize {
    displacement.rem_euclid(len as isize) as usize
}
