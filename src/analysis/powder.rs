//! Azimuthal averaging of polycrystalline diffraction patterns.

use serde::{Deserialize, Serialize};

use crate::config::RadialConfig;
use crate::data::{Center, Image, Mask, ScatteringVectorField};
use crate::error::{ensure_same_shape, DiffractionError, Result};
use crate::logging::OperationSpan;

/// Upper bound on the number of bins an explicit width may produce.
pub const MAX_BIN_COUNT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialPoint {
    /// Center of the bin in scattering-vector units.
    pub q: f64,
    /// Mean intensity of the pixels in the bin.
    pub intensity: f64,
    pub count: usize,
}

/// Intensity as a function of scattering-vector magnitude.
///
/// Points are ordered by strictly increasing `q` and every point holds at
/// least one pixel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadialProfile {
    points: Vec<RadialPoint>,
    bin_width: f64,
}

impl RadialProfile {
    pub fn points(&self) -> &[RadialPoint] {
        &self.points
    }

    pub fn q(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.q).collect()
    }

    pub fn intensity(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    pub fn counts(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.count).collect()
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RadialPoint> {
        self.points.iter()
    }
}

impl<'a> IntoIterator for &'a RadialProfile {
    type Item = &'a RadialPoint;
    type IntoIter = std::slice::Iter<'a, RadialPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RadialReducer {
    config: RadialConfig,
}

impl RadialReducer {
    pub fn new(config: RadialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RadialConfig {
        &self.config
    }

    /// Reduce with the configured bin width.
    pub fn reduce(
        &self,
        image: &Image,
        scattering_field: &ScatteringVectorField,
        mask: &Mask,
        center: Center,
    ) -> Result<RadialProfile> {
        self.reduce_with_width(image, scattering_field, mask, center, self.config.bin_width)
    }

    pub fn reduce_with_width(
        &self,
        image: &Image,
        scattering_field: &ScatteringVectorField,
        mask: &Mask,
        center: Center,
        bin_width: Option<f64>,
    ) -> Result<RadialProfile> {
        let shape = image.dim();
        ensure_same_shape("scattering vector field", shape, scattering_field.dim())?;
        ensure_same_shape("radial mask", shape, mask.dim())?;
        if let Some(width) = bin_width {
            if !width.is_finite() || width <= 0.0 {
                return Err(DiffractionError::InvalidBinWidth { bin_width: width });
            }
        }
        center.ensure_within(shape, self.config.center_tolerance)?;

        let span = OperationSpan::new("azimuthal_average", shape);
        let _enter = span.enter();

        let mut samples = Vec::new();
        let mut r_max: f64 = 0.0;
        for ((row, col), &valid) in mask.indexed_iter() {
            let (q, intensity) = (scattering_field[[row, col]], image[[row, col]]);
            if valid && q.is_finite() && intensity.is_finite() {
                samples.push((q, intensity));
                r_max = r_max.max(center.distance_to(row as f64, col as f64));
            }
        }

        if samples.is_empty() {
            let error = DiffractionError::EmptyProfile {
                valid_pixels: mask.iter().filter(|valid| **valid).count(),
            };
            span.record_failure(&error);
            return Err(error);
        }

        let (q_min, q_max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(q, _)| (lo.min(q), hi.max(q)));
        let range = q_max - q_min;

        let (width, bin_count) = match bin_width {
            Some(width) => {
                let bins = (range / width).floor() + 1.0;
                if !(bins <= MAX_BIN_COUNT as f64) {
                    let error = DiffractionError::InvalidBinWidth { bin_width: width };
                    span.record_failure(&error);
                    return Err(error);
                }
                (width, bins as usize)
            }
            None => {
                let count = (r_max.ceil() as usize).max(1);
                (range / count as f64, count)
            }
        };

        let mut sums = vec![0.0; bin_count];
        let mut counts = vec![0usize; bin_count];
        for &(q, intensity) in &samples {
            let bin = if width > 0.0 {
                (((q - q_min) / width).floor() as usize).min(bin_count - 1)
            } else {
                0
            };
            sums[bin] += intensity;
            counts[bin] += 1;
        }

        let points: Vec<RadialPoint> = sums
            .iter()
            .zip(&counts)
            .enumerate()
            .filter(|(_, (_, count))| **count > 0)
            .map(|(bin, (sum, count))| RadialPoint {
                q: q_min + (bin as f64 + 0.5) * width,
                intensity: sum / *count as f64,
                count: *count,
            })
            .collect();

        tracing::debug!(
            valid_pixels = samples.len(),
            bins = bin_count,
            occupied = points.len(),
            bin_width = width,
            "radial profile computed"
        );
        span.record_success("azimuthal average finished");

        Ok(RadialProfile {
            points,
            bin_width: width,
        })
    }
}

/// Average `image` over rings of constant scattering-vector magnitude.
///
/// Without an explicit `bin_width`, one bin is used per pixel of radius
/// between `center` and the farthest valid pixel.
pub fn azimuthal_average(
    image: &Image,
    scattering_field: &ScatteringVectorField,
    mask: &Mask,
    center: Center,
    bin_width: Option<f64>,
) -> Result<RadialProfile> {
    RadialReducer::default().reduce_with_width(image, scattering_field, mask, center, bin_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_range_gives_single_bin() {
        let image = Image::from_elem((3, 3), 2.0);
        let field = ScatteringVectorField::from_elem((3, 3), 1.5);
        let mask = Mask::from_elem((3, 3), true);

        let profile = azimuthal_average(&image, &field, &mask, Center::of_shape((3, 3)), None).unwrap();
        assert_eq!(profile.len(), 1);
        assert_eq!(profile.points()[0].q, 1.5);
        assert_eq!(profile.points()[0].count, 9);
    }

    #[test]
    fn test_non_finite_pixels_are_ignored() {
        let mut image = Image::from_elem((2, 2), 1.0);
        image[[0, 0]] = f64::NAN;
        let mut field = ScatteringVectorField::from_elem((2, 2), 0.5);
        field[[1, 1]] = f64::INFINITY;
        let mask = Mask::from_elem((2, 2), true);

        let profile = azimuthal_average(&image, &field, &mask, Center::of_shape((2, 2)), Some(1.0)).unwrap();
        assert_eq!(profile.counts(), vec![2]);
        assert_eq!(profile.intensity(), vec![1.0]);
    }
}
