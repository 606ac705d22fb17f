//! Rotational and mirror symmetrization about a diffraction center.

use crate::config::{EmptyPixelPolicy, SymmetryConfig};
use crate::data::{sample_bilinear, Center, Image, ImageTransformer, Mask};
use crate::error::{ensure_same_shape, DiffractionError, Result};
use crate::logging::OperationSpan;

/// Symmetrized intensities; `mask` is `true` where at least one copy was valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Symmetrized {
    pub image: Image,
    pub mask: Mask,
}

#[derive(Debug, Clone, Default)]
pub struct Symmetrizer {
    config: SymmetryConfig,
}

impl Symmetrizer {
    pub fn new(config: SymmetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SymmetryConfig {
        &self.config
    }

    /// Average every pixel over its `fold_order` rotations by `360°/fold_order`.
    pub fn nfold(&self, image: &Image, mask: &Mask, center: Center, fold_order: usize) -> Result<Symmetrized> {
        if fold_order == 0 {
            return Err(DiffractionError::InvalidFoldOrder { fold_order });
        }
        self.validate(image, mask, center)?;

        let span = OperationSpan::new("nfold_symmetrization", image.dim());
        let _enter = span.enter();

        let step = 360.0 / fold_order as f64;
        let result = self.average_copies(image, mask, |row, col| {
            (0..fold_order)
                .map(|k| ImageTransformer::rotate_point(center, row, col, k as f64 * step))
                .collect()
        });

        span.record_success("n-fold symmetrization finished");
        Ok(result)
    }

    /// Average every pixel with its mirror image across the axis through
    /// `center` at `axis_angle` degrees.
    pub fn reflection(&self, image: &Image, mask: &Mask, center: Center, axis_angle: f64) -> Result<Symmetrized> {
        if !axis_angle.is_finite() {
            return Err(DiffractionError::InvalidParameter(format!(
                "reflection axis angle must be finite, got {axis_angle}"
            )));
        }
        self.validate(image, mask, center)?;

        let span = OperationSpan::new("reflection_symmetrization", image.dim());
        let _enter = span.enter();

        let result = self.average_copies(image, mask, |row, col| {
            vec![
                (row, col),
                ImageTransformer::reflect_point(center, row, col, axis_angle),
            ]
        });

        span.record_success("reflection symmetrization finished");
        Ok(result)
    }

    fn validate(&self, image: &Image, mask: &Mask, center: Center) -> Result<()> {
        ensure_same_shape("symmetrization mask", image.dim(), mask.dim())?;
        center.ensure_within(image.dim(), self.config.center_tolerance)
    }

    fn average_copies<F>(&self, image: &Image, mask: &Mask, copies: F) -> Symmetrized
    where
        F: Fn(f64, f64) -> Vec<(f64, f64)>,
    {
        let shape = image.dim();
        let mut output = Image::zeros(shape);
        let mut output_mask = Mask::from_elem(shape, false);

        for ((row, col), value) in output.indexed_iter_mut() {
            let (sum, count) = copies(row as f64, col as f64)
                .into_iter()
                .filter_map(|(r, c)| sample_bilinear(image, mask, r, c))
                .fold((0.0, 0usize), |(sum, count), sample| (sum + sample, count + 1));

            if count > 0 {
                *value = sum / count as f64;
                output_mask[[row, col]] = true;
            } else {
                *value = match self.config.empty_pixel_policy {
                    EmptyPixelPolicy::KeepOriginal => image[[row, col]],
                    EmptyPixelPolicy::Fill(fill) => fill,
                };
            }
        }

        Symmetrized {
            image: output,
            mask: output_mask,
        }
    }
}

/// [`Symmetrizer::nfold`] with default settings.
pub fn nfold(image: &Image, mask: &Mask, center: Center, fold_order: usize) -> Result<Symmetrized> {
    Symmetrizer::default().nfold(image, mask, center, fold_order)
}

/// [`Symmetrizer::reflection`] with default settings.
pub fn reflection(image: &Image, mask: &Mask, center: Center, axis_angle: f64) -> Result<Symmetrized> {
    Symmetrizer::default().reflection(image, mask, center, axis_angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_masked_pixels_follow_policy() {
        let image = Image::from_elem((5, 5), 3.0);
        let mask = Mask::from_elem((5, 5), false);
        let center = Center::of_shape((5, 5));

        let kept = nfold(&image, &mask, center, 2).unwrap();
        assert!(kept.image.iter().all(|&v| v == 3.0));
        assert!(kept.mask.iter().all(|&valid| !valid));

        let filled = Symmetrizer::new(SymmetryConfig {
            empty_pixel_policy: EmptyPixelPolicy::Fill(-1.0),
            ..SymmetryConfig::default()
        })
        .nfold(&image, &mask, center, 2)
        .unwrap();
        assert!(filled.image.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_center_tolerance() {
        let image = Image::zeros((4, 4));
        let mask = Mask::from_elem((4, 4), true);
        let outside = Center::new(-1.0, 1.5);

        assert!(matches!(
            nfold(&image, &mask, outside, 2),
            Err(DiffractionError::CenterOutOfBounds { .. })
        ));

        let lenient = Symmetrizer::new(SymmetryConfig {
            center_tolerance: 2.0,
            ..SymmetryConfig::default()
        });
        assert!(lenient.nfold(&image, &mask, outside, 2).is_ok());
    }

    #[test]
    fn test_non_finite_axis_rejected() {
        let image = Image::zeros((3, 3));
        let mask = Mask::from_elem((3, 3), true);
        assert!(matches!(
            reflection(&image, &mask, Center::of_shape((3, 3)), f64::NAN),
            Err(DiffractionError::InvalidParameter(_))
        ));
    }
}
