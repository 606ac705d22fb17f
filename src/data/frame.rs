use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub};

use crate::error::{ensure_same_shape, DiffractionError, Result};

/// Real-valued detector intensities, indexed `[row, col]`.
pub type Image = Array2<f64>;

/// Per-pixel validity; `true` marks a trustworthy pixel.
pub type Mask = Array2<bool>;

/// Precomputed scattering-vector magnitude for every detector pixel.
pub type ScatteringVectorField = Array2<f64>;

/// Sub-pixel position in `(row, col)` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Center {
    pub row: f64,
    pub col: f64,
}

impl Center {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    /// Geometric center of an image of the given shape.
    pub fn of_shape(shape: (usize, usize)) -> Self {
        Self {
            row: (shape.0 as f64 - 1.0) / 2.0,
            col: (shape.1 as f64 - 1.0) / 2.0,
        }
    }

    pub fn is_within(&self, shape: (usize, usize), tolerance: f64) -> bool {
        let (height, width) = shape;
        if height == 0 || width == 0 || !self.row.is_finite() || !self.col.is_finite() {
            return false;
        }
        self.row >= -tolerance
            && self.col >= -tolerance
            && self.row <= height as f64 - 1.0 + tolerance
            && self.col <= width as f64 - 1.0 + tolerance
    }

    pub fn ensure_within(&self, shape: (usize, usize), tolerance: f64) -> Result<()> {
        if self.is_within(shape, tolerance) {
            Ok(())
        } else {
            Err(DiffractionError::CenterOutOfBounds {
                center: *self,
                shape,
                tolerance,
            })
        }
    }

    pub fn distance_to(&self, row: f64, col: f64) -> f64 {
        (row - self.row).hypot(col - self.col)
    }
}

/// Displacement of a moving image relative to its reference, `(row, col)`.
///
/// Resampling the moving image by the negated offset brings it onto the
/// reference.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentOffset {
    pub row: f64,
    pub col: f64,
}

impl AlignmentOffset {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.row == 0.0 && self.col == 0.0
    }

    pub fn magnitude(&self) -> f64 {
        self.row.hypot(self.col)
    }
}

impl Add for AlignmentOffset {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.row + rhs.row, self.col + rhs.col)
    }
}

impl AddAssign for AlignmentOffset {
    fn add_assign(&mut self, rhs: Self) {
        self.row += rhs.row;
        self.col += rhs.col;
    }
}

impl Sub for AlignmentOffset {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.row - rhs.row, self.col - rhs.col)
    }
}

impl Neg for AlignmentOffset {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.row, -self.col)
    }
}

/// Rectangular region of interest in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: usize,
    pub left: usize,
    pub height: usize,
    pub width: usize,
}

impl BoundingBox {
    pub fn new(top: usize, left: usize, height: usize, width: usize) -> Self {
        Self {
            top,
            left,
            height,
            width,
        }
    }

    /// Region covering a whole frame of the given shape.
    pub fn full(shape: (usize, usize)) -> Self {
        Self::new(0, 0, shape.0, shape.1)
    }

    pub fn bottom(&self) -> usize {
        self.top + self.height
    }

    pub fn right(&self) -> usize {
        self.left + self.width
    }

    pub fn ensure_fits(&self, shape: (usize, usize)) -> Result<()> {
        let fits = self.height > 0
            && self.width > 0
            && self.bottom() <= shape.0
            && self.right() <= shape.1;
        if fits {
            Ok(())
        } else {
            Err(DiffractionError::InvalidRegion {
                region: *self,
                shape,
            })
        }
    }

    pub fn crop<T: Clone>(&self, array: &Array2<T>) -> Result<Array2<T>> {
        self.ensure_fits(array.dim())?;
        Ok(array
            .slice(s![self.top..self.bottom(), self.left..self.right()])
            .to_owned())
    }
}

/// An image together with its validity mask. Shapes always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: Image,
    mask: Mask,
}

impl Frame {
    pub fn new(image: Image, mask: Mask) -> Result<Self> {
        ensure_same_shape("frame mask", image.dim(), mask.dim())?;
        Ok(Self { image, mask })
    }

    /// Caller guarantees matching shapes.
    pub(crate) fn from_parts(image: Image, mask: Mask) -> Self {
        debug_assert_eq!(image.dim(), mask.dim());
        Self { image, mask }
    }

    /// Frame whose every pixel is valid.
    pub fn unmasked(image: Image) -> Self {
        let mask = Mask::from_elem(image.dim(), true);
        Self { image, mask }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.dim()
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&valid| valid).count()
    }

    pub fn crop(&self, region: &BoundingBox) -> Result<Frame> {
        Ok(Self {
            image: region.crop(&self.image)?,
            mask: region.crop(&self.mask)?,
        })
    }

    pub fn into_parts(self) -> (Image, Mask) {
        (self.image, self.mask)
    }
}

/// Ideal scattering-vector field of a flat, undistorted detector: `q` grows
/// linearly with pixel distance from `center`.
pub fn radial_scattering_field(
    shape: (usize, usize),
    center: Center,
    q_per_pixel: f64,
) -> ScatteringVectorField {
    Array2::from_shape_fn(shape, |(row, col)| {
        q_per_pixel * center.distance_to(row as f64, col as f64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_mismatched_mask() {
        let image = Image::zeros((4, 5));
        let mask = Mask::from_elem((5, 4), true);
        let err = Frame::new(image, mask).unwrap_err();
        assert!(matches!(err, DiffractionError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_bounding_box_crop() {
        let image = Array2::from_shape_fn((6, 6), |(r, c)| (r * 10 + c) as f64);
        let region = BoundingBox::new(1, 2, 3, 2);
        let cropped = region.crop(&image).unwrap();
        assert_eq!(cropped.dim(), (3, 2));
        assert_eq!(cropped[[0, 0]], 12.0);
        assert_eq!(cropped[[2, 1]], 33.0);

        let outside = BoundingBox::new(4, 4, 3, 3);
        assert!(matches!(
            outside.crop(&image),
            Err(DiffractionError::InvalidRegion { .. })
        ));
        assert!(BoundingBox::new(0, 0, 0, 3).ensure_fits((6, 6)).is_err());
    }

    #[test]
    fn test_center_bounds() {
        let center = Center::new(-0.5, 3.0);
        assert!(!center.is_within((8, 8), 0.0));
        assert!(center.is_within((8, 8), 1.0));
        assert!(Center::of_shape((8, 8)).ensure_within((8, 8), 0.0).is_ok());
    }

    #[test]
    fn test_offset_arithmetic() {
        let mut total = AlignmentOffset::zero();
        total += AlignmentOffset::new(1.5, -2.0);
        total += AlignmentOffset::new(0.5, 1.0);
        assert_eq!(total, AlignmentOffset::new(2.0, -1.0));
        assert_eq!(-total, AlignmentOffset::new(-2.0, 1.0));
        assert!((total.magnitude() - 5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_radial_field_grows_from_center() {
        let field = radial_scattering_field((5, 5), Center::new(2.0, 2.0), 0.5);
        assert_eq!(field[[2, 2]], 0.0);
        assert!((field[[2, 4]] - 1.0).abs() < 1e-12);
        assert!((field[[0, 0]] - 0.5 * 8f64.sqrt()).abs() < 1e-12);
    }
}
