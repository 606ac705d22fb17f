use crate::data::{AlignmentOffset, Center, Frame, Image, Mask};

/// Interpolation weights at or below this are treated as absent, so samples
/// landing exactly on the grid only depend on the pixel they land on.
const WEIGHT_EPSILON: f64 = 1e-9;

pub struct ImageTransformer;

impl ImageTransformer {
    /// Translate a frame so that content at `p` moves to `p + offset`.
    ///
    /// Output pixels whose source neighbourhood leaves the frame or touches an
    /// invalid pixel are set to `fill_value` and marked invalid.
    pub fn shift(frame: &Frame, offset: AlignmentOffset, fill_value: f64) -> Frame {
        let (height, width) = frame.shape();
        let mut image = Image::from_elem((height, width), fill_value);
        let mut mask = Mask::from_elem((height, width), false);

        for row in 0..height {
            for col in 0..width {
                let src_row = row as f64 - offset.row;
                let src_col = col as f64 - offset.col;

                if let Some(value) = sample_bilinear(frame.image(), frame.mask(), src_row, src_col) {
                    image[[row, col]] = value;
                    mask[[row, col]] = true;
                }
            }
        }

        Frame::from_parts(image, mask)
    }

    /// Position of `(row, col)` after rotating by `angle_degrees` about `center`.
    ///
    /// Angles are counter-clockwise as displayed, i.e. with rows growing
    /// downwards.
    pub fn rotate_point(center: Center, row: f64, col: f64, angle_degrees: f64) -> (f64, f64) {
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        let x = col - center.col;
        let y = center.row - row;

        let x_rot = x * cos_a - y * sin_a;
        let y_rot = x * sin_a + y * cos_a;

        (center.row - y_rot, center.col + x_rot)
    }

    /// Mirror image of `(row, col)` across the line through `center` at
    /// `axis_degrees` (counter-clockwise from the +column direction).
    pub fn reflect_point(center: Center, row: f64, col: f64, axis_degrees: f64) -> (f64, f64) {
        let (sin_a, cos_a) = axis_degrees.to_radians().sin_cos();
        let x = col - center.col;
        let y = center.row - row;

        let along = x * cos_a + y * sin_a;
        let x_ref = 2.0 * along * cos_a - x;
        let y_ref = 2.0 * along * sin_a - y;

        (center.row - y_ref, center.col + x_ref)
    }
}

/// Bilinear sample at a fractional position, honouring the mask.
///
/// Returns `None` unless every neighbour carrying interpolation weight lies
/// inside the image and is valid.
pub fn sample_bilinear(image: &Image, mask: &Mask, row: f64, col: f64) -> Option<f64> {
    if !row.is_finite() || !col.is_finite() {
        return None;
    }

    let (height, width) = image.dim();
    let row0 = row.floor();
    let col0 = col.floor();
    let fr = row - row0;
    let fc = col - col0;
    let (row0, col0) = (row0 as isize, col0 as isize);

    let taps = [
        (row0, col0, (1.0 - fr) * (1.0 - fc)),
        (row0, col0 + 1, (1.0 - fr) * fc),
        (row0 + 1, col0, fr * (1.0 - fc)),
        (row0 + 1, col0 + 1, fr * fc),
    ];

    let mut value = 0.0;
    let mut total_weight = 0.0;

    for (r, c, weight) in taps {
        if weight <= WEIGHT_EPSILON {
            continue;
        }
        if r < 0 || c < 0 || r >= height as isize || c >= width as isize {
            return None;
        }
        let (r, c) = (r as usize, c as usize);
        if !mask[[r, c]] {
            return None;
        }
        value += weight * image[[r, c]];
        total_weight += weight;
    }

    if total_weight > 0.0 {
        Some(value / total_weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(height: usize, width: usize) -> Image {
        Array2::from_shape_fn((height, width), |(r, c)| (r * width + c) as f64)
    }

    #[test]
    fn test_integer_shift_moves_content_and_masks_border() {
        let frame = Frame::unmasked(ramp(5, 6));
        let shifted = ImageTransformer::shift(&frame, AlignmentOffset::new(1.0, 2.0), -1.0);

        assert_eq!(shifted.image()[[1, 2]], frame.image()[[0, 0]]);
        assert_eq!(shifted.image()[[4, 5]], frame.image()[[3, 3]]);
        assert!(!shifted.mask()[[0, 3]]);
        assert!(!shifted.mask()[[2, 1]]);
        assert_eq!(shifted.image()[[0, 0]], -1.0);
        assert_eq!(shifted.valid_count(), 4 * 4);
    }

    #[test]
    fn test_fractional_shift_interpolates() {
        let frame = Frame::unmasked(ramp(4, 4));
        let shifted = ImageTransformer::shift(&frame, AlignmentOffset::new(0.0, 0.5), 0.0);

        assert!((shifted.image()[[1, 1]] - 4.5).abs() < 1e-12);
        assert!(!shifted.mask()[[1, 0]]);
    }

    #[test]
    fn test_sample_rejects_invalid_neighbour() {
        let image = ramp(3, 3);
        let mut mask = Mask::from_elem((3, 3), true);
        mask[[1, 2]] = false;

        assert!(sample_bilinear(&image, &mask, 1.0, 1.5).is_none());
        assert_eq!(sample_bilinear(&image, &mask, 1.0, 1.0), Some(4.0));
        assert!(sample_bilinear(&image, &mask, -0.5, 0.0).is_none());
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let center = Center::new(2.0, 2.0);
        let (row, col) = ImageTransformer::rotate_point(center, 2.0, 4.0, 90.0);
        assert!((row - 0.0).abs() < 1e-12);
        assert!((col - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_reflect_across_horizontal_axis() {
        let center = Center::new(2.0, 2.0);
        let (row, col) = ImageTransformer::reflect_point(center, 0.0, 3.0, 0.0);
        assert!((row - 4.0).abs() < 1e-12);
        assert!((col - 3.0).abs() < 1e-12);

        let (row, col) = ImageTransformer::reflect_point(center, 0.0, 3.0, 90.0);
        assert!((row - 0.0).abs() < 1e-12);
        assert!((col - 1.0).abs() < 1e-12);
    }
}
