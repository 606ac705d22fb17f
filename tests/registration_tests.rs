use diffraction_analysis::config::{RegistrationConfig, SubpixelMethod};
use diffraction_analysis::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn create_noise_image(height: usize, width: usize, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    Image::from_shape_fn((height, width), |_| rng.gen_range(0.0..100.0))
}

fn create_block_image(size: usize, top: usize, left: usize) -> Image {
    Image::from_shape_fn((size, size), |(row, col)| {
        if (top..top + 3).contains(&row) && (left..left + 3).contains(&col) {
            10.0
        } else {
            0.0
        }
    })
}

fn full_mask(shape: (usize, usize)) -> Mask {
    Mask::from_elem(shape, true)
}

fn assert_offset_near(actual: AlignmentOffset, row: f64, col: f64, tolerance: f64) {
    assert!(
        (actual.row - row).abs() <= tolerance && (actual.col - col).abs() <= tolerance,
        "expected ({row}, {col}) +/- {tolerance}, got ({}, {})",
        actual.row,
        actual.col
    );
}

#[test]
fn test_identical_images_register_to_zero() {
    let image = create_noise_image(32, 40, 7);
    let mask = full_mask(image.dim());

    let aligner = MaskedCorrelationAligner::default();
    let result = aligner.register_detailed(&image, &mask, &image, &mask).unwrap();

    assert_offset_near(result.offset, 0.0, 0.0, 1e-6);
    assert!(result.peak_score > 0.999);
    assert_eq!(result.overlap_pixels, 32 * 40);
}

#[test]
fn test_integer_shift_recovery() {
    let reference = create_noise_image(48, 48, 11);
    let shifts = [(3.0, -2.0), (-5.0, 4.0), (0.0, 7.0), (6.0, 6.0)];

    let aligner = MaskedCorrelationAligner::default();
    for (row, col) in shifts {
        let moving = ImageTransformer::shift(
            &Frame::unmasked(reference.clone()),
            AlignmentOffset::new(row, col),
            0.0,
        );
        let offset = aligner
            .register(&reference, &full_mask((48, 48)), moving.image(), moving.mask())
            .unwrap();
        assert_offset_near(offset, row, col, 0.25);
    }
}

#[test]
fn test_block_displacement() {
    let reference = create_block_image(64, 30, 30);
    let moving = create_block_image(64, 32, 31);
    let mask = full_mask((64, 64));

    let offset = MaskedCorrelationAligner::default()
        .register(&reference, &mask, &moving, &mask)
        .unwrap();

    assert_offset_near(offset, 2.0, 1.0, 0.5);
}

#[test]
fn test_non_finite_pixels_are_treated_as_masked() {
    let reference = create_block_image(64, 30, 30);
    let mut moving = create_block_image(64, 32, 31);
    moving[[0, 0]] = f64::NAN;
    moving[[63, 5]] = f64::INFINITY;
    let mask = full_mask((64, 64));

    let result = MaskedCorrelationAligner::default()
        .register_detailed(&reference, &mask, &moving, &mask)
        .unwrap();

    assert_offset_near(result.offset, 2.0, 1.0, 0.5);
    assert!(result.peak_score > 0.9);
}

#[test]
fn test_integer_peak_without_subpixel_refinement() {
    let reference = create_block_image(64, 30, 30);
    let moving = create_block_image(64, 32, 31);
    let mask = full_mask((64, 64));

    let aligner = MaskedCorrelationAligner::new(RegistrationConfig {
        subpixel: SubpixelMethod::None,
        ..RegistrationConfig::default()
    });
    let offset = aligner.register(&reference, &mask, &moving, &mask).unwrap();

    assert_eq!(offset, AlignmentOffset::new(2.0, 1.0));
    assert!(!aligner.supports_subpixel());
}

#[test]
fn test_masked_detector_artifact_is_ignored() {
    let clean = create_noise_image(48, 48, 3);
    let shift = AlignmentOffset::new(-3.0, 2.0);
    let shifted = ImageTransformer::shift(&Frame::unmasked(clean.clone()), shift, 0.0);

    // Hot region fixed on the detector, present in both exposures
    let (mut reference, mut moving) = (clean, shifted.image().clone());
    let mut reference_mask = full_mask((48, 48));
    let mut moving_mask = shifted.mask().clone();
    for row in 10..20 {
        for col in 20..34 {
            reference[[row, col]] = 1.0e6;
            moving[[row, col]] = 1.0e6;
            reference_mask[[row, col]] = false;
            moving_mask[[row, col]] = false;
        }
    }

    let offset = MaskedCorrelationAligner::default()
        .register(&reference, &reference_mask, &moving, &moving_mask)
        .unwrap();

    assert_offset_near(offset, shift.row, shift.col, 0.25);
}

#[test]
fn test_no_shared_valid_pixels() {
    let image = create_noise_image(16, 16, 5);
    let valid = full_mask((16, 16));
    let invalid = Mask::from_elem((16, 16), false);

    let err = MaskedCorrelationAligner::default()
        .register(&image, &valid, &image, &invalid)
        .unwrap_err();

    assert!(matches!(err, DiffractionError::InsufficientOverlap { best_overlap: 0, .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_disjoint_masks_within_search_window() {
    let image = create_noise_image(16, 16, 9);
    let left = Mask::from_shape_fn((16, 16), |(_, col)| col < 8);
    let right = Mask::from_shape_fn((16, 16), |(_, col)| col >= 8);

    let aligner = MaskedCorrelationAligner::new(RegistrationConfig {
        max_shift: Some(0),
        ..RegistrationConfig::default()
    });
    let err = aligner.register(&image, &left, &image, &right).unwrap_err();

    assert!(matches!(err, DiffractionError::InsufficientOverlap { .. }));
}

#[test]
fn test_shape_mismatch() {
    let reference = create_noise_image(16, 16, 1);
    let moving = create_noise_image(16, 17, 2);

    let err = MaskedCorrelationAligner::default()
        .register(&reference, &full_mask((16, 16)), &moving, &full_mask((16, 17)))
        .unwrap_err();
    assert!(matches!(err, DiffractionError::ShapeMismatch { .. }));

    let err = MaskedCorrelationAligner::default()
        .register(&reference, &full_mask((15, 16)), &reference, &full_mask((16, 16)))
        .unwrap_err();
    assert!(matches!(err, DiffractionError::ShapeMismatch { .. }));
}

#[test]
fn test_max_shift_limits_search() {
    let reference = create_noise_image(32, 32, 21);
    let moving = ImageTransformer::shift(
        &Frame::unmasked(reference.clone()),
        AlignmentOffset::new(6.0, 0.0),
        0.0,
    );

    let aligner = MaskedCorrelationAligner::new(RegistrationConfig {
        max_shift: Some(2),
        ..RegistrationConfig::default()
    });
    let offset = aligner
        .register(&reference, &full_mask((32, 32)), moving.image(), moving.mask())
        .unwrap();

    assert!(offset.row.abs() <= 2.5);
    assert!(offset.col.abs() <= 2.5);
}

#[test]
fn test_registration_algorithm_trait() {
    let reference = Frame::unmasked(create_block_image(32, 10, 10));
    let moving = Frame::unmasked(create_block_image(32, 12, 9));

    let algorithm: Box<dyn RegistrationAlgorithm> = Box::new(MaskedCorrelationAligner::default());
    let offset = algorithm.register_frames(&reference, &moving).unwrap();

    assert_eq!(algorithm.name(), "MaskedNCC");
    assert!(algorithm.supports_subpixel());
    assert_offset_near(offset, 2.0, -1.0, 0.5);
}
