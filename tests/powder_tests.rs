use diffraction_analysis::config::RadialConfig;
use diffraction_analysis::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn create_ring_image(field: &ScatteringVectorField) -> Image {
    field.mapv(|q| 50.0 * (-(q - 0.6).powi(2) / 0.01).exp() + 5.0)
}

fn setup(size: usize, q_per_pixel: f64) -> (Center, ScatteringVectorField, Mask) {
    let center = Center::of_shape((size, size));
    let field = radial_scattering_field((size, size), center, q_per_pixel);
    (center, field, Mask::from_elem((size, size), true))
}

#[test]
fn test_constant_image_gives_constant_profile() {
    let (center, field, mask) = setup(41, 0.05);
    let image = Image::from_elem((41, 41), 7.5);

    let profile = azimuthal_average(&image, &field, &mask, center, None).unwrap();

    assert!(!profile.is_empty());
    for point in &profile {
        assert!((point.intensity - 7.5).abs() < 1e-12);
    }
}

#[test]
fn test_profile_follows_iso_q_contours() {
    let (center, field, mask) = setup(51, 0.02);
    let image = field.clone();

    let profile = azimuthal_average(&image, &field, &mask, center, Some(0.02)).unwrap();

    // Every bin averages q values drawn from its own interval
    for point in &profile {
        assert!((point.intensity - point.q).abs() <= profile.bin_width() / 2.0 + 1e-12);
    }
}

#[test]
fn test_bins_strictly_increasing_and_occupied() {
    let (center, field, mask) = setup(64, 0.01);
    let image = create_ring_image(&field);

    for bin_width in [None, Some(0.005), Some(0.013), Some(0.1)] {
        let profile = azimuthal_average(&image, &field, &mask, center, bin_width).unwrap();

        let q = profile.q();
        assert!(q.windows(2).all(|pair| pair[1] > pair[0]));
        assert!(profile.counts().iter().all(|&count| count > 0));
        assert_eq!(profile.counts().iter().sum::<usize>(), 64 * 64);
    }
}

#[test]
fn test_automatic_bin_count() {
    let (center, field, mask) = setup(21, 1.0);
    let image = Image::from_elem((21, 21), 1.0);

    let profile = azimuthal_average(&image, &field, &mask, center, None).unwrap();

    // Farthest pixel is 10 * sqrt(2) away: 15 bins over [0, q_max]
    let q_max = 200f64.sqrt();
    assert!((profile.bin_width() - q_max / 15.0).abs() < 1e-12);
    assert!(profile.len() <= 15);
    assert!((profile.points()[0].q - profile.bin_width() / 2.0).abs() < 1e-12);
}

#[test]
fn test_masked_pixels_are_excluded() {
    let (center, field, mut mask) = setup(32, 0.03);
    let mut rng = StdRng::seed_from_u64(17);
    let mut image = create_ring_image(&field);

    let mut excluded = 0;
    for value in image.iter_mut().zip(mask.iter_mut()) {
        if rng.gen_bool(0.2) {
            *value.0 = 1.0e12;
            *value.1 = false;
            excluded += 1;
        }
    }

    let profile = azimuthal_average(&image, &field, &mask, center, Some(0.03)).unwrap();

    assert!(profile.intensity().iter().all(|&value| value < 100.0));
    assert_eq!(profile.counts().iter().sum::<usize>(), 32 * 32 - excluded);
}

#[test]
fn test_reducer_uses_configured_bin_width() {
    let (center, field, mask) = setup(32, 0.01);
    let image = create_ring_image(&field);

    let reducer = RadialReducer::new(RadialConfig {
        bin_width: Some(0.04),
        ..RadialConfig::default()
    });
    let profile = reducer.reduce(&image, &field, &mask, center).unwrap();

    assert_eq!(profile.bin_width(), 0.04);
    let q = profile.q();
    for pair in q.windows(2) {
        let steps = (pair[1] - pair[0]) / 0.04;
        assert!((steps - steps.round()).abs() < 1e-9);
    }
}

#[test]
fn test_empty_profile() {
    let (center, field, _) = setup(16, 0.1);
    let image = Image::zeros((16, 16));
    let mask = Mask::from_elem((16, 16), false);

    let err = azimuthal_average(&image, &field, &mask, center, None).unwrap_err();
    assert_eq!(err, DiffractionError::EmptyProfile { valid_pixels: 0 });

    // Valid but non-finite pixels do not count
    let nan_image = Image::from_elem((16, 16), f64::NAN);
    let all_valid = Mask::from_elem((16, 16), true);
    let err = azimuthal_average(&nan_image, &field, &all_valid, center, None).unwrap_err();
    assert_eq!(err, DiffractionError::EmptyProfile { valid_pixels: 256 });
}

#[test]
fn test_shape_mismatch() {
    let (center, field, mask) = setup(16, 0.1);
    let image = Image::zeros((16, 15));

    assert!(matches!(
        azimuthal_average(&image, &field, &mask, center, None),
        Err(DiffractionError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_invalid_bin_width() {
    let (center, field, mask) = setup(16, 0.1);
    let image = Image::zeros((16, 16));

    for width in [0.0, -0.1, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            azimuthal_average(&image, &field, &mask, center, Some(width)),
            Err(DiffractionError::InvalidBinWidth { .. })
        ));
    }
}

#[test]
fn test_tiny_bin_width_is_rejected() {
    let (center, field, mask) = setup(8, 0.1);
    let image = Image::from_elem((8, 8), 1.0);

    for width in [1e-300, f64::MIN_POSITIVE, 1e-9] {
        assert_eq!(
            azimuthal_average(&image, &field, &mask, center, Some(width)).unwrap_err(),
            DiffractionError::InvalidBinWidth { bin_width: width }
        );
    }

    // Fine but bounded widths still work
    let profile = azimuthal_average(&image, &field, &mask, center, Some(1e-4)).unwrap();
    assert_eq!(profile.counts().iter().sum::<usize>(), 64);
}

#[test]
fn test_center_out_of_bounds() {
    let (_, field, mask) = setup(16, 0.1);
    let image = Image::zeros((16, 16));

    assert!(matches!(
        azimuthal_average(&image, &field, &mask, Center::new(20.0, 3.0), None),
        Err(DiffractionError::CenterOutOfBounds { .. })
    ));
}
