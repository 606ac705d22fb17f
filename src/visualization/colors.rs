//! Rainbow palettes for plotting time series of profiles.

/// RGB triple with components in `[0, 1]`.
pub type Rgb = (f64, f64, f64);

/// Largest hue used; stops the palette at violet instead of wrapping to red.
const MAX_HUE: f64 = 0.8;
const SATURATION: f64 = 0.7;
const VALUE: f64 = 0.9;

/// `count` evenly spaced spectrum colors, from violet to red.
pub fn spectrum_colors(count: usize) -> impl DoubleEndedIterator<Item = Rgb> + ExactSizeIterator {
    (0..count)
        .rev()
        .map(move |i| hue_to_rgb(i as f64 / count as f64))
}

/// One spectrum color per value, spaced according to the values themselves.
///
/// The smallest value maps to red and the largest to violet; the output is in
/// reverse input order. A constant sequence maps entirely to red.
pub fn spectrum_colors_for<I>(values: I) -> impl DoubleEndedIterator<Item = Rgb> + ExactSizeIterator
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values.into_iter().rev().map(move |value| {
        let hue = if range > 0.0 { (value - min) / range } else { 0.0 };
        hue_to_rgb(hue)
    })
}

fn hue_to_rgb(hue: f64) -> Rgb {
    hsv_to_rgb(MAX_HUE * hue, SATURATION, VALUE)
}

/// HSV to RGB conversion, all components in `[0, 1]`.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> Rgb {
    if saturation == 0.0 {
        return (value, value, value);
    }

    let scaled = hue * 6.0;
    let sector = scaled.floor();
    let f = scaled - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));

    match (sector as i64).rem_euclid(6) {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    }
}
