//! Validity-mask utilities.
//!
//! Masks follow the crate-wide convention: `true` marks a valid pixel.

use ndarray::Zip;
use std::borrow::Borrow;
use std::iter::FusedIterator;

use crate::data::{Image, Mask};
use crate::error::{ensure_same_shape, DiffractionError, Result};

/// Pixels valid in every mask.
pub fn combine_masks<'a, I>(masks: I) -> Result<Mask>
where
    I: IntoIterator<Item = &'a Mask>,
{
    fold_masks(masks, |acc, valid| *acc &= valid)
}

/// Pixels valid in at least one mask.
pub fn union_masks<'a, I>(masks: I) -> Result<Mask>
where
    I: IntoIterator<Item = &'a Mask>,
{
    fold_masks(masks, |acc, valid| *acc |= valid)
}

fn fold_masks<'a, I, F>(masks: I, op: F) -> Result<Mask>
where
    I: IntoIterator<Item = &'a Mask>,
    F: Fn(&mut bool, bool),
{
    let mut masks = masks.into_iter();
    let mut combined = masks
        .next()
        .ok_or_else(|| DiffractionError::InvalidParameter("at least one mask is required".to_string()))?
        .clone();

    for mask in masks {
        ensure_same_shape("combined mask", combined.dim(), mask.dim())?;
        Zip::from(&mut combined).and(mask).for_each(|acc, &valid| op(acc, valid));
    }
    Ok(combined)
}

/// Running per-pixel mean and variance over a collection (Welford).
struct PixelStatistics {
    count: usize,
    mean: Image,
    m2: Image,
}

impl PixelStatistics {
    fn new(shape: (usize, usize)) -> Self {
        Self {
            count: 0,
            mean: Image::zeros(shape),
            m2: Image::zeros(shape),
        }
    }

    fn push(&mut self, image: &Image) -> Result<()> {
        ensure_same_shape("collection image", self.mean.dim(), image.dim())?;

        self.count += 1;
        let n = self.count as f64;
        Zip::from(&mut self.mean)
            .and(&mut self.m2)
            .and(image)
            .for_each(|mean, m2, &value| {
                let delta = value - *mean;
                *mean += delta / n;
                *m2 += delta * (value - *mean);
            });
        Ok(())
    }

    fn accumulate<'a, I>(images: I, mut visit: impl FnMut(&Image)) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Image>,
    {
        let mut stats: Option<Self> = None;

        for image in images {
            visit(image);
            stats
                .get_or_insert_with(|| Self::new(image.dim()))
                .push(image)?;
        }

        stats.ok_or_else(|| DiffractionError::InvalidParameter("image collection is empty".to_string()))
    }

    fn std(&self) -> Image {
        let n = self.count as f64;
        self.m2.mapv(|m2| (m2 / n).max(0.0).sqrt())
    }

    /// Mean over standard deviation; zero where the spread is zero.
    fn snr(&self) -> Image {
        let mut snr = Image::zeros(self.mean.dim());
        Zip::from(&mut snr)
            .and(&self.mean)
            .and(&self.std())
            .for_each(|out, &mean, &std| {
                if std > 0.0 {
                    *out = mean / std;
                }
            });
        snr
    }
}

/// Mask of pixels that stay trustworthy across a whole collection.
///
/// A pixel is invalid if any image puts it outside the inclusive
/// `pixel_threshold` range, or if its standard deviation over the collection
/// exceeds `std_threshold`. The collection is consumed in one pass.
pub fn mask_from_collection<'a, I>(
    images: I,
    pixel_threshold: (f64, f64),
    std_threshold: Option<f64>,
) -> Result<Mask>
where
    I: IntoIterator<Item = &'a Image>,
{
    let (low, high) = pixel_threshold;
    if !(low <= high) {
        return Err(DiffractionError::InvalidParameter(format!(
            "pixel threshold range ({low}, {high}) is empty"
        )));
    }

    let mut mask: Option<Mask> = None;
    let stats = PixelStatistics::accumulate(images, |image| {
        let mask = mask.get_or_insert_with(|| Mask::from_elem(image.dim(), true));
        if mask.dim() == image.dim() {
            Zip::from(mask)
                .and(image)
                .for_each(|valid, &value| *valid &= value >= low && value <= high);
        }
    })?;
    let mut mask = mask.unwrap_or_else(|| Mask::from_elem(stats.mean.dim(), true));

    if let Some(threshold) = std_threshold {
        Zip::from(&mut mask)
            .and(&stats.std())
            .for_each(|valid, &std| *valid &= std <= threshold);
    }

    tracing::debug!(
        images = stats.count,
        valid_pixels = mask.iter().filter(|valid| **valid).count(),
        "collection mask computed"
    );
    Ok(mask)
}

/// Per-pixel signal-to-noise ratio (mean over standard deviation) of a
/// collection. Pixels with zero spread get zero.
pub fn snr_from_collection<'a, I>(images: I) -> Result<Image>
where
    I: IntoIterator<Item = &'a Image>,
{
    PixelStatistics::accumulate(images, |_| {}).map(|stats| stats.snr())
}

/// Signal-to-noise ratio of a stream, updated after every image.
///
/// The `n`-th item is the SNR over the first `n` images. A shape mismatch is
/// yielded once and ends the stream.
pub fn running_snr<I>(images: I) -> RunningSnr<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Image>,
{
    RunningSnr {
        images: images.into_iter(),
        stats: None,
        finished: false,
    }
}

/// Lazy output of [`running_snr`].
pub struct RunningSnr<I> {
    images: I,
    stats: Option<PixelStatistics>,
    finished: bool,
}

impl<I> RunningSnr<I> {
    /// Images accumulated so far.
    pub fn images_seen(&self) -> usize {
        self.stats.as_ref().map_or(0, |stats| stats.count)
    }
}

impl<I> Iterator for RunningSnr<I>
where
    I: Iterator,
    I::Item: Borrow<Image>,
{
    type Item = Result<Image>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(item) = self.images.next() else {
            self.finished = true;
            return None;
        };

        let image: &Image = item.borrow();
        let stats = self.stats.get_or_insert_with(|| PixelStatistics::new(image.dim()));
        match stats.push(image) {
            Ok(()) => Some(Ok(stats.snr())),
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

impl<I> FusedIterator for RunningSnr<I>
where
    I: Iterator,
    I::Item: Borrow<Image>,
{
}

/// Mask rejecting values below the given percentile of the valid pixels.
pub fn trim_low(image: &Image, mask: &Mask, percentile: f64) -> Result<Mask> {
    let threshold = masked_percentile(image, mask, percentile)?;
    Ok(threshold_mask(image, mask, |value| value >= threshold))
}

/// Mask rejecting values above the given percentile of the valid pixels.
pub fn trim_high(image: &Image, mask: &Mask, percentile: f64) -> Result<Mask> {
    let threshold = masked_percentile(image, mask, percentile)?;
    Ok(threshold_mask(image, mask, |value| value <= threshold))
}

fn threshold_mask(image: &Image, mask: &Mask, keep: impl Fn(f64) -> bool) -> Mask {
    let mut out = mask.clone();
    Zip::from(&mut out)
        .and(image)
        .for_each(|valid, &value| *valid = *valid && keep(value));
    out
}

/// Linearly interpolated percentile of the finite, valid pixels.
fn masked_percentile(image: &Image, mask: &Mask, percentile: f64) -> Result<f64> {
    ensure_same_shape("trim mask", image.dim(), mask.dim())?;
    if !(0.0..=100.0).contains(&percentile) {
        return Err(DiffractionError::InvalidParameter(format!(
            "percentile {percentile} outside [0, 100]"
        )));
    }

    let mut values: Vec<f64> = image
        .iter()
        .zip(mask.iter())
        .filter(|(value, valid)| **valid && value.is_finite())
        .map(|(value, _)| *value)
        .collect();
    if values.is_empty() {
        return Err(DiffractionError::InvalidParameter(
            "no valid pixels to take a percentile of".to_string(),
        ));
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = percentile / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Ok(values[lower] + (values[upper] - values[lower]) * fraction)
}

/// Copy of `image` with invalid pixels replaced by `fill_value`.
pub fn apply_mask(image: &Image, mask: &Mask, fill_value: f64) -> Result<Image> {
    ensure_same_shape("applied mask", image.dim(), mask.dim())?;
    let mut out = image.clone();
    Zip::from(&mut out).and(mask).for_each(|value, &valid| {
        if !valid {
            *value = fill_value;
        }
    });
    Ok(out)
}
