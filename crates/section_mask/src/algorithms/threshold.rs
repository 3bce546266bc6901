use image::{GrayImage, Luma};

use crate::{
    config::ThresholdParams,
    types::{Plane, Sample},
};

/// Valley bin and the intensity it maps to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub valley: usize,
    pub value: f64,
}

/// Equal-width histogram over the data range `[min, max]`.
///
/// A constant image gets a unit-wide range centred on its value.
pub fn histogram<T: Sample>(plane: &Plane<T>, bins: usize) -> Vec<u64> {
    let mut counts = vec![0u64; bins];
    if bins == 0 || plane.is_empty() {
        return counts;
    }

    let (mut low, mut high) = plane
        .pixels()
        .map(|p| p[0].as_f64())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if low == high {
        low -= 0.5;
        high += 0.5;
    }

    let width = (high - low) / bins as f64;
    for pixel in plane.pixels() {
        let bin = ((pixel[0].as_f64() - low) / width) as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    counts
}

/// Intensity for a given valley bin
pub fn threshold_for_valley(valley: usize, params: &ThresholdParams) -> f64 {
    let step = params.max_intensity / params.bins.max(1) as f64;
    (valley as f64 * step + params.offset).clamp(0.0, params.max_intensity)
}

/// Threshold from the least populated of the first few bins.
pub fn find_threshold<T: Sample>(plane: &Plane<T>, params: &ThresholdParams) -> Threshold {
    let counts = histogram(plane, params.bins);
    let searched = params.valley_bins.min(counts.len());

    // first minimum wins on ties
    let mut valley = 0;
    for (bin, &count) in counts[..searched].iter().enumerate() {
        if count < counts[valley] {
            valley = bin;
        }
    }
    let valley = valley.min(params.max_valley_index);

    Threshold {
        valley,
        value: threshold_for_valley(valley, params),
    }
}

/// 255 where the sample is strictly above `threshold`, 0 elsewhere
pub fn binarize<T: Sample>(plane: &Plane<T>, threshold: f64) -> GrayImage {
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        if plane.get_pixel(x, y)[0].as_f64() > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
