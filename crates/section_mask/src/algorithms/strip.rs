use image::{ImageBuffer, Pixel};

use crate::{
    config::StripParams,
    types::{Plane, Sample},
};

/// Scaled per-column intensity sums
pub fn column_profile<T: Sample>(plane: &Plane<T>, scale: f64) -> Vec<f64> {
    let mut profile = vec![0.0; plane.width() as usize];
    for (x, _, pixel) in plane.enumerate_pixels() {
        profile[x as usize] += pixel[0].as_f64();
    }
    profile.iter_mut().for_each(|sum| *sum *= scale);
    profile
}

/// Locate the scanner stripe near the right border.
///
/// Returns the negative offset (from the right edge) of the first column to
/// remove, or `None` when the search window holds no jump above the threshold.
pub fn find_strip<T: Sample>(plane: &Plane<T>, params: &StripParams) -> Option<i64> {
    let width = plane.width() as usize;
    if width < 2 || params.strip_min >= params.strip_max {
        return None;
    }

    let profile = column_profile(plane, params.column_scale);
    let diff: Vec<f64> = profile.windows(2).map(|w| w[1] - w[0]).collect();

    let start = diff.len().saturating_sub(params.strip_max);
    let end = diff.len().saturating_sub(params.strip_min);
    if start >= end {
        return None;
    }

    let jump = diff[start..end]
        .iter()
        .position(|&d| d > params.jump_threshold)?;

    // removal starts one column before the left side of the jump
    let first_column = (start + jump).saturating_sub(1);
    Some(first_column as i64 - width as i64)
}

/// Zero every column from `offset` (negative, relative to the right edge) on.
pub fn zero_strip<P>(image: &mut ImageBuffer<P, Vec<P::Subpixel>>, offset: i64)
where
    P: Pixel,
    P::Subpixel: Sample,
{
    if offset >= 0 {
        return;
    }
    let width = image.width() as i64;
    let first = (width + offset).max(0) as u32;
    for (x, _, pixel) in image.enumerate_pixels_mut() {
        if x >= first {
            pixel.channels_mut().fill(<P::Subpixel as Sample>::ZERO);
        }
    }
}

/// Copy of `plane` with the stripe removed, plus its offset (0 if none).
pub fn remove_strip<T: Sample>(plane: &Plane<T>, params: &StripParams) -> (Plane<T>, i64) {
    let mut cleaned = plane.clone();
    match find_strip(plane, params) {
        Some(offset) => {
            tracing::debug!("Strip found {} columns from the right edge", -offset);
            zero_strip(&mut cleaned, offset);
            (cleaned, offset)
        }
        None => (cleaned, 0),
    }
}
