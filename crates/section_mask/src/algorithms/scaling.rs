use image::{GrayImage, ImageBuffer, Pixel};

use crate::{
    config::ScaleParams,
    error::{MaskError, Result},
    types::Sample,
};

pub fn check_shape(image_dimensions: (u32, u32), mask: &GrayImage) -> Result<()> {
    let (image_width, image_height) = image_dimensions;
    let (mask_width, mask_height) = mask.dimensions();
    if (image_width, image_height) != (mask_width, mask_height) {
        return Err(MaskError::ShapeMismatch {
            image_width,
            image_height,
            mask_width,
            mask_height,
        });
    }
    Ok(())
}

/// Value at the `1 - epsilon` quantile of the samples, never zero.
pub fn effective_max(mut values: Vec<f64>, epsilon: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MaskError::EmptyMask);
    }
    let n = values.len();
    let index = ((n as f64 * (1.0 - epsilon)).floor() as usize).min(n - 1);
    let (_, value, _) = values.select_nth_unstable_by(index, f64::total_cmp);
    Ok(if *value == 0.0 { 1.0 } else { *value })
}

/// Zero every pixel whose mask value is at or below `floor`
pub fn apply_mask<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    mask: &GrayImage,
    floor: u8,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    check_shape(image.dimensions(), mask)?;
    let mut masked = image.clone();
    for (x, y, pixel) in masked.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] <= floor {
            pixel.channels_mut().fill(<P::Subpixel as Sample>::ZERO);
        }
    }
    Ok(masked)
}

/// Rescale so the masked `1 - epsilon` quantile lands on `target_peak`,
/// zeroing everything outside the mask.
pub fn scale_and_mask<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    mask: &GrayImage,
    params: &ScaleParams,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    check_shape(image.dimensions(), mask)?;

    let inside: Vec<f64> = image
        .enumerate_pixels()
        .filter(|(x, y, _)| mask.get_pixel(*x, *y)[0] > params.mask_floor)
        .flat_map(|(_, _, pixel)| pixel.channels().iter().map(|c| c.as_f64()))
        .collect();
    let max = effective_max(inside, params.epsilon)?;
    let factor = params.target_peak / max;
    tracing::debug!("Effective maximum {max}, scale factor {factor:.4}");

    let mut scaled = image.clone();
    for (x, y, pixel) in scaled.enumerate_pixels_mut() {
        let outside = mask.get_pixel(x, y)[0] <= params.mask_floor;
        for channel in pixel.channels_mut() {
            *channel = if outside {
                <P::Subpixel as Sample>::ZERO
            } else {
                <P::Subpixel as Sample>::from_f64(channel.as_f64() * factor)
            };
        }
    }
    Ok(scaled)
}
