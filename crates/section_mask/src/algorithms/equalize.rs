use image::Luma;

use crate::{
    config::ClaheParams,
    error::{MaskError, Result},
    types::{Plane, Sample},
};

fn bin_of<T: Sample>(value: T, bins: usize) -> usize {
    let bin = value.as_f64() / (T::FULL_SCALE + 1.0) * bins as f64;
    (bin as usize).min(bins - 1)
}

/// Clipped, redistributed cumulative histogram of one tile mapped to `[0, FULL_SCALE]`
fn tile_lut<T: Sample>(
    plane: &Plane<T>,
    x_range: (u32, u32),
    y_range: (u32, u32),
    clip_limit: f32,
) -> Vec<f64> {
    let bins = T::HISTOGRAM_BINS;
    let mut histogram = vec![0u64; bins];
    for y in y_range.0..y_range.1 {
        for x in x_range.0..x_range.1 {
            histogram[bin_of(plane.get_pixel(x, y)[0], bins)] += 1;
        }
    }

    let area = ((x_range.1 - x_range.0) as u64 * (y_range.1 - y_range.0) as u64).max(1);
    let clip = ((clip_limit as f64 * area as f64 / bins as f64).round() as u64).max(1);

    let mut excess = 0u64;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let increment = excess / bins as u64;
    let mut remainder = excess % bins as u64;
    for count in histogram.iter_mut() {
        *count += increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut cumulative = 0u64;
    histogram
        .into_iter()
        .map(|count| {
            cumulative += count;
            cumulative as f64 / area as f64 * T::FULL_SCALE
        })
        .collect()
}

/// Tile index pair and the weight of the second tile for one coordinate
fn neighbours(coord: u32, tile_size: u32, tiles: usize) -> (usize, usize, f64) {
    let position = (coord as f64 + 0.5) / tile_size as f64 - 0.5;
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = (position.floor() as usize).min(tiles - 1);
    let second = (first + 1).min(tiles - 1);
    let weight = (position - first as f64).clamp(0.0, 1.0);
    (first, second, weight)
}

/// Contrast limited adaptive histogram equalization.
///
/// Each tile gets its own clipped mapping; pixels blend the four closest
/// tile mappings bilinearly so tile seams do not show.
pub fn clahe<T: Sample>(plane: &Plane<T>, params: &ClaheParams) -> Result<Plane<T>> {
    if !(params.clip_limit > 0.0) {
        return Err(MaskError::InvalidParameter(format!(
            "CLAHE clip limit must be positive, got {}",
            params.clip_limit
        )));
    }
    if params.tiles_x == 0 || params.tiles_y == 0 {
        return Err(MaskError::InvalidParameter(
            "CLAHE tile grid must be at least 1x1".to_string(),
        ));
    }

    let (width, height) = plane.dimensions();
    if width == 0 || height == 0 {
        return Ok(plane.clone());
    }

    let tile_width = width.div_ceil(params.tiles_x.min(width));
    let tile_height = height.div_ceil(params.tiles_y.min(height));
    let tiles_x = width.div_ceil(tile_width) as usize;
    let tiles_y = height.div_ceil(tile_height) as usize;

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y as u32 {
        for tx in 0..tiles_x as u32 {
            let x_range = (tx * tile_width, ((tx + 1) * tile_width).min(width));
            let y_range = (ty * tile_height, ((ty + 1) * tile_height).min(height));
            luts.push(tile_lut(plane, x_range, y_range, params.clip_limit));
        }
    }

    let bins = T::HISTOGRAM_BINS;
    let columns: Vec<_> = (0..width)
        .map(|x| neighbours(x, tile_width, tiles_x))
        .collect();

    let mut output = Plane::<T>::new(width, height);
    for y in 0..height {
        let (y0, y1, wy) = neighbours(y, tile_height, tiles_y);
        for x in 0..width {
            let (x0, x1, wx) = columns[x as usize];
            let bin = bin_of(plane.get_pixel(x, y)[0], bins);

            let top = luts[y0 * tiles_x + x0][bin] * (1.0 - wx) + luts[y0 * tiles_x + x1][bin] * wx;
            let bottom = luts[y1 * tiles_x + x0][bin] * (1.0 - wx) + luts[y1 * tiles_x + x1][bin] * wx;
            output.put_pixel(x, y, Luma([T::from_f64(top * (1.0 - wy) + bottom * wy)]));
        }
    }

    Ok(output)
}

/// Apply CLAHE stages in order
pub fn equalize<T: Sample>(plane: &Plane<T>, stages: &[ClaheParams]) -> Result<Plane<T>> {
    let mut current = plane.clone();
    for stage in stages {
        tracing::debug!(
            "CLAHE clip {} on a {}x{} grid",
            stage.clip_limit,
            stage.tiles_x,
            stage.tiles_y
        );
        current = clahe(&current, stage)?;
    }
    Ok(current)
}
