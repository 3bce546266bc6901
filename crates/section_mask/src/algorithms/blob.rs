use std::collections::BTreeMap;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::{
    error::{MaskError, Result},
    types::ComponentStats,
};

pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// A blob touching more image borders than this spans the frame
pub const MAX_EDGE_CONTACTS: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u64,
    sum_x: f64,
    sum_y: f64,
}

impl Accumulator {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 0,
            sum_x: 0.0,
            sum_y: 0.0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
        self.sum_x += x as f64;
        self.sum_y += y as f64;
    }

    fn into_stats(self, label: u32) -> ComponentStats {
        ComponentStats {
            label,
            left: self.min_x,
            top: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
            area: self.area,
            centroid: [
                self.sum_x / self.area as f64,
                self.sum_y / self.area as f64,
            ],
        }
    }
}

/// 4-connected labeling of the non-zero pixels with per-component statistics.
///
/// Label 0 is the background and gets no entry; stats are ordered by label.
pub fn component_stats(binary: &GrayImage) -> (LabelImage, Vec<ComponentStats>) {
    let labels = connected_components(binary, Connectivity::Four, Luma([0u8]));

    let mut regions: BTreeMap<u32, Accumulator> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .or_insert_with(|| Accumulator::new(x, y))
            .add(x, y);
    }

    let stats = regions
        .into_iter()
        .map(|(label, acc)| acc.into_stats(label))
        .collect();
    (labels, stats)
}

/// How many of the four image borders the bounding box lies on
pub fn edge_contacts(stats: &ComponentStats, width: u32, height: u32) -> usize {
    [
        stats.left == 0,
        stats.top == 0,
        stats.right() == width,
        stats.bottom() == height,
    ]
    .into_iter()
    .filter(|&touches| touches)
    .count()
}

/// Largest component that does not span the frame.
///
/// Components are ranked by area, largest first, ties broken by label.
pub fn select_main_blob(
    stats: &[ComponentStats],
    width: u32,
    height: u32,
) -> Option<ComponentStats> {
    let mut ranked: Vec<&ComponentStats> = stats.iter().filter(|s| s.label != 0).collect();
    ranked.sort_by(|a, b| b.area.cmp(&a.area).then(a.label.cmp(&b.label)));

    ranked
        .into_iter()
        .find(|s| edge_contacts(s, width, height) <= MAX_EDGE_CONTACTS)
        .copied()
}

/// Binary image holding only the main blob of a thresholded image
pub fn extract_blob(binary: &GrayImage) -> Result<GrayImage> {
    let (width, height) = binary.dimensions();
    let (labels, stats) = component_stats(binary);

    let blob = select_main_blob(&stats, width, height).ok_or(MaskError::NoBlobFound)?;
    tracing::debug!(
        "Selected blob {} of {}: area {}, bbox {}x{} at ({}, {})",
        blob.label,
        stats.len(),
        blob.area,
        blob.width,
        blob.height,
        blob.left,
        blob.top
    );

    Ok(GrayImage::from_fn(width, height, |x, y| {
        if labels.get_pixel(x, y)[0] == blob.label {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    }))
}
