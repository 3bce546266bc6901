use image::{GrayImage, Luma};
use imageproc::{distance_transform::Norm, map::map_colors, morphology};

use crate::config::Kernel;

/// Force every pixel to 0 or 255
pub fn rebinarize(mask: &GrayImage) -> GrayImage {
    map_colors(mask, |p| if p[0] > 0 { Luma([255u8]) } else { Luma([0u8]) })
}

pub fn dilate(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    morphology::dilate(mask, Norm::LInf, kernel.radius())
}

pub fn erode(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    morphology::erode(mask, Norm::LInf, kernel.radius())
}

/// Morphological closing: dilate then erode with the same square element
pub fn close(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    if kernel.radius() == 0 {
        return rebinarize(mask);
    }
    rebinarize(&erode(&dilate(mask, kernel), kernel))
}
