use crate::{
    algorithms::{
        composite::{compose, CanvasSpec},
        equalize::equalize,
        scaling::{apply_mask, scale_and_mask},
        strip::zero_strip,
    },
    config::{EqualizeParams, ScaleParams},
    error::Result,
    traits::CleaningStep,
    types::{SectionImage, SectionMask},
};

/// Run `$body` on whichever buffer `$image` holds and wrap the result in
/// the same variant.
macro_rules! each_layout {
    ($image:expr, $buffer:ident => $body:expr) => {
        match $image {
            SectionImage::Gray8($buffer) => SectionImage::Gray8($body),
            SectionImage::Gray16($buffer) => SectionImage::Gray16($body),
            SectionImage::Rgb8($buffer) => SectionImage::Rgb8($body),
            SectionImage::Rgb16($buffer) => SectionImage::Rgb16($body),
        }
    };
}

/// Zero everything outside the mask and the scanner stripe
#[derive(Debug, Clone)]
pub struct MaskApplication {
    pub floor: u8,
}

impl Default for MaskApplication {
    fn default() -> Self {
        Self { floor: 10 }
    }
}

impl CleaningStep for MaskApplication {
    fn name(&self) -> &'static str {
        "mask_application"
    }

    fn apply(&self, image: SectionImage, mask: &SectionMask) -> Result<SectionImage> {
        Ok(each_layout!(image, buffer => {
            let mut masked = apply_mask(&buffer, &mask.mask, self.floor)?;
            zero_strip(&mut masked, mask.strip_offset);
            masked
        }))
    }
}

/// Percentile rescaling inside the mask
#[derive(Debug, Clone, Default)]
pub struct IntensityScaling {
    pub params: ScaleParams,
}

impl CleaningStep for IntensityScaling {
    fn name(&self) -> &'static str {
        "intensity_scaling"
    }

    fn apply(&self, image: SectionImage, mask: &SectionMask) -> Result<SectionImage> {
        Ok(each_layout!(image, buffer => scale_and_mask(&buffer, &mask.mask, &self.params)?))
    }
}

/// Staged CLAHE; colour sections pass through unchanged
#[derive(Debug, Clone, Default)]
pub struct Equalization {
    pub params: EqualizeParams,
}

impl CleaningStep for Equalization {
    fn name(&self) -> &'static str {
        "equalization"
    }

    fn apply(&self, image: SectionImage, _mask: &SectionMask) -> Result<SectionImage> {
        match image {
            SectionImage::Gray8(buffer) => Ok(SectionImage::Gray8(equalize(&buffer, &self.params.stages)?)),
            SectionImage::Gray16(buffer) => Ok(SectionImage::Gray16(equalize(&buffer, &self.params.stages)?)),
            colour => {
                tracing::debug!("Skipping equalization of a colour section");
                Ok(colour)
            }
        }
    }
}

/// Rotation, flip and centering on the specimen canvas
#[derive(Debug, Clone)]
pub struct CanvasPlacement {
    pub canvas: CanvasSpec,
}

impl CleaningStep for CanvasPlacement {
    fn name(&self) -> &'static str {
        "canvas_placement"
    }

    fn apply(&self, image: SectionImage, _mask: &SectionMask) -> Result<SectionImage> {
        Ok(each_layout!(image, buffer => compose(&buffer, &self.canvas)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::MaskError, types::Gray16Image};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn half_mask(width: u32, height: u32, strip_offset: i64) -> SectionMask {
        let mask = GrayImage::from_fn(width, height, |x, _| Luma([if x < width / 2 { 255 } else { 0 }]));
        SectionMask { mask, strip_offset }
    }

    #[test]
    fn test_mask_application_zeroes_outside_and_strip() {
        let image = SectionImage::Gray16(Gray16Image::from_pixel(20, 4, Luma([500u16])));
        let mask = SectionMask {
            mask: GrayImage::from_pixel(20, 4, Luma([255])),
            strip_offset: -3,
        };
        let SectionImage::Gray16(cleaned) = MaskApplication::default()
            .apply(image, &mask)
            .expect("Masking should succeed")
        else {
            panic!("layout must be kept");
        };
        assert_eq!(cleaned.get_pixel(16, 0)[0], 500);
        assert_eq!(cleaned.get_pixel(17, 0)[0], 0);

        let rgb = SectionImage::Rgb8(RgbImage::from_pixel(20, 4, Rgb([7, 8, 9])));
        let SectionImage::Rgb8(cleaned) = MaskApplication::default()
            .apply(rgb, &half_mask(20, 4, 0))
            .expect("Masking should succeed")
        else {
            panic!("layout must be kept");
        };
        assert_eq!(cleaned.get_pixel(2, 2), &Rgb([7, 8, 9]));
        assert_eq!(cleaned.get_pixel(12, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_scaling_rejects_mismatched_mask() {
        let image = SectionImage::Gray8(GrayImage::from_pixel(10, 10, Luma([3])));
        let result = IntensityScaling::default().apply(image, &half_mask(12, 10, 0));
        assert!(matches!(result, Err(MaskError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_equalization_skips_colour() {
        let rgb = SectionImage::Rgb16(image::ImageBuffer::from_pixel(4, 4, Rgb([1u16, 2, 3])));
        let out = Equalization::default()
            .apply(rgb.clone(), &half_mask(4, 4, 0))
            .expect("Colour should pass through");
        assert_eq!(out, rgb);
    }

    #[test]
    fn test_placement_keeps_bit_depth() {
        let image = SectionImage::Gray16(Gray16Image::from_pixel(10, 6, Luma([40000u16])));
        let step = CanvasPlacement {
            canvas: CanvasSpec::new(30, 20),
        };
        let placed = step.apply(image, &half_mask(10, 6, 0)).expect("Placement should succeed");
        assert_eq!(placed.bit_depth(), 16);
        assert_eq!(placed.dimensions(), (30, 20));
    }
}
