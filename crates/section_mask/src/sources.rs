use std::path::PathBuf;

use image::{GrayImage, Luma};

use crate::{
    algorithms::{
        blob::extract_blob,
        contour::ContourAccumulator,
        morphology::close,
        scaling::check_shape,
        strip::remove_strip,
        threshold::{binarize, find_threshold},
    },
    config::{Kernel, MaskConfig, StripParams, ThresholdParams},
    error::{MaskError, Result},
    traits::MaskSource,
    types::{IntensityPlane, Plane, Sample, SectionImage, SectionMask},
};

/// Strip removal, valley threshold, main blob and closing
#[derive(Debug, Clone)]
pub struct BlobMaskSource {
    pub strip: StripParams,
    pub threshold: ThresholdParams,
    pub closing: Kernel,
}

impl Default for BlobMaskSource {
    fn default() -> Self {
        Self::from_config(&MaskConfig::default())
    }
}

impl BlobMaskSource {
    pub fn from_config(config: &MaskConfig) -> Self {
        Self {
            strip: config.strip,
            threshold: config.threshold,
            closing: config.closing,
        }
    }

    pub fn mask_plane<T: Sample>(&self, plane: &Plane<T>) -> Result<SectionMask> {
        let (no_strip, strip_offset) = remove_strip(plane, &self.strip);
        let threshold = find_threshold(plane, &self.threshold);
        tracing::debug!(
            "Histogram valley at bin {}, threshold {:.1}",
            threshold.valley,
            threshold.value
        );

        let blob = extract_blob(&binarize(&no_strip, threshold.value))?;
        Ok(SectionMask {
            mask: close(&blob, self.closing),
            strip_offset,
        })
    }
}

impl MaskSource for BlobMaskSource {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn extract_mask(&self, _name: &str, image: &SectionImage) -> Result<SectionMask> {
        match image.intensity_plane() {
            IntensityPlane::Gray8(plane) => self.mask_plane(&plane),
            IntensityPlane::Gray16(plane) => self.mask_plane(&plane),
        }
    }
}

/// Stain-specific contour accumulation
#[derive(Debug, Clone)]
pub struct ContourMaskSource {
    pub accumulator: ContourAccumulator,
}

impl ContourMaskSource {
    pub fn from_config(config: &MaskConfig) -> Self {
        Self {
            accumulator: ContourAccumulator::from_config(config),
        }
    }
}

impl MaskSource for ContourMaskSource {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn extract_mask(&self, _name: &str, image: &SectionImage) -> Result<SectionMask> {
        match image.intensity_plane() {
            IntensityPlane::Gray8(plane) => self.accumulator.extract(&plane),
            IntensityPlane::Gray16(plane) => self.accumulator.extract(&plane),
        }
    }
}

/// Masks produced elsewhere (for example by a segmentation model), stored
/// under the section's file name.
#[derive(Debug, Clone)]
pub struct PrecomputedMaskSource {
    pub dir: PathBuf,
    /// Channel holding the mask; the luminance when unset
    pub channel: Option<usize>,
}

impl PrecomputedMaskSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl MaskSource for PrecomputedMaskSource {
    fn name(&self) -> &'static str {
        "precomputed"
    }

    fn extract_mask(&self, name: &str, image: &SectionImage) -> Result<SectionMask> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(MaskError::MissingMask { path });
        }
        let decoded = image::open(&path).map_err(|source| MaskError::UnreadableImage {
            path: path.clone(),
            source,
        })?;

        let plane = match self.channel {
            None => decoded.to_luma8(),
            Some(channel) if channel >= 4 => {
                return Err(MaskError::InvalidParameter(format!(
                    "mask channel {channel} does not exist"
                )));
            }
            Some(channel) => {
                let rgba = decoded.to_rgba8();
                GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                    Luma([rgba.get_pixel(x, y)[channel]])
                })
            }
        };
        check_shape(image.dimensions(), &plane)?;

        let mask = GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
            Luma([if plane.get_pixel(x, y)[0] > 0 { 255 } else { 0 }])
        });
        Ok(SectionMask::new(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gray16Image;
    use image::{Rgb, RgbImage};

    fn square_section() -> SectionImage {
        SectionImage::Gray16(Gray16Image::from_fn(200, 150, |x, y| {
            if (80..120).contains(&x) && (50..100).contains(&y) {
                Luma([8000u16])
            } else {
                Luma([50u16])
            }
        }))
    }

    #[test]
    fn test_blob_source_masks_the_square() {
        let section = BlobMaskSource::default()
            .extract_mask("a.tif", &square_section())
            .expect("Blob mask should succeed");
        assert_eq!(section.strip_offset, 0);
        assert_eq!(section.coverage(), 40 * 50);
        assert_eq!(section.mask.get_pixel(100, 75)[0], 255);
    }

    #[test]
    fn test_contour_source_keeps_dimensions() {
        let source = ContourMaskSource::from_config(&MaskConfig::default());
        let section = source
            .extract_mask("a.tif", &square_section())
            .expect("Contour mask should succeed");
        assert_eq!(section.dimensions(), (200, 150));
    }

    #[test]
    fn test_precomputed_source() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let stored = RgbImage::from_fn(200, 150, |x, _| {
            if x < 100 { Rgb([0, 9, 0]) } else { Rgb([0, 0, 0]) }
        });
        stored.save(dir.path().join("a.png")).expect("Should save mask");

        let source = PrecomputedMaskSource::new(dir.path());
        let section = source
            .extract_mask("a.png", &square_section())
            .expect("Stored mask should load");
        assert_eq!(section.mask.get_pixel(10, 10)[0], 255);
        assert_eq!(section.mask.get_pixel(150, 10)[0], 0);

        let red = source.clone().with_channel(0);
        assert_eq!(red.extract_mask("a.png", &square_section()).expect("Should load").coverage(), 0);

        assert!(matches!(
            source.extract_mask("missing.png", &square_section()),
            Err(MaskError::MissingMask { .. })
        ));

        let small = SectionImage::Gray8(GrayImage::new(10, 10));
        assert!(matches!(
            source.extract_mask("a.png", &small),
            Err(MaskError::ShapeMismatch { .. })
        ));
    }
}
