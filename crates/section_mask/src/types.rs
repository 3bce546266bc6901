use std::path::Path;

use geo_types::{Coord, LineString, Polygon};
use image::{
    buffer::ConvertBuffer, DynamicImage, GrayImage, ImageBuffer, Luma, Primitive, Rgb, RgbImage,
};
use imageproc::point::Point;

use crate::error::{MaskError, Result};

pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;
pub type Rgb16Image = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// Single-channel image of any supported sample type
pub type Plane<T> = ImageBuffer<Luma<T>, Vec<T>>;

/// Integer sample types a section can be digitized with.
pub trait Sample: Primitive + Send + Sync + 'static {
    const ZERO: Self;
    /// Largest representable intensity
    const FULL_SCALE: f64;
    /// Bin count used by local histogram equalization
    const HISTOGRAM_BINS: usize;

    fn as_f64(self) -> f64;

    /// Rounds and saturates into the representable range
    fn from_f64(value: f64) -> Self;

    /// Drops to 8 bits by keeping the high byte
    fn high_byte(self) -> u8;
}

impl Sample for u8 {
    const ZERO: Self = 0;
    const FULL_SCALE: f64 = u8::MAX as f64;
    const HISTOGRAM_BINS: usize = 256;

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, Self::FULL_SCALE) as u8
    }

    fn high_byte(self) -> u8 {
        self
    }
}

impl Sample for u16 {
    const ZERO: Self = 0;
    const FULL_SCALE: f64 = u16::MAX as f64;
    const HISTOGRAM_BINS: usize = 4096;

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, Self::FULL_SCALE) as u16
    }

    fn high_byte(self) -> u8 {
        (self >> 8) as u8
    }
}

/// A decoded section scan. Only 8/16-bit gray and RGB layouts are accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionImage {
    Gray8(GrayImage),
    Gray16(Gray16Image),
    Rgb8(RgbImage),
    Rgb16(Rgb16Image),
}

impl SectionImage {
    /// Load a section from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| MaskError::UnreadableImage {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_dynamic(decoded)
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(img) => Ok(Self::Gray8(img)),
            DynamicImage::ImageLuma16(img) => Ok(Self::Gray16(img)),
            DynamicImage::ImageRgb8(img) => Ok(Self::Rgb8(img)),
            DynamicImage::ImageRgb16(img) => Ok(Self::Rgb16(img)),
            other => Err(MaskError::UnsupportedFormat(format!("{:?}", other.color()))),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Gray8(img) => DynamicImage::ImageLuma8(img),
            Self::Gray16(img) => DynamicImage::ImageLuma16(img),
            Self::Rgb8(img) => DynamicImage::ImageRgb8(img),
            Self::Rgb16(img) => DynamicImage::ImageRgb16(img),
        }
    }

    /// Write the image, format chosen from the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match self {
            Self::Gray8(img) => img.save(path)?,
            Self::Gray16(img) => img.save(path)?,
            Self::Rgb8(img) => img.save(path)?,
            Self::Rgb16(img) => img.save(path)?,
        }
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Gray8(img) => img.dimensions(),
            Self::Gray16(img) => img.dimensions(),
            Self::Rgb8(img) => img.dimensions(),
            Self::Rgb16(img) => img.dimensions(),
        }
    }

    pub fn bit_depth(&self) -> u8 {
        match self {
            Self::Gray8(_) | Self::Rgb8(_) => 8,
            Self::Gray16(_) | Self::Rgb16(_) => 16,
        }
    }

    pub fn channel_count(&self) -> u8 {
        match self {
            Self::Gray8(_) | Self::Gray16(_) => 1,
            Self::Rgb8(_) | Self::Rgb16(_) => 3,
        }
    }

    /// The plane masks are computed from: the image itself, or its luminance
    pub fn intensity_plane(&self) -> IntensityPlane {
        match self {
            Self::Gray8(img) => IntensityPlane::Gray8(img.clone()),
            Self::Gray16(img) => IntensityPlane::Gray16(img.clone()),
            Self::Rgb8(img) => IntensityPlane::Gray8(img.convert()),
            Self::Rgb16(img) => IntensityPlane::Gray16(img.convert()),
        }
    }
}

/// Single-channel view used by the mask extraction strategies
#[derive(Debug, Clone, PartialEq)]
pub enum IntensityPlane {
    Gray8(GrayImage),
    Gray16(Gray16Image),
}

impl IntensityPlane {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Gray8(img) => img.dimensions(),
            Self::Gray16(img) => img.dimensions(),
        }
    }
}

/// Binary mask (0 or 255) plus the strip offset found while computing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMask {
    pub mask: GrayImage,
    /// Negative column offset of the removed strip, 0 when none was found
    pub strip_offset: i64,
}

impl SectionMask {
    pub fn new(mask: GrayImage) -> Self {
        Self {
            mask,
            strip_offset: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Number of foreground pixels
    pub fn coverage(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] > 0).count()
    }
}

/// Statistics of one labeled region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentStats {
    pub label: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub area: u64,
    pub centroid: [f64; 2],
}

impl ComponentStats {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

/// Boundary of a region as traced on the pixel grid
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Enclosed polygon area
    pub fn area(&self) -> f64 {
        use geo::Area;
        self.to_geo_polygon().unsigned_area()
    }

    /// Area-weighted centroid, `None` for degenerate contours
    pub fn centroid(&self) -> Option<[f64; 2]> {
        use geo::Centroid;
        if self.area() <= 0.0 {
            return None;
        }
        self.to_geo_polygon().centroid().map(|c| [c.x(), c.y()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_saturates() {
        assert_eq!(u16::from_f64(70000.0), u16::MAX);
        assert_eq!(u16::from_f64(-3.0), 0);
        assert_eq!(u8::from_f64(127.6), 128);
        assert_eq!(0xABCDu16.high_byte(), 0xAB);
    }

    #[test]
    fn test_contour_area_and_centroid() {
        let square = Contour::new(vec![
            Point::new(10, 10),
            Point::new(20, 10),
            Point::new(20, 20),
            Point::new(10, 20),
        ]);
        assert_eq!(square.area(), 100.0);
        let [cx, cy] = square.centroid().expect("Square should have a centroid");
        assert!((cx - 15.0).abs() < 1e-9);
        assert!((cy - 15.0).abs() < 1e-9);

        let line = Contour::new(vec![Point::new(0, 0), Point::new(5, 0)]);
        assert!(line.centroid().is_none());
    }

    #[test]
    fn test_rejects_alpha_images() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert!(matches!(
            SectionImage::from_dynamic(rgba),
            Err(MaskError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rgb_intensity_plane_is_single_channel() {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([200, 200, 200]));
        let section = SectionImage::Rgb8(rgb);
        assert_eq!(section.channel_count(), 3);
        match section.intensity_plane() {
            IntensityPlane::Gray8(plane) => {
                assert_eq!(plane.dimensions(), (3, 2));
                assert_eq!(plane.get_pixel(0, 0)[0], 200);
            }
            IntensityPlane::Gray16(_) => panic!("8-bit input must give an 8-bit plane"),
        }
    }
}
