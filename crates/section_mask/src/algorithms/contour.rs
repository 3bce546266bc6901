use image::{GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType},
    contrast::equalize_histogram,
    drawing::{draw_cross_mut, draw_line_segment_mut, draw_polygon_mut},
    map::map_colors,
    region_labelling::{connected_components, Connectivity},
};

use crate::{
    algorithms::{equalize::clahe, morphology, strip::remove_strip},
    config::{
        BackgroundFlatten, BackgroundLevel, BorderPad, ContourParams, MaskConfig, Normalization,
        Polarity, SpotSuppression, StripParams,
    },
    error::Result,
    types::{Contour, Plane, Sample, SectionMask},
};

/// Contours kept for the mask and the ones turned down
#[derive(Debug, Clone, Default)]
pub struct Accumulation {
    pub accepted: Vec<Contour>,
    pub rejected: Vec<Contour>,
}

/// Region accumulation over the external contours of a normalized section.
///
/// One algorithm for every stain; the stain only changes the constants in
/// [`ContourParams`].
#[derive(Debug, Clone)]
pub struct ContourAccumulator {
    pub params: ContourParams,
    pub strip: StripParams,
    pub debug: bool,
}

impl ContourAccumulator {
    pub fn new(params: ContourParams, strip: StripParams) -> Self {
        Self {
            params,
            strip,
            debug: false,
        }
    }

    pub fn from_config(config: &MaskConfig) -> Self {
        Self {
            params: config.contour_params(),
            strip: config.strip,
            debug: config.debug,
        }
    }

    /// Strip removal, 8-bit conversion and border padding
    pub fn prepare<T: Sample>(&self, plane: &Plane<T>) -> (GrayImage, i64) {
        let (cleaned, offset) = if self.params.remove_strip {
            remove_strip(plane, &self.strip)
        } else {
            (plane.clone(), 0)
        };

        let mut narrowed = GrayImage::from_fn(cleaned.width(), cleaned.height(), |x, y| {
            Luma([cleaned.get_pixel(x, y)[0].high_byte()])
        });
        if let Some(pad) = self.params.border_pad {
            pad_with_black(&mut narrowed, pad);
        }
        (narrowed, offset)
    }

    pub fn normalize(&self, image: &GrayImage) -> Result<GrayImage> {
        let mut flattened = image.clone();
        if let Some(flatten) = self.params.flatten_background {
            flatten_background(&mut flattened, flatten);
        }
        match self.params.normalization {
            Normalization::Equalize => Ok(equalize_histogram(&flattened)),
            Normalization::Clahe(params) => clahe(&flattened, &params),
        }
    }

    /// Threshold level on the normalized image
    pub fn level(&self, normalized: &GrayImage) -> f64 {
        let background = match self.params.background {
            BackgroundLevel::Median => median(normalized),
            BackgroundLevel::BottomRows { rows } => bottom_rows_mean(normalized, rows).round(),
        };
        background + self.params.offset
    }

    /// Thresholded tissue with interior holes closed
    pub fn foreground(&self, normalized: &GrayImage) -> GrayImage {
        let level = self.level(normalized);
        tracing::debug!("Contour threshold level {level}");

        let polarity = self.params.polarity;
        let thresholded = map_colors(normalized, |p| {
            let value = p[0] as f64;
            let tissue = match polarity {
                Polarity::Above => value > level,
                Polarity::Below => value <= level,
            };
            Luma([if tissue { 255u8 } else { 0 }])
        });
        fill_holes(&thresholded)
    }

    /// Seed with the largest contour, then grow while candidates pass the
    /// area and centroid tests; the first failure ends accumulation.
    pub fn accumulate(&self, contours: Vec<Contour>, width: u32, height: u32) -> Accumulation {
        let mut areas: Vec<(f64, Contour)> = contours.into_iter().map(|c| (c.area(), c)).collect();
        areas.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut remaining = areas.into_iter();
        let Some((largest, seed)) = remaining.next() else {
            return Accumulation::default();
        };
        let mut accepted = vec![seed];
        let mut rejected = Vec::new();

        for round in 1..=self.params.rounds {
            let Some((area, candidate)) = remaining.next() else {
                break;
            };
            let required = largest * self.params.area_threshold * (round * round) as f64;
            let centred = candidate.centroid().is_some_and(|[cx, cy]| {
                self.params
                    .window
                    .contains(cx.floor(), cy.floor(), width, height)
            });

            if area > required && centred {
                accepted.push(candidate);
            } else {
                rejected.push(candidate);
                break;
            }
        }
        rejected.extend(remaining.map(|(_, contour)| contour));

        Accumulation { accepted, rejected }
    }

    pub fn extract<T: Sample>(&self, plane: &Plane<T>) -> Result<SectionMask> {
        let (width, height) = plane.dimensions();
        let (prepared, strip_offset) = self.prepare(plane);
        let normalized = self.normalize(&prepared)?;

        let mut foreground = self.foreground(&normalized);
        if let Some(kernel) = self.params.pre_erode {
            foreground = morphology::erode(&foreground, kernel);
        }

        let accumulation = self.accumulate(find_outer_contours(&foreground), width, height);
        if accumulation.accepted.is_empty() {
            tracing::warn!("No tissue contour found, mask is empty");
        }

        let mut stencil = GrayImage::new(width, height);
        for contour in &accumulation.accepted {
            fill_contour(&mut stencil, contour, 255);
        }
        if self.params.erase_rejected {
            for contour in &accumulation.rejected {
                fill_contour(&mut stencil, contour, 0);
            }
        }

        let mut mask = morphology::rebinarize(&morphology::dilate(&stencil, self.params.dilation));
        if let Some(spots) = self.params.spot_suppression {
            mask = suppress_spots(&mask, spots);
        }

        if self.debug {
            for contour in &accumulation.accepted {
                let area = contour.area();
                if let Some([cx, cy]) = contour.centroid() {
                    tracing::info!("Accepted region area {area:.0} centroid ({cx:.1}, {cy:.1})");
                    draw_cross_mut(&mut mask, Luma([0u8]), cx as i32, cy as i32);
                }
            }
        }

        Ok(SectionMask { mask, strip_offset })
    }
}

fn pad_with_black(image: &mut GrayImage, pad: BorderPad) {
    let (width, height) = image.dimensions();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let in_rows = y < pad.rows || y >= height.saturating_sub(pad.rows);
        let in_cols = x < pad.cols || x >= width.saturating_sub(pad.cols);
        if in_rows || in_cols {
            *pixel = Luma([0]);
        }
    }
}

fn bottom_rows_mean(image: &GrayImage, rows: u32) -> f64 {
    let height = image.height();
    let first = height.saturating_sub(rows);
    let (sum, count) = image
        .enumerate_pixels()
        .filter(|(_, y, _)| *y >= first)
        .fold((0.0, 0u64), |(sum, count), (_, _, p)| (sum + p[0] as f64, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Pixels close to the bottom-row background take the background value
fn flatten_background(image: &mut GrayImage, flatten: BackgroundFlatten) {
    let background = bottom_rows_mean(image, flatten.rows).round() as i32;
    let lower = background - flatten.below;
    let upper = background + flatten.above;
    let fill = background.clamp(0, 255) as u8;
    for pixel in image.pixels_mut() {
        let value = pixel[0] as i32;
        if value >= lower && value <= upper {
            *pixel = Luma([fill]);
        }
    }
}

/// Median sample, averaging the middle pair for even counts
pub fn median(image: &GrayImage) -> f64 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let nth = |rank: u64| {
        let mut seen = 0;
        for (value, &count) in histogram.iter().enumerate() {
            seen += count;
            if seen > rank {
                return value as f64;
            }
        }
        255.0
    };

    if total % 2 == 1 {
        nth(total / 2)
    } else {
        (nth(total / 2 - 1) + nth(total / 2)) / 2.0
    }
}

/// Fill every background pocket not 4-connected to the top-left corner.
///
/// A foreground corner floods everything, leaving a fully white image.
pub fn fill_holes(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    if width == 0 || height == 0 {
        return binary.clone();
    }
    if binary.get_pixel(0, 0)[0] > 0 {
        return GrayImage::from_pixel(width, height, Luma([255]));
    }

    let inverted = map_colors(binary, |p| Luma([if p[0] > 0 { 0u8 } else { 255 }]));
    let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));
    let exterior = labels.get_pixel(0, 0)[0];

    GrayImage::from_fn(width, height, |x, y| {
        let outside = labels.get_pixel(x, y)[0] == exterior;
        Luma([if outside { 0 } else { 255 }])
    })
}

/// External boundaries of the white regions
pub fn find_outer_contours(binary: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| Contour::new(c.points))
        .collect()
}

/// Fill a contour and its interior with `value`
pub fn fill_contour(canvas: &mut GrayImage, contour: &Contour, value: u8) {
    let mut points = contour.points.clone();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    let color = Luma([value]);
    match points.as_slice() {
        [] => {}
        [p] => {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < canvas.width() && (p.y as u32) < canvas.height() {
                canvas.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
        [a, b] => draw_line_segment_mut(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        ),
        _ => draw_polygon_mut(canvas, &points, color),
    }
}

/// Keep the largest region and a short chain of comparably sized ones.
///
/// A region survives while its area exceeds `ratio` times the previously
/// kept region; all other regions are erased.
pub fn suppress_spots(mask: &GrayImage, params: SpotSuppression) -> GrayImage {
    let mut contours: Vec<(f64, Contour)> = find_outer_contours(mask)
        .into_iter()
        .map(|c| (c.area(), c))
        .collect();
    if contours.is_empty() {
        return mask.clone();
    }
    contours.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut kept = 1;
    let mut previous = contours[0].0;
    while kept < params.max_regions.max(1) && kept < contours.len() {
        let area = contours[kept].0;
        if area > previous * params.ratio {
            previous = area;
            kept += 1;
        } else {
            break;
        }
    }

    let mut cleaned = mask.clone();
    for (_, spot) in &contours[kept..] {
        fill_contour(&mut cleaned, spot, 0);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Kernel, StainProfile},
        types::Gray16Image,
    };
    use imageproc::point::Point;

    fn rectangle(left: i32, top: i32, width: i32, height: i32) -> Contour {
        Contour::new(vec![
            Point::new(left, top),
            Point::new(left + width, top),
            Point::new(left + width, top + height),
            Point::new(left, top + height),
        ])
    }

    fn ntb() -> ContourAccumulator {
        ContourAccumulator::new(StainProfile::Ntb.contour_params(), StripParams::default())
    }

    #[test]
    fn test_accumulate_stops_at_first_rejection() {
        let contours = vec![
            rectangle(150, 150, 40, 25),  // 1000 < 10000 * 0.05 * 4
            rectangle(150, 100, 100, 100), // seed
            rectangle(180, 250, 40, 30),  // 1200 > 10000 * 0.05
            rectangle(190, 300, 10, 10),
        ];
        let accumulation = ntb().accumulate(contours, 400, 400);
        assert_eq!(accumulation.accepted.len(), 2);
        assert_eq!(accumulation.accepted[0].area(), 10000.0);
        assert_eq!(accumulation.accepted[1].area(), 1200.0);
        assert_eq!(accumulation.rejected.len(), 2);
    }

    #[test]
    fn test_off_centre_candidate_is_rejected() {
        // column window is (100, 300) for a 400 wide image
        let contours = vec![rectangle(150, 100, 100, 100), rectangle(10, 150, 40, 40)];
        let accumulation = ntb().accumulate(contours, 400, 400);
        assert_eq!(accumulation.accepted.len(), 1);
        assert_eq!(accumulation.rejected.len(), 1);

        assert!(ntb().accumulate(Vec::new(), 400, 400).accepted.is_empty());
    }

    #[test]
    fn test_fill_holes_closes_ring() {
        let ring = GrayImage::from_fn(30, 30, |x, y| {
            let outer = (5..25).contains(&x) && (5..25).contains(&y);
            let inner = (10..20).contains(&x) && (10..20).contains(&y);
            Luma([if outer && !inner { 255 } else { 0 }])
        });
        let filled = fill_holes(&ring);
        assert_eq!(filled.get_pixel(15, 15)[0], 255);
        assert_eq!(filled.get_pixel(2, 2)[0], 0);

        let white_corner = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 3 { 255 } else { 0 }]));
        assert!(fill_holes(&white_corner).pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_median_even_count() {
        let image = GrayImage::from_fn(4, 1, |x, _| Luma([[1, 3, 5, 100][x as usize]]));
        assert_eq!(median(&image), 4.0);
    }

    #[test]
    fn test_suppress_spots_keeps_comparable_regions() {
        let mut mask = GrayImage::new(120, 60);
        fill_contour(&mut mask, &rectangle(5, 5, 30, 30), 255);
        fill_contour(&mut mask, &rectangle(45, 5, 28, 28), 255);
        fill_contour(&mut mask, &rectangle(85, 5, 10, 10), 255);

        let cleaned = suppress_spots(&mask, SpotSuppression { ratio: 0.75, max_regions: 3 });
        assert_eq!(cleaned.get_pixel(20, 20)[0], 255);
        assert_eq!(cleaned.get_pixel(60, 20)[0], 255);
        assert_eq!(cleaned.get_pixel(90, 10)[0], 0);
    }

    #[test]
    fn test_ntb_section_with_strip() {
        // faint background, brighter tissue, saturated stripe on the right
        let image = Gray16Image::from_fn(200, 160, |x, y| {
            if x >= 190 {
                Luma([42000u16])
            } else if (70..130).contains(&x) && (60..100).contains(&y) {
                Luma([12000u16])
            } else if (20..26).contains(&x) && (20..26).contains(&y) {
                Luma([12000u16])
            } else {
                Luma([2000u16])
            }
        });

        let section = ntb().extract(&image).expect("Extraction should succeed");
        assert_eq!(section.strip_offset, -12);
        assert_eq!(section.dimensions(), (200, 160));
        assert_eq!(section.mask.get_pixel(100, 80)[0], 255);
        assert_eq!(section.mask.get_pixel(22, 22)[0], 0);
        assert_eq!(section.mask.get_pixel(0, 0)[0], 0);
        assert_eq!(section.mask.get_pixel(195, 80)[0], 0);
        assert!(section.mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_thionin_section_is_darker_than_background() {
        let image = GrayImage::from_fn(200, 160, |x, y| {
            if (70..130).contains(&x) && (60..100).contains(&y) {
                Luma([80u8])
            } else {
                Luma([220u8])
            }
        });
        let accumulator =
            ContourAccumulator::new(StainProfile::Thionin.contour_params(), StripParams::default());

        let section = accumulator.extract(&image).expect("Extraction should succeed");
        assert_eq!(section.strip_offset, 0);
        assert_eq!(section.mask.get_pixel(100, 80)[0], 255);
        assert_eq!(section.mask.get_pixel(100, 115)[0], 255);
        assert_eq!(section.mask.get_pixel(100, 130)[0], 0);
        assert_eq!(section.mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_debug_cross_keeps_mask_binary() {
        let image = GrayImage::from_fn(100, 100, |x, y| {
            Luma([if (30..70).contains(&x) && (30..70).contains(&y) { 200u8 } else { 10 }])
        });
        let mut params = StainProfile::Ntb.contour_params();
        params.dilation = Kernel::new(3, 1);
        params.remove_strip = false;
        let accumulator = ContourAccumulator {
            params,
            strip: StripParams::default(),
            debug: true,
        };

        let section = accumulator.extract(&image).expect("Extraction should succeed");
        assert!(section.mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(section.mask.get_pixel(45, 45)[0], 255);
    }
}
