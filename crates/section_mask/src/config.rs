//! Immutable parameter bundles for every stage of mask extraction and cleaning.
//!
//! Defaults reproduce the constants the pipeline has always used; stain
//! specific constants are reached through [`StainProfile`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::algorithms::composite::CanvasSpec;

/// Scanner stripe search window near the right border
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct StripParams {
    /// Closest offset from the right edge that is searched
    pub strip_min: usize,
    /// Farthest offset from the right edge that is searched
    pub strip_max: usize,
    /// Minimum jump of the scaled column profile that marks a stripe
    pub jump_threshold: f64,
    /// Factor applied to every column sum
    pub column_scale: f64,
}

impl Default for StripParams {
    fn default() -> Self {
        Self {
            strip_min: 5,
            strip_max: 150,
            jump_threshold: 50.0,
            column_scale: 1.0 / 10000.0,
        }
    }
}

/// Histogram valley thresholding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ThresholdParams {
    pub bins: usize,
    /// Number of leading bins searched for the valley
    pub valley_bins: usize,
    pub max_valley_index: usize,
    /// Intensity the bin index is scaled against
    pub max_intensity: f64,
    pub offset: f64,
}

impl ThresholdParams {
    pub fn standard() -> Self {
        Self {
            bins: 360,
            valley_bins: 5,
            max_valley_index: 2,
            max_intensity: 64000.0,
            offset: 0.0,
        }
    }

    /// Variant used by the alignment masks, shifted up by 100
    pub fn alignment() -> Self {
        Self {
            offset: 100.0,
            ..Self::standard()
        }
    }
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Square structuring element applied `iterations` times
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Kernel {
    pub size: u8,
    pub iterations: u8,
}

impl Kernel {
    pub const fn new(size: u8, iterations: u8) -> Self {
        Self { size, iterations }
    }

    /// Chebyshev radius equivalent to the repeated element
    pub fn radius(&self) -> u8 {
        let reach = self.iterations as u32 * (self.size as u32).saturating_sub(1) / 2;
        reach.min(u8::MAX as u32) as u8
    }
}

/// Contrast limited adaptive histogram equalization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClaheParams {
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl ClaheParams {
    pub const fn new(clip_limit: f32, tiles_x: u32, tiles_y: u32) -> Self {
        Self {
            clip_limit,
            tiles_x,
            tiles_y,
        }
    }
}

/// CLAHE stages applied in order to a cleaned, scaled image
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EqualizeParams {
    pub stages: Vec<ClaheParams>,
}

impl Default for EqualizeParams {
    fn default() -> Self {
        // coarse grid first, then fine
        Self {
            stages: vec![ClaheParams::new(40.0, 8, 8), ClaheParams::new(2.0, 32, 32)],
        }
    }
}

/// Percentile rescaling inside the mask
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ScaleParams {
    /// Value the effective maximum is mapped to
    pub target_peak: f64,
    /// Fraction of the brightest masked samples ignored
    pub epsilon: f64,
    /// Mask values at or below this are outside the section
    pub mask_floor: u8,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            target_peak: 45000.0,
            epsilon: 0.01,
            mask_floor: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Normalization {
    /// Global histogram equalization to the full 8-bit range
    Equalize,
    Clahe(ClaheParams),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum BackgroundLevel {
    /// Median of the whole normalized image
    Median,
    /// Rounded mean of the last rows
    BottomRows { rows: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Tissue is brighter than the level
    Above,
    /// Tissue is at or below the level
    Below,
}

/// Black frame painted before thresholding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct BorderPad {
    pub rows: u32,
    pub cols: u32,
}

/// Pixels close to the bottom-row background are set to it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct BackgroundFlatten {
    pub rows: u32,
    pub below: i32,
    pub above: i32,
}

/// Fractional offsets from the image centre a centroid must fall within
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CentroidWindow {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl CentroidWindow {
    /// Open-interval test against `(width, height)` using the integer centre
    pub fn contains(&self, x: f64, y: f64, width: u32, height: u32) -> bool {
        let mid_col = (width / 2) as f64;
        let mid_row = (height / 2) as f64;
        x > mid_col - mid_col * self.left
            && x < mid_col + mid_col * self.right
            && y > mid_row - mid_row * self.top
            && y < mid_row + mid_row * self.bottom
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SpotSuppression {
    /// A region survives if its area exceeds this fraction of the previous one
    pub ratio: f64,
    pub max_regions: usize,
}

/// Constants of the contour accumulation strategy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ContourParams {
    pub remove_strip: bool,
    pub border_pad: Option<BorderPad>,
    pub flatten_background: Option<BackgroundFlatten>,
    pub normalization: Normalization,
    pub background: BackgroundLevel,
    /// Added to the background level before thresholding
    pub offset: f64,
    pub polarity: Polarity,
    pub pre_erode: Option<Kernel>,
    pub area_threshold: f64,
    pub rounds: u32,
    pub window: CentroidWindow,
    /// Paint contours that were not accepted black before dilation
    pub erase_rejected: bool,
    pub dilation: Kernel,
    pub spot_suppression: Option<SpotSuppression>,
}

/// Staining protocols with their own contour constants
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StainProfile {
    /// Neurotrace blue / Nissl-like fluorescence
    #[default]
    Ntb,
    Thionin,
}

impl StainProfile {
    /// Pick the profile from a free-form counterstain name
    pub fn from_counterstain(name: &str) -> Self {
        if name.to_lowercase().contains("thion") {
            Self::Thionin
        } else {
            Self::Ntb
        }
    }

    pub fn contour_params(&self) -> ContourParams {
        match self {
            Self::Ntb => ContourParams {
                remove_strip: true,
                border_pad: Some(BorderPad { rows: 12, cols: 5 }),
                flatten_background: None,
                normalization: Normalization::Equalize,
                background: BackgroundLevel::Median,
                offset: 10.0,
                polarity: Polarity::Above,
                pre_erode: Some(Kernel::new(6, 1)),
                area_threshold: 0.05,
                rounds: 4,
                window: CentroidWindow {
                    left: 0.5,
                    right: 0.5,
                    top: 1.0,
                    bottom: 1.0,
                },
                erase_rejected: true,
                dilation: Kernel::new(16, 5),
                spot_suppression: Some(SpotSuppression {
                    ratio: 0.75,
                    max_regions: 3,
                }),
            },
            Self::Thionin => ContourParams {
                remove_strip: false,
                border_pad: None,
                flatten_background: Some(BackgroundFlatten {
                    rows: 5,
                    below: 8,
                    above: 4,
                }),
                normalization: Normalization::Clahe(ClaheParams::new(40.0, 16, 16)),
                background: BackgroundLevel::BottomRows { rows: 5 },
                offset: -50.0,
                polarity: Polarity::Below,
                pre_erode: None,
                area_threshold: 0.05,
                rounds: 4,
                window: CentroidWindow {
                    left: 0.75,
                    right: 0.95,
                    top: 0.75,
                    bottom: 0.5,
                },
                erase_rejected: false,
                dilation: Kernel::new(16, 3),
                spot_suppression: None,
            },
        }
    }
}

/// Stages applied when a mask is turned into a cleaned section
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct CleanParams {
    /// Mask values at or below this are outside the section
    pub mask_floor: u8,
    pub scaling: Option<ScaleParams>,
    pub equalize: Option<EqualizeParams>,
    pub canvas: Option<CanvasSpec>,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            mask_floor: 10,
            scaling: None,
            equalize: None,
            canvas: None,
        }
    }
}

impl CleanParams {
    /// Scaling and both CLAHE stages, the treatment of the reference channel
    pub fn reference_channel() -> Self {
        Self {
            scaling: Some(ScaleParams::default()),
            equalize: Some(EqualizeParams::default()),
            ..Self::default()
        }
    }
}

/// Everything the mask strategies need, shared read-only across workers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct MaskConfig {
    pub strip: StripParams,
    pub threshold: ThresholdParams,
    pub closing: Kernel,
    pub stain: StainProfile,
    /// Overrides the constants implied by `stain`
    pub contour: Option<ContourParams>,
    /// Log accepted regions and mark their centroids on the mask
    pub debug: bool,
}

impl MaskConfig {
    pub fn for_stain(stain: StainProfile) -> Self {
        Self {
            stain,
            ..Self::default()
        }
    }

    pub fn contour_params(&self) -> ContourParams {
        self.contour
            .clone()
            .unwrap_or_else(|| self.stain.contour_params())
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            strip: StripParams::default(),
            threshold: ThresholdParams::default(),
            closing: Kernel::new(10, 5),
            stain: StainProfile::default(),
            contour: None,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kernel_radius() {
        assert_eq!(Kernel::new(10, 5).radius(), 22);
        assert_eq!(Kernel::new(16, 5).radius(), 37);
        assert_eq!(Kernel::new(6, 1).radius(), 2);
        assert_eq!(Kernel::new(0, 3).radius(), 0);
    }

    #[test]
    fn test_stain_from_counterstain() {
        assert_eq!(StainProfile::from_counterstain("Thionin"), StainProfile::Thionin);
        assert_eq!(StainProfile::from_counterstain("NtB"), StainProfile::Ntb);
        assert_eq!(StainProfile::from_str("thionin").unwrap(), StainProfile::Thionin);
        assert_eq!(StainProfile::Ntb.to_string(), "ntb");
    }

    #[test]
    fn test_centroid_window_is_open() {
        let window = CentroidWindow {
            left: 0.5,
            right: 0.5,
            top: 1.0,
            bottom: 1.0,
        };
        // width 200 -> columns strictly between 50 and 150
        assert!(window.contains(100.0, 50.0, 200, 100));
        assert!(!window.contains(50.0, 50.0, 200, 100));
        assert!(!window.contains(150.0, 50.0, 200, 100));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: MaskConfig = serde_json::from_str(r#"{ "stain": "thionin" }"#)
            .expect("Partial config should deserialize");
        assert_eq!(config.closing, Kernel::new(10, 5));
        assert_eq!(config.contour_params().polarity, Polarity::Below);
    }
}
