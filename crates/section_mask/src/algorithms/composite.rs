use image::{imageops, ImageBuffer, Pixel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use crate::{
    error::{MaskError, Result},
    types::Sample,
};

/// Canvas fill value
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Background {
    /// Rounded mean of the bottom rows of the placed image
    #[default]
    Auto,
    Value(f64),
    /// One value per channel
    Channels(Vec<f64>),
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Flip {
    #[default]
    None,
    /// Reverse both axes
    Flip,
    /// Mirror left to right
    Flop,
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OversizePolicy {
    #[default]
    Reject,
    /// Keep the centered window that fits
    CenterCrop,
}

/// Output frame shared by every section of a specimen
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Background,
    /// Counter-clockwise quarter turns, 0 to 3
    #[serde(default)]
    #[schemars(range(min = 0, max = 3))]
    pub rotation: u8,
    #[serde(default)]
    pub flip: Flip,
    #[serde(default)]
    pub oversize: OversizePolicy,
}

impl CanvasSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: Background::Auto,
            rotation: 0,
            flip: Flip::None,
            oversize: OversizePolicy::Reject,
        }
    }
}

type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Rotate by `rotation` counter-clockwise quarter turns, then flip.
pub fn orient<P>(image: &Buffer<P>, rotation: u8, flip: Flip) -> Result<Buffer<P>>
where
    P: Pixel + 'static,
{
    let rotated = match rotation {
        0 => image.clone(),
        1 => imageops::rotate270(image),
        2 => imageops::rotate180(image),
        3 => imageops::rotate90(image),
        other => {
            return Err(MaskError::InvalidParameter(format!(
                "rotation must be 0..=3 quarter turns, got {other}"
            )))
        }
    };

    Ok(match flip {
        Flip::None => rotated,
        Flip::Flip => imageops::rotate180(&rotated),
        Flip::Flop => imageops::flip_horizontal(&rotated),
    })
}

/// Rounded mean of every sample in the last five rows
pub fn estimate_background<P>(image: &Buffer<P>) -> f64
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let height = image.height();
    let rows = height.min(5);
    let (sum, count) = image
        .enumerate_pixels()
        .filter(|(_, y, _)| *y >= height - rows)
        .flat_map(|(_, _, pixel)| pixel.channels().iter())
        .fold((0.0, 0u64), |(sum, count), c| (sum + c.as_f64(), count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).round()
}

fn fill_pixel<P>(background: &Background, image: &Buffer<P>) -> Result<P>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let channels = P::CHANNEL_COUNT as usize;
    let values = match background {
        Background::Auto => vec![estimate_background(image); channels],
        Background::Value(value) => vec![*value; channels],
        Background::Channels(values) if values.len() == channels => values.clone(),
        Background::Channels(values) => {
            return Err(MaskError::InvalidParameter(format!(
                "background has {} channels, image has {channels}",
                values.len()
            )))
        }
    };
    let subpixels: Vec<P::Subpixel> = values
        .into_iter()
        .map(<P::Subpixel as Sample>::from_f64)
        .collect();
    Ok(*P::from_slice(&subpixels))
}

/// Center `image` on a `spec.width` x `spec.height` canvas.
pub fn place_image<P>(image: &Buffer<P>, spec: &CanvasSpec) -> Result<Buffer<P>>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let (width, height) = image.dimensions();
    if (width > spec.width || height > spec.height) && spec.oversize == OversizePolicy::Reject {
        return Err(MaskError::OversizePlacement {
            width,
            height,
            canvas_width: spec.width,
            canvas_height: spec.height,
        });
    }

    let fill = fill_pixel(&spec.background, image)?;
    let mut canvas = ImageBuffer::from_pixel(spec.width, spec.height, fill);

    let x = (spec.width / 2) as i64 - (width / 2) as i64;
    let y = (spec.height / 2) as i64 - (height / 2) as i64;
    imageops::replace(&mut canvas, image, x, y);
    Ok(canvas)
}

/// Orient then place; the output keeps the input's pixel type.
pub fn compose<P>(image: &Buffer<P>, spec: &CanvasSpec) -> Result<Buffer<P>>
where
    P: Pixel + 'static,
    P::Subpixel: Sample,
{
    let oriented = orient(image, spec.rotation, spec.flip)?;
    place_image(&oriented, spec)
}
