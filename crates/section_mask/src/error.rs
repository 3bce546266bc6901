use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Image codec error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Could not open {path}: {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Mask {path} does not exist")]
    MissingMask { path: PathBuf },

    #[error("Mask shape {mask_width}x{mask_height} does not match image shape {image_width}x{image_height}")]
    ShapeMismatch {
        image_width: u32,
        image_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("No connected component qualifies as the tissue section")]
    NoBlobFound,

    #[error("Image {width}x{height} does not fit in canvas {canvas_width}x{canvas_height}")]
    OversizePlacement {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    #[error("Mask selects no pixels")]
    EmptyMask,

    #[error("Unsupported image layout: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaskError {
    /// Short stable name of the failure class, used in batch summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageLoad(_) | Self::UnreadableImage { .. } => "unreadable_image",
            Self::MissingMask { .. } => "missing_mask",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::NoBlobFound => "no_blob_found",
            Self::OversizePlacement { .. } => "oversize_placement",
            Self::EmptyMask => "empty_mask",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, MaskError>;
