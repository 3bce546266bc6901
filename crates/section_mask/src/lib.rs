//! # Section Mask Library
//!
//! Locates the tissue section in a scanned brain slice, builds a binary mask
//! that separates it from background and scanner artifacts, and uses the
//! mask to clean, rescale and frame the image.
//!
//! ## Core Features
//!
//! - **Strip removal**: detects the bright scanner stripe near the right border
//! - **Blob strategy**: histogram valley threshold, main blob, morphological closing
//! - **Contour strategy**: stain-specific accumulation of central regions
//! - **Precomputed masks**: masks produced by another tool behind the same trait
//! - **Cleaning**: percentile scaling, staged CLAHE, rotation and canvas placement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use section_mask::{Pipeline, SectionImage};
//!
//! let pipeline = Pipeline::builder().build();
//!
//! let image = SectionImage::open("CH1/thumbnail/001.tif")?;
//! let section = pipeline.process("001.tif", image)?;
//!
//! section.cleaned.save("CH1/thumbnail_cleaned/001.tif")?;
//! section.mask.mask.save("masks/thumbnail_masked/001.tif")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use section_mask::{CanvasSpec, CleanParams, MaskConfig, MaskStrategy, Pipeline, StainProfile};
//!
//! let pipeline = Pipeline::builder()
//!     .strategy(
//!         &MaskStrategy::Contour { stain: StainProfile::Thionin },
//!         &MaskConfig::default(),
//!     )
//!     .clean_params(&CleanParams::reference_channel())
//!     .with_canvas(CanvasSpec::new(1400, 1000))
//!     .build();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sources;
pub mod stages;
pub mod strategy;
pub mod traits;
pub mod types;

pub use algorithms::composite::{Background, CanvasSpec, Flip, OversizePolicy};
pub use config::{
    CleanParams, ContourParams, EqualizeParams, MaskConfig, ScaleParams, StainProfile,
};
pub use error::{MaskError, Result};
pub use pipeline::{builder::PipelineBuilder, Pipeline, ProcessedSection};
pub use sources::{BlobMaskSource, ContourMaskSource, PrecomputedMaskSource};
pub use strategy::MaskStrategy;
pub use traits::{CleaningStep, MaskSource};
pub use types::{SectionImage, SectionMask};
