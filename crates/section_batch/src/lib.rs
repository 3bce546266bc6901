//! # Section Batch
//!
//! Runs a [`section_mask::Pipeline`] over whole directories of sections.
//!
//! - [`layout`]: where a specimen's channels, masks and cleaned outputs live
//! - [`metadata`]: scan geometry per specimen and stage completion records
//! - [`validation`]: directory checks that gate a batch
//! - [`runner`]: bounded worker pool with per-section timeouts
//!
//! ```rust,no_run
//! use section_batch::{BatchPaths, BatchRunner, RunnerOptions, SectionJob};
//! use section_mask::Pipeline;
//!
//! # async fn run() -> section_batch::Result<()> {
//! let runner = BatchRunner::new(Pipeline::builder().build(), RunnerOptions::default());
//! let summary = runner
//!     .run(
//!         SectionJob::Mask,
//!         BatchPaths {
//!             input_dir: "CH1/thumbnail".into(),
//!             mask_dir: "masks/thumbnail_masked".into(),
//!             output_dir: "CH1/thumbnail_cleaned".into(),
//!         },
//!     )
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod layout;
pub mod metadata;
pub mod runner;
pub mod validation;

pub use error::{BatchError, Result};
pub use layout::{list_sections, FileLayout, PrepLayout, Resolution};
pub use metadata::{
    MetadataStore, SpecimenCatalog, SpecimenMetadata, Stage, StageRecord, StaticMetadataStore,
};
pub use runner::{BatchPaths, BatchRunner, BatchSummary, RunnerOptions, SectionJob, TaskFailure};
pub use validation::{validate_directory, ValidationReport, ValidationRules, Violation};
