pub mod builder;

use crate::{
    error::{MaskError, Result},
    traits::{CleaningStep, MaskSource},
    types::{SectionImage, SectionMask},
};

/// Mask and cleaned output of one section
#[derive(Debug, Clone)]
pub struct ProcessedSection {
    pub mask: SectionMask,
    pub cleaned: SectionImage,
}

/// One mask source followed by the cleaning steps, applied in order
pub struct Pipeline {
    mask_source: Box<dyn MaskSource>,
    steps: Vec<Box<dyn CleaningStep>>,
}

impl Pipeline {
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(mask_source: Box<dyn MaskSource>, steps: Vec<Box<dyn CleaningStep>>) -> Self {
        Self { mask_source, steps }
    }

    pub fn mask_source_name(&self) -> &'static str {
        self.mask_source.name()
    }

    /// Mask of the section, guaranteed to match the image dimensions
    pub fn extract_mask(&self, name: &str, image: &SectionImage) -> Result<SectionMask> {
        let mask = self.mask_source.extract_mask(name, image)?;
        let (image_width, image_height) = image.dimensions();
        let (mask_width, mask_height) = mask.dimensions();
        if (image_width, image_height) != (mask_width, mask_height) {
            return Err(MaskError::ShapeMismatch {
                image_width,
                image_height,
                mask_width,
                mask_height,
            });
        }
        Ok(mask)
    }

    /// Run every cleaning step with an existing mask
    pub fn clean(&self, image: SectionImage, mask: &SectionMask) -> Result<SectionImage> {
        let mut current = image;
        for step in &self.steps {
            tracing::debug!("Cleaning step {}", step.name());
            current = step.apply(current, mask)?;
        }
        Ok(current)
    }

    /// Extract the mask, then clean with it
    pub fn process(&self, name: &str, image: SectionImage) -> Result<ProcessedSection> {
        let mask = self.extract_mask(name, &image)?;
        let cleaned = self.clean(image, &mask)?;
        Ok(ProcessedSection { mask, cleaned })
    }

    pub fn info(&self) -> String {
        let steps: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        format!(
            "Pipeline: {} mask source, {} cleaning steps [{}]",
            self.mask_source.name(),
            steps.len(),
            steps.join(", ")
        )
    }
}
