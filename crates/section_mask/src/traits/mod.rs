use crate::{
    error::Result,
    types::{SectionImage, SectionMask},
};

/// Anything that can produce the tissue mask of a section
pub trait MaskSource: Send + Sync {
    /// Short name used in logs and summaries
    fn name(&self) -> &'static str;

    /// Compute (or look up) the mask of the section stored under `name`.
    ///
    /// The returned mask has the dimensions of `image`.
    fn extract_mask(&self, name: &str, image: &SectionImage) -> Result<SectionMask>;
}

/// One stage of turning a raw section into its cleaned output
pub trait CleaningStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform the image; `mask` always has the dimensions of the
    /// original section.
    fn apply(&self, image: SectionImage, mask: &SectionMask) -> Result<SectionImage>;
}
