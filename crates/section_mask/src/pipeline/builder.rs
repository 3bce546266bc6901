use crate::{
    algorithms::composite::CanvasSpec,
    config::{CleanParams, EqualizeParams, MaskConfig, ScaleParams},
    pipeline::Pipeline,
    sources::BlobMaskSource,
    stages::{CanvasPlacement, Equalization, IntensityScaling, MaskApplication},
    strategy::MaskStrategy,
    traits::{CleaningStep, MaskSource},
};

/// Builder for section pipelines.
///
/// Cleaning steps always run in the same order: masking, scaling,
/// equalization, placement.
pub struct PipelineBuilder {
    mask_source: Option<Box<dyn MaskSource>>,
    mask_floor: u8,
    scaling: Option<ScaleParams>,
    equalize: Option<EqualizeParams>,
    canvas: Option<CanvasSpec>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            mask_source: None,
            mask_floor: CleanParams::default().mask_floor,
            scaling: None,
            equalize: None,
            canvas: None,
        }
    }

    /// Set the mask source (replaces any existing one)
    pub fn mask_source<S>(mut self, source: S) -> Self
    where
        S: MaskSource + 'static,
    {
        self.mask_source = Some(Box::new(source));
        self
    }

    pub fn strategy(mut self, strategy: &MaskStrategy, config: &MaskConfig) -> Self {
        self.mask_source = Some(strategy.build(config));
        self
    }

    pub fn with_mask_floor(mut self, floor: u8) -> Self {
        self.mask_floor = floor;
        self
    }

    pub fn with_scaling(mut self, params: ScaleParams) -> Self {
        self.scaling = Some(params);
        self
    }

    pub fn with_equalization(mut self, params: EqualizeParams) -> Self {
        self.equalize = Some(params);
        self
    }

    pub fn with_canvas(mut self, canvas: CanvasSpec) -> Self {
        self.canvas = Some(canvas);
        self
    }

    /// Take every cleaning option from `params`
    pub fn clean_params(mut self, params: &CleanParams) -> Self {
        self.mask_floor = params.mask_floor;
        self.scaling = params.scaling;
        self.equalize = params.equalize.clone();
        self.canvas = params.canvas.clone();
        self
    }

    /// Build the pipeline, defaulting to the blob mask source
    pub fn build(self) -> Pipeline {
        let mask_source = self
            .mask_source
            .unwrap_or_else(|| Box::new(BlobMaskSource::default()));

        let mut steps: Vec<Box<dyn CleaningStep>> = vec![Box::new(MaskApplication {
            floor: self.mask_floor,
        })];
        if let Some(params) = self.scaling {
            steps.push(Box::new(IntensityScaling { params }));
        }
        if let Some(params) = self.equalize {
            steps.push(Box::new(Equalization { params }));
        }
        if let Some(canvas) = self.canvas {
            steps.push(Box::new(CanvasPlacement { canvas }));
        }

        Pipeline::new(mask_source, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_is_fixed() {
        let pipeline = PipelineBuilder::new()
            .with_canvas(CanvasSpec::new(10, 10))
            .with_equalization(EqualizeParams::default())
            .with_scaling(ScaleParams::default())
            .build();
        assert_eq!(
            pipeline.info(),
            "Pipeline: blob mask source, 4 cleaning steps [mask_application, intensity_scaling, equalization, canvas_placement]"
        );
    }

    #[test]
    fn test_clean_params_reference_channel() {
        let pipeline = Pipeline::builder()
            .clean_params(&CleanParams::reference_channel())
            .build();
        assert!(pipeline.info().contains("intensity_scaling"));
        assert!(!pipeline.info().contains("canvas_placement"));
    }
}
