use schemars::JsonSchema;
use section_batch::{
    BatchError, BatchPaths, BatchRunner, BatchSummary, FileLayout, PrepLayout, Resolution,
    RunnerOptions, SectionJob, SpecimenMetadata, ValidationRules,
};
use section_mask::{CleanParams, MaskConfig, MaskStrategy, Pipeline};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    BatchError(#[from] BatchError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Run configuration shared by every subcommand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Data root; a specimen's sections live under `{root}/{specimen}/preps`
    pub root: PathBuf,
    /// Specimen catalog (TOML or JSON)
    pub metadata: Option<PathBuf>,
    pub strategy: MaskStrategy,
    pub mask: MaskConfig,
    pub clean: CleanParams,
    /// Channel that gets intensity scaling and equalization
    pub reference_channel: u8,
    pub workers: usize,
    pub timeout_secs: u64,
    /// Check the input directory before a batch starts
    pub validate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            metadata: None,
            strategy: MaskStrategy::default(),
            mask: MaskConfig::default(),
            clean: CleanParams::reference_channel(),
            reference_channel: 1,
            workers: 4,
            timeout_secs: 300,
            validate: true,
        }
    }
}

impl RunConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RunConfig)
    }

    pub fn layout(&self, specimen: Option<&str>) -> PrepLayout {
        match specimen {
            Some(id) => PrepLayout::new(self.root.join(id).join("preps")),
            None => PrepLayout::new(&self.root),
        }
    }

    pub fn batch_paths(
        &self,
        specimen: Option<&str>,
        channel: u8,
        resolution: Resolution,
    ) -> BatchPaths {
        let layout = self.layout(specimen);
        BatchPaths {
            input_dir: layout.input_dir(channel, resolution),
            mask_dir: layout.mask_dir(resolution),
            output_dir: layout.cleaned_dir(channel, resolution),
        }
    }

    /// Contour strategies follow the specimen's counterstain when it is known
    pub fn strategy_for(&self, metadata: Option<&SpecimenMetadata>) -> MaskStrategy {
        match (&self.strategy, metadata) {
            (MaskStrategy::Contour { .. }, Some(metadata)) if !metadata.stain.is_empty() => {
                MaskStrategy::Contour {
                    stain: metadata.stain_profile(),
                }
            }
            (strategy, _) => strategy.clone(),
        }
    }

    /// Cleaning for `channel`: only the reference channel is rescaled and
    /// equalized, and the specimen canvas applies unless one is configured.
    pub fn clean_params(
        &self,
        channel: u8,
        resolution: Resolution,
        metadata: Option<&SpecimenMetadata>,
    ) -> CleanParams {
        let mut params = self.clean.clone();
        if channel != self.reference_channel {
            params.scaling = None;
            params.equalize = None;
        }
        if params.canvas.is_none() {
            params.canvas = metadata.map(|m| m.canvas(resolution));
        }
        params
    }

    pub fn validation_rules(
        &self,
        resolution: Resolution,
        metadata: Option<&SpecimenMetadata>,
    ) -> Option<ValidationRules> {
        self.validate.then(|| {
            ValidationRules::for_resolution(resolution)
                .with_expected_count(metadata.map_or(0, |m| m.section_count))
        })
    }

    /// Pipeline for one channel of one specimen
    pub fn pipeline(
        &self,
        channel: u8,
        resolution: Resolution,
        metadata: Option<&SpecimenMetadata>,
    ) -> Pipeline {
        let strategy = self.strategy_for(metadata);
        Pipeline::builder()
            .strategy(&strategy, &self.mask)
            .clean_params(&self.clean_params(channel, resolution, metadata))
            .build()
    }

    /// Run `job` over one channel. Section failures are reported in the
    /// summary; only setup and validation errors are returned.
    pub async fn run_job(
        &self,
        job: SectionJob,
        specimen: Option<&str>,
        channel: u8,
        resolution: Resolution,
        metadata: Option<&SpecimenMetadata>,
    ) -> Result<BatchSummary, CliError> {
        let runner = BatchRunner::new(
            self.pipeline(channel, resolution, metadata),
            self.runner_options(resolution, metadata),
        );
        let paths = self.batch_paths(specimen, channel, resolution);
        Ok(runner.run(job, paths).await?)
    }

    pub fn runner_options(
        &self,
        resolution: Resolution,
        metadata: Option<&SpecimenMetadata>,
    ) -> RunnerOptions {
        RunnerOptions {
            workers: self.workers,
            timeout: Duration::from_secs(self.timeout_secs),
            validation: self.validation_rules(resolution, metadata),
        }
    }
}
