use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
};

use schemars::JsonSchema;
use section_mask::{Background, CanvasSpec, Flip, OversizePolicy, StainProfile};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use tracing::info;

use crate::{
    error::{BatchError, Result},
    layout::Resolution,
};

/// Scan geometry and processing hints for one specimen
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SpecimenMetadata {
    /// Full-resolution canvas width
    pub width: u32,
    /// Full-resolution canvas height
    pub height: u32,
    /// Counter-clockwise quarter turns, 0 to 3
    #[serde(default)]
    pub rotation: u8,
    #[serde(default)]
    pub flip: Flip,
    /// Counterstain name as recorded at the scanner, e.g. "NTB" or "thionin"
    #[serde(default)]
    pub stain: String,
    /// Expected number of sections, 0 when unknown
    #[serde(default)]
    pub section_count: usize,
}

impl SpecimenMetadata {
    pub fn stain_profile(&self) -> StainProfile {
        StainProfile::from_counterstain(&self.stain)
    }

    /// Output frame at `resolution`, with a black background
    pub fn canvas(&self, resolution: Resolution) -> CanvasSpec {
        let factor = resolution.scaling_factor();
        CanvasSpec {
            width: (self.width as f64 * factor) as u32,
            height: (self.height as f64 * factor) as u32,
            background: Background::Value(0.0),
            rotation: self.rotation,
            flip: self.flip,
            oversize: OversizePolicy::Reject,
        }
    }
}

#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Mask,
    Clean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub channel: u8,
    pub resolution: Resolution,
}

/// Source of specimen metadata and sink for progress records
pub trait MetadataStore: Send + Sync {
    fn specimen(&self, id: &str) -> Result<SpecimenMetadata>;
    fn mark_stage_complete(&self, id: &str, record: StageRecord) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SpecimenCatalog {
    #[serde(default)]
    pub specimens: HashMap<String, SpecimenMetadata>,
}

/// File-backed metadata with in-memory progress tracking
#[derive(Debug, Default)]
pub struct StaticMetadataStore {
    catalog: SpecimenCatalog,
    completed: Mutex<Vec<(String, StageRecord)>>,
}

impl StaticMetadataStore {
    pub fn new(catalog: SpecimenCatalog) -> Self {
        Self {
            catalog,
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: SpecimenCatalog = toml::from_str(&content)?;
        Ok(Self::new(catalog))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: SpecimenCatalog = serde_json::from_str(&content)?;
        Ok(Self::new(catalog))
    }

    /// Load based on file extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(BatchError::Config(format!(
                "Unsupported metadata file format: {}",
                path.display()
            ))),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, metadata: SpecimenMetadata) {
        self.catalog.specimens.insert(id.into(), metadata);
    }

    /// Stages marked complete so far, in order
    pub fn completed(&self) -> Vec<(String, StageRecord)> {
        self.completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl MetadataStore for StaticMetadataStore {
    fn specimen(&self, id: &str) -> Result<SpecimenMetadata> {
        self.catalog
            .specimens
            .get(id)
            .cloned()
            .ok_or_else(|| BatchError::UnknownSpecimen(id.to_string()))
    }

    fn mark_stage_complete(&self, id: &str, record: StageRecord) -> Result<()> {
        info!(
            "Specimen {id}: {} complete for CH{} {}",
            record.stage, record.channel, record.resolution
        );
        self.completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id.to_string(), record));
        Ok(())
    }
}
