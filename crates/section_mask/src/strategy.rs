use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr, VariantNames};

use crate::{
    config::{MaskConfig, StainProfile},
    sources::{BlobMaskSource, ContourMaskSource, PrecomputedMaskSource},
    traits::MaskSource,
};

/// How the mask of each section is obtained
#[derive(
    Debug, Clone, Default,
    Serialize, Deserialize, JsonSchema,
    Display, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskStrategy {
    /// Histogram threshold, largest blob, closing
    #[default]
    Blob,

    /// Contour accumulation tuned for a stain
    Contour {
        /// Ignored when `MaskConfig::contour` sets explicit constants
        #[serde(default)]
        stain: StainProfile,
    },

    /// Read masks computed by another tool
    Precomputed {
        dir: PathBuf,
        #[serde(default)]
        channel: Option<usize>,
    },
}

impl MaskStrategy {
    /// JSON schema of every strategy
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MaskStrategy)
    }

    pub fn strategy_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Blob => "Threshold at the histogram valley, keep the main blob and close it",
            Self::Contour { .. } => "Accumulate central contours with stain-specific constants",
            Self::Precomputed { .. } => "Load masks produced elsewhere, one file per section",
        }
    }

    /// Shared config with the strategy's stain; explicit contour constants win
    fn contour_config(stain: StainProfile, config: &MaskConfig) -> MaskConfig {
        if config.contour.is_some() {
            tracing::warn!(
                "Explicit contour constants override the {stain} profile"
            );
        }
        MaskConfig {
            stain,
            ..config.clone()
        }
    }

    /// Instantiate the mask source, taking shared constants from `config`
    pub fn build(&self, config: &MaskConfig) -> Box<dyn MaskSource> {
        match self {
            Self::Blob => Box::new(BlobMaskSource::from_config(config)),
            Self::Contour { stain } => {
                Box::new(ContourMaskSource::from_config(&Self::contour_config(*stain, config)))
            }
            Self::Precomputed { dir, channel } => Box::new(PrecomputedMaskSource {
                dir: dir.clone(),
                channel: *channel,
            }),
        }
    }
}
