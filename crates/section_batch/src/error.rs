use std::time::Duration;

use section_mask::MaskError;
use thiserror::Error;

use crate::validation::ValidationReport;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error("{0}")]
    Validation(ValidationReport),

    #[error("Section {name} did not finish within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Worker for section {name} panicked: {message}")]
    TaskPanicked { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown specimen {0}")]
    UnknownSpecimen(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Short stable name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mask(error) => error.kind(),
            Self::Validation(_) => "validation",
            Self::Timeout { .. } => "timeout",
            Self::TaskPanicked { .. } => "task_panicked",
            Self::Config(_) | Self::TomlDe(_) | Self::Json(_) => "config",
            Self::UnknownSpecimen(_) => "unknown_specimen",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
