use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use thiserror::Error;
use tracing::{info, warn};

use crate::layout::{list_sections, Resolution};

/// Checks run on an input directory before a batch starts
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ValidationRules {
    /// Files below this size in bytes are reported
    pub min_file_size: u64,
    /// Expected number of files, 0 to accept whatever the directory holds
    #[serde(default)]
    pub expected_count: usize,
    /// Require every file to share the same width and height
    #[serde(default)]
    pub same_size: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::for_resolution(Resolution::Thumbnail)
    }
}

impl ValidationRules {
    pub fn for_resolution(resolution: Resolution) -> Self {
        Self {
            min_file_size: resolution.min_file_size(),
            expected_count: 0,
            same_size: false,
        }
    }

    pub fn with_expected_count(mut self, count: usize) -> Self {
        self.expected_count = count;
        self
    }

    pub fn with_same_size(mut self, same_size: bool) -> Self {
        self.same_size = same_size;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Violation {
    #[error("Directory is missing or unreadable: {reason}")]
    UnreadableDirectory { reason: String },

    #[error("{name} is unreadable: {reason}")]
    UnreadableFile { name: String, reason: String },

    #[error("{name} is too small ({size} bytes, minimum {minimum})")]
    TooSmall { name: String, size: u64, minimum: u64 },

    #[error("Expected {expected} files, found {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("Widths differ: {widths:?}")]
    WidthsDiffer { widths: Vec<u32> },

    #[error("Heights differ: {heights:?}")]
    HeightsDiffer { heights: Vec<u32> },
}

/// Every problem found in one directory
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub dir: PathBuf,
    pub files_checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(
                f,
                "{}: {} files OK",
                self.dir.display(),
                self.files_checked
            );
        }
        write!(
            f,
            "{}: {} problem(s) in {} files",
            self.dir.display(),
            self.violations.len(),
            self.files_checked
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

/// Check `dir` against `rules`, collecting every violation instead of
/// stopping at the first.
pub fn validate_directory(dir: &Path, rules: &ValidationRules) -> ValidationReport {
    let mut report = ValidationReport {
        dir: dir.to_path_buf(),
        files_checked: 0,
        violations: Vec::new(),
    };

    let names = match list_sections(dir) {
        Ok(names) => names,
        Err(error) => {
            report.violations.push(Violation::UnreadableDirectory {
                reason: error.to_string(),
            });
            return report;
        }
    };
    report.files_checked = names.len();

    if rules.expected_count != 0 && names.len() != rules.expected_count {
        report.violations.push(Violation::CountMismatch {
            expected: rules.expected_count,
            found: names.len(),
        });
    }

    let mut widths = Vec::new();
    let mut heights = Vec::new();
    for name in &names {
        let path = dir.join(name);
        let size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                report.violations.push(Violation::UnreadableFile {
                    name: name.clone(),
                    reason: error.to_string(),
                });
                continue;
            }
        };
        if size < rules.min_file_size {
            report.violations.push(Violation::TooSmall {
                name: name.clone(),
                size,
                minimum: rules.min_file_size,
            });
        }

        match image::image_dimensions(&path) {
            Ok((width, height)) if rules.same_size => {
                widths.push(width);
                heights.push(height);
            }
            Ok(_) => {}
            Err(error) => report.violations.push(Violation::UnreadableFile {
                name: name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    widths.sort_unstable();
    widths.dedup();
    if widths.len() > 1 {
        report.violations.push(Violation::WidthsDiffer { widths });
    }
    heights.sort_unstable();
    heights.dedup();
    if heights.len() > 1 {
        report.violations.push(Violation::HeightsDiffer { heights });
    }

    if report.is_valid() {
        info!("{report}");
    } else {
        warn!("{report}");
    }
    report
}
