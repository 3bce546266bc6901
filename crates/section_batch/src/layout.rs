use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use crate::error::Result;

/// Downsampling of thumbnails relative to the full-resolution scan
pub const SCALING_FACTOR: f64 = 1.0 / 32.0;

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
    #[default]
    Thumbnail,
    Full,
}

impl Resolution {
    pub fn scaling_factor(&self) -> f64 {
        match self {
            Self::Thumbnail => SCALING_FACTOR,
            Self::Full => 1.0,
        }
    }

    /// Smallest plausible file size in bytes
    pub fn min_file_size(&self) -> u64 {
        const STARTING_SIZE: f64 = 3000.0;
        match self {
            Self::Thumbnail => STARTING_SIZE as u64,
            Self::Full => (STARTING_SIZE * SCALING_FACTOR * 1000.0) as u64,
        }
    }
}

/// Where a specimen's inputs and outputs live
pub trait FileLayout: Send + Sync {
    fn input_dir(&self, channel: u8, resolution: Resolution) -> PathBuf;
    fn cleaned_dir(&self, channel: u8, resolution: Resolution) -> PathBuf;
    fn mask_dir(&self, resolution: Resolution) -> PathBuf;
}

/// `CH{n}/thumbnail`, `CH{n}/thumbnail_cleaned`, `masks/thumbnail_masked`
/// under one preparation root (`full` in place of `thumbnail` for full
/// resolution).
#[derive(Debug, Clone)]
pub struct PrepLayout {
    pub root: PathBuf,
}

impl PrepLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn channel_dir(&self, channel: u8) -> PathBuf {
        self.root.join(format!("CH{channel}"))
    }
}

impl FileLayout for PrepLayout {
    fn input_dir(&self, channel: u8, resolution: Resolution) -> PathBuf {
        self.channel_dir(channel).join(resolution.to_string())
    }

    fn cleaned_dir(&self, channel: u8, resolution: Resolution) -> PathBuf {
        self.channel_dir(channel).join(format!("{resolution}_cleaned"))
    }

    fn mask_dir(&self, resolution: Resolution) -> PathBuf {
        self.root.join("masks").join(format!("{resolution}_masked"))
    }
}

/// File names of the sections in `dir`, sorted, hidden files skipped
pub fn list_sections(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prep_layout_paths() {
        let layout = PrepLayout::new("/data/DK39/preps");
        assert_eq!(
            layout.input_dir(1, Resolution::Thumbnail),
            PathBuf::from("/data/DK39/preps/CH1/thumbnail")
        );
        assert_eq!(
            layout.cleaned_dir(3, Resolution::Full),
            PathBuf::from("/data/DK39/preps/CH3/full_cleaned")
        );
        assert_eq!(
            layout.mask_dir(Resolution::Thumbnail),
            PathBuf::from("/data/DK39/preps/masks/thumbnail_masked")
        );
    }

    #[test]
    fn test_min_file_size() {
        assert_eq!(Resolution::Thumbnail.min_file_size(), 3000);
        assert_eq!(Resolution::Full.min_file_size(), 93750);
    }

    #[test]
    fn test_list_sections_sorted() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        for name in ["010.tif", "002.tif", ".hidden", "001.tif"] {
            std::fs::write(dir.path().join(name), b"x").expect("Should write file");
        }
        std::fs::create_dir(dir.path().join("nested")).expect("Should create dir");

        let names = list_sections(dir.path()).expect("Should list sections");
        assert_eq!(names, vec!["001.tif", "002.tif", "010.tif"]);
    }
}
