use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::GrayImage;

use crate::config::FrameStoreConfig;

/// Anything that can hand out numbered grayscale frames.
///
/// Frame numbers are 1-based. `frame_count` may grow while a converter is
/// still writing files, so callers re-query it rather than caching.
pub trait FrameSource: Send + Sync {
    fn frame_count(&self) -> Result<usize>;
    fn load_frame(&self, number: usize) -> Result<GrayImage>;
}

/// Directory of sequentially numbered stills, e.g. `frames/out0001.png`.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
    digits: usize,
}

impl FrameStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
        digits: usize,
    ) -> Self {
        let extension = extension.into();
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.trim_start_matches('.').to_owned(),
            digits,
        }
    }

    pub fn from_config(config: &FrameStoreConfig) -> Self {
        Self::new(
            config.dir.clone(),
            config.prefix.clone(),
            config.extension.clone(),
            config.digits,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, number: usize) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            number,
            self.extension,
            width = self.digits
        )
    }

    pub fn frame_path(&self, number: usize) -> PathBuf {
        self.dir.join(self.file_name(number))
    }

    /// printf-style pattern for the whole sequence, e.g. `frames/out%04d.png`,
    /// as an external converter expects it.
    pub fn sequence_pattern(&self) -> PathBuf {
        self.dir.join(format!(
            "{}%0{}d.{}",
            self.prefix, self.digits, self.extension
        ))
    }

    /// Recover the frame number from a file name such as `out0042.png`.
    pub fn frame_number(&self, file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?
            .parse::<usize>()
            .ok()
    }

}

impl FrameSource for FrameStore {
    fn frame_count(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed reading frames directory {}", self.dir.display()))?;

        let mut count = 0;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed listing {}", self.dir.display()))?;
            if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
                continue;
            }
            let numbered = entry
                .file_name()
                .to_str()
                .and_then(|name| self.frame_number(name))
                .is_some();
            if numbered {
                count += 1;
            }
        }
        Ok(count)
    }

    fn load_frame(&self, number: usize) -> Result<GrayImage> {
        let path = self.frame_path(number);
        let image =
            image::open(&path).with_context(|| format!("failed decoding {}", path.display()))?;
        Ok(image.into_luma8())
    }
}
