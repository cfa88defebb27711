//! Read-only access to named resources such as caption tracks.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

/// "Open named resource". Parsers take one of these instead of touching the
/// filesystem, so tracks can come from disk, memory, or anything else.
pub trait AssetProvider {
    fn open(&self, name: &str) -> Result<Box<dyn BufRead + '_>>;
}

/// Assets under one directory. Names resolving outside it (via `..`,
/// absolute paths, or symlinks) are refused.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = fs::canonicalize(root.as_ref())
            .with_context(|| format!("asset directory {} is unreadable", root.as_ref().display()))?;
        Ok(Self { root })
    }

    /// Map an asset name to a file under the root. Names with `..` or a root
    /// component are refused before touching the disk; symlinks are caught by
    /// comparing canonical paths.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir))
        {
            bail!("asset name '{name}' leaves {}", self.root.display());
        }

        let located = fs::canonicalize(self.root.join(relative))
            .with_context(|| format!("asset '{name}' not found under {}", self.root.display()))?;
        if !located.starts_with(&self.root) {
            bail!("asset '{name}' links outside {}", self.root.display());
        }
        Ok(located)
    }
}

impl AssetProvider for DirectoryAssets {
    fn open(&self, name: &str) -> Result<Box<dyn BufRead + '_>> {
        let path = self.resolve(name)?;
        let file =
            File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// In-memory assets keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    entries: HashMap<String, String>,
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.entries.insert(name.into(), contents.into());
        self
    }
}

impl AssetProvider for StaticAssets {
    fn open(&self, name: &str) -> Result<Box<dyn BufRead + '_>> {
        let contents = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow!("asset '{name}' not found"))?;
        Ok(Box::new(Cursor::new(contents.as_bytes())))
    }
}
