use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use super::MediaBucket;

/// A media bucket backed by a local directory.
#[derive(Debug, Clone)]
pub struct DirBucket {
    root: PathBuf,
}

impl DirBucket {
    /// `uri` may be a plain path or a `file://` URI.
    pub fn open_bucket(uri: &str) -> Result<Self> {
        let root = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        if !root.is_dir() {
            return Err(anyhow!("Media bucket {} is not a directory", root.display()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel_path: &str) -> Result<PathBuf> {
        let rel = Path::new(rel_path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(anyhow!("Invalid bucket path '{}'", rel_path));
        }
        Ok(self.root.join(rel))
    }
}

impl MediaBucket for DirBucket {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(path)?;
        let file = File::open(&full).with_context(|| format!("Failed to open {}", full.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}
