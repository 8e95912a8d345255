//! Instagram export bundles.
//!
//! A bundle is a directory holding a `media.json` file whose `photos` and
//! `videos` arrays list one entry per post, with `path` values relative to
//! the bundle directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const MEDIA_JSON: &str = "media.json";

/// Sections of `media.json` that hold posts.
const POST_SECTIONS: &[&str] = &["photos", "videos"];

#[derive(Debug, Default, Deserialize)]
struct MediaJson {
    #[serde(flatten)]
    sections: serde_json::Map<String, Value>,
}

#[derive(Debug)]
pub struct ExportBundle {
    media_json: PathBuf,
    media: MediaJson,
}

impl ExportBundle {
    /// Open a bundle from a `media.json` path, a bundle directory, or a
    /// `file://` URI naming either.
    pub fn open(uri: &str) -> Result<Self> {
        let mut path = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        if path.is_dir() {
            path = path.join(MEDIA_JSON);
        }

        let content = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let media: MediaJson = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Self {
            media_json: path,
            media,
        })
    }

    /// Directory that `path` values in the bundle are relative to.
    pub fn root(&self) -> &Path {
        self.media_json.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn media_json(&self) -> &Path {
        &self.media_json
    }

    /// Raw JSON bytes of every post in the bundle, photos first.
    pub fn posts(&self) -> Result<Vec<Vec<u8>>> {
        let mut posts = Vec::new();

        for section in POST_SECTIONS {
            let entries = match self.media.sections.get(*section) {
                Some(Value::Array(entries)) => entries,
                Some(_) => anyhow::bail!(
                    "'{}' in {} is not an array",
                    section,
                    self.media_json.display()
                ),
                None => continue,
            };

            for entry in entries {
                posts.push(serde_json::to_vec(entry)?);
            }
        }

        Ok(posts)
    }
}
