//! Typed Post Record.
//!
//! Posts arrive as raw JSON entries from an export bundle. [`Post::from_slice`]
//! parses them; the `append_*`/`expand_*` methods perform the normalization
//! pass. Fields this crate does not interpret are carried through untouched
//! in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::caption::Caption;
use super::hashing::MediaHash;
use super::timestamp;
use crate::error::{PublishError, Result};

/// The caption as it appears in a post: plain text in export bundles, an
/// expanded object once a post has been through the normalization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptionField {
    Expanded(Caption),
    Text(String),
    Body { body: String },
}

impl CaptionField {
    pub fn body(&self) -> &str {
        match self {
            CaptionField::Expanded(c) => &c.body,
            CaptionField::Text(t) => t,
            CaptionField::Body { body } => body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<CaptionField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceptual_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn path(&self) -> Result<&str> {
        self.path.as_deref().ok_or_else(|| PublishError::missing("path"))
    }

    pub fn taken_at(&self) -> Result<&str> {
        self.taken_at
            .as_deref()
            .ok_or_else(|| PublishError::missing("taken_at"))
    }

    pub fn taken(&self) -> Result<i64> {
        self.taken.ok_or_else(|| PublishError::missing("taken"))
    }

    /// Rewrite `taken_at` in the canonical layout and set `taken` to the
    /// matching Unix timestamp.
    pub fn append_taken_timestamp(&mut self) -> Result<()> {
        let t = timestamp::parse_taken_at(self.taken_at()?)?;
        self.taken_at = Some(timestamp::format_canonical(&t));
        self.taken = Some(t.timestamp());
        Ok(())
    }

    /// Expand a plain caption into body/excerpt/hashtags/users. Posts
    /// without a caption are left alone.
    pub fn expand_caption(&mut self) {
        if let Some(field) = &self.caption {
            if !matches!(field, CaptionField::Expanded(_)) {
                self.caption = Some(CaptionField::Expanded(Caption::expand(field.body())));
            }
        }
    }

    pub fn excerpt(&self) -> Result<&str> {
        match &self.caption {
            Some(CaptionField::Expanded(c)) => Ok(&c.excerpt),
            _ => Err(PublishError::missing("caption.excerpt")),
        }
    }

    /// Perceptual hash if present, file hash otherwise.
    pub fn media_hash(&self) -> Option<MediaHash> {
        self.perceptual_hash
            .clone()
            .map(MediaHash::Perceptual)
            .or_else(|| self.file_hash.clone().map(MediaHash::File))
    }

    /// Attach a hash, clearing the other kind so exactly one is populated.
    pub fn set_media_hash(&mut self, hash: MediaHash) {
        match hash {
            MediaHash::Perceptual(h) => {
                self.perceptual_hash = Some(h);
                self.file_hash = None;
            }
            MediaHash::File(h) => {
                self.file_hash = Some(h);
                self.perceptual_hash = None;
            }
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
