use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix marking a perceptual hash string.
pub const PERCEPTUAL_PREFIX: &str = "p:";

/// The content hash attached to a post. Images carry a perceptual hash,
/// everything else a file hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaHash {
    Perceptual(String),
    File(String),
}

impl MediaHash {
    pub fn as_str(&self) -> &str {
        match self {
            MediaHash::Perceptual(h) | MediaHash::File(h) => h,
        }
    }
}

/// Hash functions applied to raw media bytes.
pub trait MediaHasher: Send + Sync {
    fn perceptual_hash(&self, bytes: &[u8]) -> Result<String>;

    fn file_hash(&self, bytes: &[u8]) -> String;
}

/// Default hasher: DCT perceptual hash over a decoded image, SHA-256 for files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHasher;

impl MediaHasher for ImageHasher {
    fn perceptual_hash(&self, bytes: &[u8]) -> Result<String> {
        use img_hash::{HashAlg, HasherConfig};

        let img = image::load_from_memory(bytes)?;

        // thumbnail() preserves aspect ratio and is much cheaper than hashing the full image
        let thumbnail = img.thumbnail(64, 64);

        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        // Convert thumbnail to img_hash's image version
        let rgba = thumbnail.to_rgba8();
        let (width, height) = rgba.dimensions();

        let img_hash_image = img_hash::image::RgbaImage::from_raw(width, height, rgba.into_raw())
            .ok_or_else(|| anyhow!("Failed to create image for hashing"))?;

        let hash = hasher.hash_image(&img_hash::image::DynamicImage::ImageRgba8(img_hash_image));

        let hex: String = hash.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
        Ok(format!("{}{}", PERCEPTUAL_PREFIX, hex))
    }

    fn file_hash(&self, bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }
}

/// True if `path` names a video, judged purely by its extension.
pub fn is_video(path: &str, video_extensions: &[String]) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            video_extensions.iter().any(|v| v.to_lowercase() == ext)
        })
        .unwrap_or(false)
}

/// Hash the media at `path`: file hash for videos, perceptual hash otherwise.
pub fn hash_media(
    hasher: &dyn MediaHasher,
    path: &str,
    bytes: &[u8],
    video_extensions: &[String],
) -> Result<MediaHash> {
    if is_video(path, video_extensions) {
        Ok(MediaHash::File(hasher.file_hash(bytes)))
    } else {
        hasher.perceptual_hash(bytes).map(MediaHash::Perceptual)
    }
}
