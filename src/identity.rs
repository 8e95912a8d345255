//! Media identities.
//!
//! A media identity is a (hopefully) persistent identifier for a post,
//! derived from its canonical `taken_at` timestamp and its perceptual or
//! file hash. Instagram does not give us one, so we make our own.

use md5::{Digest, Md5};
use serde_json::Value;

use crate::error::{PublishError, Result};
use crate::media::timestamp;
use crate::media::{MediaHash, Post};

/// Prefix under which posts are embedded in published feature records.
pub const FEATURE_POST_PREFIX: &str = "properties.instagram:post";

/// Hex-encoded MD5 digest of `s`.
pub fn derive_media_id_from_string(s: &str) -> String {
    format!("{:x}", Md5::digest(s.as_bytes()))
}

/// Derive the identity for a `(taken_at, hash)` pair. `taken_at` may be in
/// any accepted layout; it is normalized before hashing.
pub fn derive(taken_at: &str, hash: &MediaHash) -> Result<String> {
    let canonical = timestamp::normalize_taken_at(taken_at)?;
    Ok(derive_media_id_from_string(&format!(
        "{} {}",
        canonical,
        hash.as_str()
    )))
}

/// Derive the identity of a typed post.
pub fn derive_for_post(post: &Post) -> Result<String> {
    let taken_at = post.taken_at()?;
    let hash = post
        .media_hash()
        .ok_or_else(|| PublishError::missing("perceptual_hash"))?;
    derive(taken_at, &hash)
}

/// Derive the identity of an untyped document. `prefix` is a dotted path
/// to the object holding the post fields: empty for a bare post,
/// [`FEATURE_POST_PREFIX`] for a published feature.
pub fn derive_media_id(body: &Value, prefix: &str) -> Result<String> {
    let taken_path = prefixed(prefix, "taken_at");

    let taken_at = match get_path(body, &taken_path) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(PublishError::TimestampParse {
                value: other.to_string(),
            })
        }
        None => return Err(PublishError::MissingField(taken_path)),
    };

    let hash = media_hash_at(body, prefix)
        .ok_or_else(|| PublishError::MissingField(prefixed(prefix, "perceptual_hash")))?;

    derive(&taken_at, &hash)
}

/// The perceptual hash under `prefix`, falling back to the file hash.
pub fn media_hash_at(body: &Value, prefix: &str) -> Option<MediaHash> {
    let string_at = |field: &str| {
        get_path(body, &prefixed(prefix, field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    string_at("perceptual_hash")
        .map(MediaHash::Perceptual)
        .or_else(|| string_at("file_hash").map(MediaHash::File))
}

fn prefixed(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// Resolve a dotted path such as `properties.wof:id`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}
