//! One-off repairs over records that are already published.

use serde_json::{json, Value};

use crate::error::{PublishError, Result};
use crate::media::timestamp;
use crate::media::MediaHasher;
use crate::secret;
use crate::store::{Feature, MediaBucket};

/// Give a record a perceptual hash computed from its archived original
/// image, `{media_id}/{media_id}_{secret}_o.jpg` in `bucket`.
///
/// Returns `Ok(None)` when the record already has a perceptual hash.
pub fn assign_perceptual_hash(
    body: &[u8],
    bucket: &dyn MediaBucket,
    hasher: &dyn MediaHasher,
) -> Result<Option<Feature>> {
    let mut feature = Feature::from_slice(body)?;

    let post = feature
        .post()
        .ok_or_else(|| PublishError::missing("properties.instagram:post"))?;

    if post.get("perceptual_hash").and_then(Value::as_str).is_some() {
        return Ok(None);
    }

    let media_id = post
        .get("media_id")
        .and_then(Value::as_str)
        .ok_or_else(|| PublishError::missing("properties.instagram:post.media_id"))?
        .to_string();

    let image_path = secret::original_image_path(&media_id);

    let bytes = bucket
        .read_all(&image_path)
        .map_err(|e| PublishError::collaborator(format!("Failed to open {}", image_path), e))?;

    let phash = hasher.perceptual_hash(&bytes).map_err(|e| PublishError::Hash {
        path: image_path.clone(),
        reason: format!("{:#}", e),
    })?;

    feature.set_post_field("perceptual_hash", json!(phash))?;
    Ok(Some(feature))
}

/// Repair `taken_at`/`taken` on a record whose Pacific wall-clock time was
/// exported labelled as UTC.
///
/// Not idempotent: each run shifts the timestamp again.
pub fn fix_taken_at(body: &[u8]) -> Result<Feature> {
    let mut feature = Feature::from_slice(body)?;

    let taken_at = feature
        .post()
        .and_then(|p| p.get("taken_at"))
        .and_then(Value::as_str)
        .ok_or_else(|| PublishError::missing("properties.instagram:post.taken_at"))?;

    let parsed = timestamp::parse_taken_at(taken_at)?;
    let fixed = timestamp::repair_pacific_wall_clock(&parsed).ok_or_else(|| PublishError::TimestampParse {
        value: taken_at.to_string(),
    })?;

    feature.set_post_field("taken_at", json!(timestamp::format_canonical(&fixed)))?;
    feature.set_post_field("taken", json!(fixed.timestamp()))?;
    Ok(feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBucket;

    struct LenHasher;

    impl MediaHasher for LenHasher {
        fn perceptual_hash(&self, bytes: &[u8]) -> anyhow::Result<String> {
            Ok(format!("p:{:016x}", bytes.len()))
        }

        fn file_hash(&self, _bytes: &[u8]) -> String {
            unreachable!()
        }
    }

    fn record(post: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "Feature",
            "properties": {"wof:id": 1, "instagram:post": post},
            "geometry": null
        }))
        .unwrap()
    }

    #[test]
    fn test_assign_hash_from_archived_original() {
        let media_id = "7784f12fc1c2315991c8afd2542fbc09";
        let bucket = MemoryBucket::default().with_file(
            "7784f12fc1c2315991c8afd2542fbc09/7784f12fc1c2315991c8afd2542fbc09_7bc63e2e17_o.jpg",
            b"0123456789",
        );

        let updated = assign_perceptual_hash(&record(json!({"media_id": media_id})), &bucket, &LenHasher)
            .unwrap()
            .unwrap();

        assert_eq!(updated.post().unwrap()["perceptual_hash"], "p:000000000000000a");
        assert_eq!(updated.post().unwrap()["media_id"], media_id);
    }

    #[test]
    fn test_assign_hash_leaves_hashed_records_alone() {
        let body = record(json!({"media_id": "abc", "perceptual_hash": "p:01"}));
        let outcome = assign_perceptual_hash(&body, &MemoryBucket::default(), &LenHasher).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_assign_hash_missing_image() {
        let body = record(json!({"media_id": "abc"}));
        let err = assign_perceptual_hash(&body, &MemoryBucket::default(), &LenHasher).unwrap_err();
        assert!(matches!(err, PublishError::Collaborator { .. }));
    }

    #[test]
    fn test_assign_hash_requires_media_id() {
        let body = record(json!({"caption": "x"}));
        let err = assign_perceptual_hash(&body, &MemoryBucket::default(), &LenHasher).unwrap_err();
        assert!(err.is_missing_field());
    }

    #[test]
    fn test_fix_taken_at() {
        let body = record(json!({"taken_at": "2019-07-01T20:00:00Z", "taken": 0}));
        let fixed = fix_taken_at(&body).unwrap();
        let post = fixed.post().unwrap();
        assert_eq!(post["taken_at"], "2019-07-01T12:00:00+00:00");
        assert_eq!(post["taken"], 1561982400);
    }

    #[test]
    fn test_fix_taken_at_requires_timestamp() {
        assert!(fix_taken_at(&record(json!({}))).unwrap_err().is_missing_field());
    }
}
