//! Lookup index from media identity (or media path) to record ID.
//!
//! The index is built by a single pass over an existing corpus before any
//! posts are merged, and is read-only afterwards so it can be shared across
//! concurrent merges without locking.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::identity::{self, get_path, FEATURE_POST_PREFIX};
use crate::store::RecordIterator;

const ID_PATH: &str = "properties.wof:id";

/// Two records that resolve to the same media identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub media_id: String,
    pub existing: i64,
    pub incoming: i64,
}

impl From<&Collision> for PublishError {
    fn from(c: &Collision) -> Self {
        PublishError::IdentityCollision {
            media_id: c.media_id.clone(),
            existing: c.existing,
            incoming: c.incoming,
        }
    }
}

/// How a post was matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    MediaId(i64),
    Path(i64),
}

impl Match {
    pub fn id(&self) -> i64 {
        match self {
            Match::MediaId(id) | Match::Path(id) => *id,
        }
    }
}

#[derive(Debug, Default)]
pub struct LookupIndex {
    by_media_id: HashMap<String, i64>,
    by_path: HashMap<String, i64>,
    collisions: Vec<Collision>,
    records: usize,
    skipped: usize,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, media_id: &str) -> Option<i64> {
        self.by_media_id.get(media_id).copied()
    }

    pub fn get_by_path(&self, path: &str) -> Option<i64> {
        self.by_path.get(path).copied()
    }

    /// Look up `media_id`, falling back to the media path. The fallback
    /// catches posts whose identity changed between export runs.
    pub fn resolve(&self, media_id: &str, path: Option<&str>) -> Option<Match> {
        self.get(media_id)
            .map(Match::MediaId)
            .or_else(|| path.and_then(|p| self.get_by_path(p)).map(Match::Path))
    }

    pub fn len(&self) -> usize {
        self.by_media_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_media_id.is_empty() && self.by_path.is_empty()
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Records seen during the build.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Records seen without a hash, and so without a media identity.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Map `media_id` to `id`. A different existing mapping is replaced and
    /// reported as a collision.
    pub fn insert_media_id(&mut self, media_id: String, id: i64) -> Option<Collision> {
        match self.by_media_id.insert(media_id.clone(), id) {
            Some(existing) if existing != id => {
                let collision = Collision {
                    media_id,
                    existing,
                    incoming: id,
                };
                self.collisions.push(collision.clone());
                Some(collision)
            }
            _ => None,
        }
    }

    pub fn insert_path(&mut self, path: String, id: i64) {
        if let Some(existing) = self.by_path.insert(path.clone(), id) {
            if existing != id {
                debug!(path = %path, existing, incoming = id, "Media path maps to more than one record");
            }
        }
    }

    fn index_record(&mut self, source: &str, body: &[u8]) -> Result<()> {
        let record: Value = serde_json::from_slice(body)?;

        let id = get_path(&record, ID_PATH)
            .and_then(Value::as_i64)
            .ok_or_else(|| PublishError::missing(ID_PATH))?;

        self.records += 1;

        let post_path = format!("{}.path", FEATURE_POST_PREFIX);
        if let Some(media_path) = get_path(&record, &post_path).and_then(Value::as_str) {
            self.insert_path(media_path.to_string(), id);
        }

        if identity::media_hash_at(&record, FEATURE_POST_PREFIX).is_none() {
            debug!(source, wof_id = id, "Record has no hash, skipping media identity");
            self.skipped += 1;
            return Ok(());
        }

        let media_id = identity::derive_media_id(&record, FEATURE_POST_PREFIX)?;

        if let Some(collision) = self.insert_media_id(media_id, id) {
            warn!(
                source,
                media_id = %collision.media_id,
                existing = collision.existing,
                incoming = collision.incoming,
                "{}",
                PublishError::from(&collision)
            );
        }

        Ok(())
    }
}

/// Build an index from every record the iterator yields. Any record that is
/// not valid JSON, lacks `wof:id`, or has a hash but an unusable timestamp
/// aborts the whole build.
pub fn build_lookup(iter: &dyn RecordIterator) -> Result<LookupIndex> {
    let mut index = LookupIndex::new();

    let outcome = iter.iterate(&mut |source, body| {
        index
            .index_record(source, body)
            .map_err(|e| anyhow::Error::new(e).context(format!("Failed to index {}", source)))
    });

    if let Err(err) = outcome {
        let message = format!("{:#}", err);
        return Err(match err.downcast::<PublishError>() {
            Ok(publish_err) => publish_err,
            Err(other) => PublishError::collaborator(message, other),
        });
    }

    info!(
        records = index.records(),
        indexed = index.len(),
        skipped = index.skipped(),
        collisions = index.collisions().len(),
        "Lookup index built"
    );

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn record(id: i64, post: Value) -> Value {
        json!({"type": "Feature", "properties": {"wof:id": id, "instagram:post": post}, "geometry": null})
    }

    #[test]
    fn test_build_indexes_hash_and_path() {
        let store = MemoryStore::new();
        store.insert(
            1,
            record(1, json!({"taken_at": "2019-03-11T21:14:37Z", "perceptual_hash": "p:01", "path": "photos/a.jpg"})),
        );
        store.insert(2, record(2, json!({"taken_at": "2019-03-12T21:14:37Z", "path": "photos/b.jpg"})));

        let index = build_lookup(&store).unwrap();

        let media_id = identity::derive(
            "2019-03-11T21:14:37Z",
            &crate::media::MediaHash::Perceptual("p:01".to_string()),
        )
        .unwrap();

        assert_eq!(index.get(&media_id), Some(1));
        assert_eq!(index.len(), 1);
        assert_eq!(index.skipped(), 1);
        assert_eq!(index.records(), 2);
        assert_eq!(index.get_by_path("photos/b.jpg"), Some(2));
        assert_eq!(index.resolve("unknown", Some("photos/b.jpg")), Some(Match::Path(2)));
        assert_eq!(index.resolve(&media_id, Some("photos/b.jpg")), Some(Match::MediaId(1)));
        assert_eq!(index.resolve("unknown", None), None);
    }

    #[test]
    fn test_missing_id_fails_whole_build() {
        let store = MemoryStore::new();
        store.insert(1, record(1, json!({"taken_at": "2019-03-11T21:14:37Z", "perceptual_hash": "p:01"})));
        store.insert(2, json!({"type": "Feature", "properties": {}, "geometry": null}));
        store.insert(3, record(3, json!({"taken_at": "2019-03-13T21:14:37Z", "perceptual_hash": "p:03"})));

        let err = build_lookup(&store).unwrap_err();
        assert!(err.is_missing_field(), "unexpected error {:?}", err);
    }

    #[test]
    fn test_collisions_are_reported() {
        let post = json!({"taken_at": "2019-03-11T21:14:37Z", "perceptual_hash": "p:01"});
        let store = MemoryStore::new();
        store.insert(1, record(1, post.clone()));
        store.insert(2, record(2, post));

        let index = build_lookup(&store).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.collisions().len(), 1);
        assert_eq!(index.collisions()[0].existing, 1);
        assert_eq!(index.collisions()[0].incoming, 2);
    }

    #[test]
    fn test_reinserting_same_id_is_not_a_collision() {
        let mut index = LookupIndex::new();
        assert!(index.insert_media_id("abc".into(), 1).is_none());
        assert!(index.insert_media_id("abc".into(), 1).is_none());
        assert!(index.collisions().is_empty());
    }

    #[test]
    fn test_bad_timestamp_fails_build() {
        let store = MemoryStore::new();
        store.insert(1, record(1, json!({"taken_at": "someday", "perceptual_hash": "p:01"})));
        assert!(matches!(
            build_lookup(&store).unwrap_err(),
            PublishError::TimestampParse { .. }
        ));
    }
}
