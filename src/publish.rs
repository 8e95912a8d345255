//! Merge Instagram posts into the feature repository.
//!
//! [`publish_media`] takes the raw JSON for one post, normalizes it, derives
//! its media identity, finds the record it belongs to (or starts a new one)
//! and writes the merged record. Every step either succeeds or aborts the
//! merge for that post with an error naming the step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::batch::CancelToken;
use crate::error::{PublishError, Result};
use crate::identity;
use crate::lookup::{LookupIndex, Match};
use crate::media::timestamp;
use crate::media::{hash_media, ImageHasher, MediaHasher, Post};
use crate::store::feature::DEFAULT_REPO;
use crate::store::{Feature, MediaBucket, Reader, Writer};

const STEP_PARSE: &str = "parse";
const STEP_TIMESTAMP: &str = "timestamp normalization";
const STEP_HASH: &str = "hash enrichment";
const STEP_IDENTITY: &str = "identity derivation";
const STEP_MATCH: &str = "match resolution";
const STEP_PROJECTION: &str = "field projection";
const STEP_EMBED: &str = "payload embed";
const STEP_PERSIST: &str = "persist";

/// Collaborators and settings shared by every merge in a run.
pub struct PublishOptions {
    pub lookup: Arc<LookupIndex>,
    pub reader: Arc<dyn Reader>,
    pub writer: Arc<dyn Writer>,
    pub media_bucket: Option<Arc<dyn MediaBucket>>,
    pub hasher: Arc<dyn MediaHasher>,
    /// Value of `wof:repo` for new records.
    pub repo: String,
    pub video_extensions: Vec<String>,
    registry: RunRegistry,
}

impl PublishOptions {
    pub fn new(lookup: Arc<LookupIndex>, reader: Arc<dyn Reader>, writer: Arc<dyn Writer>) -> Self {
        Self {
            lookup,
            reader,
            writer,
            media_bucket: None,
            hasher: Arc::new(ImageHasher),
            repo: DEFAULT_REPO.to_string(),
            video_extensions: vec!["mp4".to_string()],
            registry: RunRegistry::default(),
        }
    }

    pub fn with_media_bucket(mut self, bucket: Arc<dyn MediaBucket>) -> Self {
        self.media_bucket = Some(bucket);
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn MediaHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn with_video_extensions(mut self, extensions: Vec<String>) -> Self {
        self.video_extensions = extensions;
        self
    }
}

/// State local to one run: records written so far and per-key locks.
///
/// The lookup index is never mutated once built, so posts written during
/// this run are tracked here. Two posts with the same identity in one batch
/// then resolve to a single record.
#[derive(Default)]
struct RunRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    published: Mutex<HashMap<String, i64>>,
    published_paths: Mutex<HashMap<String, i64>>,
}

impl RunRegistry {
    fn key_lock(&self, key: String) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.locks);
        locks.entry(key).or_default().clone()
    }

    fn published(&self, media_id: &str) -> Option<i64> {
        lock(&self.published).get(media_id).copied()
    }

    fn published_path(&self, path: &str) -> Option<i64> {
        lock(&self.published_paths).get(path).copied()
    }

    fn record(&self, media_id: &str, id: i64) {
        lock(&self.published).insert(media_id.to_string(), id);
    }

    fn record_path(&self, path: &str, id: i64) {
        lock(&self.published_paths).insert(path.to_string(), id);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub id: i64,
    pub media_id: String,
    pub matched: Option<Match>,
}

/// Merge one post into the repository.
///
/// Returns `Ok(None)` without touching anything if `cancel` has already
/// fired. Errors are returned to the caller, which decides whether they are
/// fatal.
pub fn publish_media(cancel: &CancelToken, opts: &PublishOptions, body: &[u8]) -> Result<Option<Published>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let mut post = Post::from_slice(body).map_err(|e| e.at_step(STEP_PARSE))?;

    post.append_taken_timestamp()
        .map_err(|e| e.at_step(STEP_TIMESTAMP))?;

    if let Some(bucket) = &opts.media_bucket {
        append_media_hash(opts, bucket.as_ref(), &mut post).map_err(|e| e.at_step(STEP_HASH))?;
    }

    post.expand_caption();

    let media_id = identity::derive_for_post(&post).map_err(|e| e.at_step(STEP_IDENTITY))?;
    post.media_id = Some(media_id.clone());

    // Keep only the hash the identity was derived from
    if let Some(hash) = post.media_hash() {
        post.set_media_hash(hash);
    }

    // Lock order: media, then path, then target record
    let media_lock = opts.registry.key_lock(format!("media:{}", media_id));
    let _media_guard = lock(&*media_lock);

    let path_lock = post.path.as_ref().map(|p| opts.registry.key_lock(format!("path:{}", p)));
    let _path_guard = path_lock.as_ref().map(|l| lock(&**l));

    let matched = opts
        .lookup
        .resolve(&media_id, post.path.as_deref())
        .or_else(|| opts.registry.published(&media_id).map(Match::MediaId))
        .or_else(|| {
            post.path
                .as_deref()
                .and_then(|p| opts.registry.published_path(p))
                .map(Match::Path)
        });

    let target_lock = matched.map(|m| opts.registry.key_lock(format!("wof:{}", m.id())));
    let _target_guard = target_lock.as_ref().map(|l| lock(&**l));

    let mut feature = match matched {
        Some(m) => {
            let existing = load_existing(opts, m.id()).map_err(|e| e.at_step(STEP_MATCH))?;

            // Existing published identities win over recomputed ones
            if let Some(published) = existing.published_media_id() {
                if published != media_id {
                    debug!(media_id = %media_id, published, wof_id = m.id(), "Keeping published media ID");
                }
                post.media_id = Some(published.to_string());
            }

            existing
        }
        None => Feature::new_stub(&opts.repo),
    };

    project_fields(&post, &mut feature).map_err(|e| e.at_step(STEP_PROJECTION))?;

    let payload = post.to_value().map_err(|e| e.at_step(STEP_EMBED))?;
    feature.set_post(payload);

    feature.prepare_export();
    let bytes = feature.to_bytes().map_err(|e| e.at_step(STEP_PERSIST))?;

    let id = opts
        .writer
        .write(&bytes)
        .map_err(|e| PublishError::collaborator("Failed to write record", e).at_step(STEP_PERSIST))?;

    let final_media_id = post.media_id.clone().unwrap_or_else(|| media_id.clone());
    opts.registry.record(&media_id, id);
    opts.registry.record(&final_media_id, id);
    if let Some(path) = &post.path {
        opts.registry.record_path(path, id);
    }

    info!(
        wof_id = id,
        media_id = %final_media_id,
        path = post.path.as_deref().unwrap_or(""),
        matched = matched.is_some(),
        "Wrote record"
    );

    Ok(Some(Published {
        id,
        media_id: final_media_id,
        matched,
    }))
}

fn append_media_hash(opts: &PublishOptions, bucket: &dyn MediaBucket, post: &mut Post) -> Result<()> {
    let path = post.path()?.to_string();

    let bytes = bucket
        .read_all(&path)
        .map_err(|e| PublishError::collaborator(format!("Failed to read {}", path), e))?;

    let hash = hash_media(opts.hasher.as_ref(), &path, &bytes, &opts.video_extensions).map_err(|e| {
        PublishError::Hash {
            path: path.clone(),
            reason: format!("{:#}", e),
        }
    })?;

    post.set_media_hash(hash);
    Ok(())
}

fn load_existing(opts: &PublishOptions, id: i64) -> Result<Feature> {
    let body = opts
        .reader
        .load_by_id(id)
        .map_err(|e| PublishError::collaborator(format!("Failed to load record {}", id), e))?;
    Feature::from_slice(&body)
}

fn project_fields(post: &Post, feature: &mut Feature) -> Result<()> {
    let taken = post.taken()?;
    let edtf = timestamp::edtf_date(taken).ok_or_else(|| PublishError::TimestampParse {
        value: taken.to_string(),
    })?;
    feature.set_dates(taken, &edtf);

    let excerpt = post.excerpt()?;
    feature.set_name(&format!("{}..", excerpt));

    Ok(())
}
