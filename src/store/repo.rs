//! Who's On First style repositories on the local filesystem.
//!
//! Records live under `data/`, at a path derived from their ID:
//! `1159160869` is stored as `data/115/916/086/9/1159160869.geojson`.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use walkdir::WalkDir;

use super::{Feature, Reader, RecordIterator, Writer};

const DATA_DIR: &str = "data";
const EXTENSION: &str = "geojson";

/// Relative path of the record for `id`.
pub fn id_to_rel_path(id: i64) -> PathBuf {
    let digits = id.to_string();
    let mut path = PathBuf::new();

    let bytes = digits.as_bytes();
    for chunk in bytes.chunks(3) {
        path.push(String::from_utf8_lossy(chunk).as_ref());
    }

    path.push(format!("{}.{}", digits, EXTENSION));
    path
}

/// True for record files, false for alternate geometries and anything else.
fn is_record_file(path: &Path) -> bool {
    let is_geojson = path
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(EXTENSION))
        .unwrap_or(false);
    let is_alt = path
        .file_stem()
        .map(|s| s.to_string_lossy().contains("-alt-"))
        .unwrap_or(false);
    is_geojson && !is_alt
}

#[derive(Debug, Clone)]
pub struct Repo {
    root: PathBuf,
}

impl Repo {
    /// `root` may be a plain path or a `repo://` / `file://` URI.
    pub fn new(root: impl AsRef<str>) -> Self {
        let root = root.as_ref();
        let root = root
            .strip_prefix("repo://")
            .or_else(|| root.strip_prefix("file://"))
            .unwrap_or(root);
        Self {
            root: PathBuf::from(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn record_path(&self, id: i64) -> PathBuf {
        self.data_dir().join(id_to_rel_path(id))
    }

    /// All record files under `data/`, sorted by path. Any error while
    /// walking, including a symlink loop, fails the whole listing.
    pub fn record_files(&self) -> Result<Vec<PathBuf>> {
        let data_dir = self.data_dir();
        let mut files = Vec::new();

        for entry in WalkDir::new(&data_dir).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", data_dir.display()))?;
            if entry.file_type().is_file() && is_record_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Highest record ID present, judged by file name. Unreadable entries
    /// are ignored.
    pub fn max_id(&self) -> Option<i64> {
        WalkDir::new(self.data_dir())
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_record_file(e.path()))
            .filter_map(|e| e.path().file_stem()?.to_str()?.parse::<i64>().ok())
            .max()
    }
}

pub struct RepoReader {
    repo: Repo,
}

impl RepoReader {
    pub fn new(repo: Repo) -> Self {
        Self { repo }
    }
}

impl Reader for RepoReader {
    fn load_by_id(&self, id: i64) -> Result<Vec<u8>> {
        let path = self.repo.record_path(id);
        fs::read(&path).with_context(|| format!("Failed to read record {} at {}", id, path.display()))
    }
}

/// Writes records into a repository. Records without `wof:id` are given
/// the next ID above the highest one present when the writer was created.
pub struct RepoWriter {
    repo: Repo,
    next_id: AtomicI64,
}

impl RepoWriter {
    pub fn new(repo: Repo) -> Self {
        let next = repo.max_id().map(|id| id + 1).unwrap_or(1);
        Self {
            repo,
            next_id: AtomicI64::new(next),
        }
    }

    fn assign_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Writer for RepoWriter {
    fn write(&self, body: &[u8]) -> Result<i64> {
        let mut feature = Feature::from_slice(body)?;

        let id = match feature.id() {
            Some(id) if id > 0 => id,
            Some(id) => return Err(anyhow!("Refusing to write record with invalid ID {}", id)),
            None => {
                let id = self.assign_id();
                feature.set_id(id);
                id
            }
        };

        let path = self.repo.record_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Write to a sibling temp file and rename so readers never see a partial record
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, feature.to_bytes()?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        Ok(id)
    }
}

pub struct RepoIterator {
    repo: Repo,
}

impl RepoIterator {
    pub fn new(repo: Repo) -> Self {
        Self { repo }
    }
}

impl RecordIterator for RepoIterator {
    fn iterate(&self, callback: &mut dyn FnMut(&str, &[u8]) -> Result<()>) -> Result<()> {
        let data_dir = self.repo.data_dir();
        if !data_dir.is_dir() {
            return Err(anyhow!("{} is not a directory", data_dir.display()));
        }

        for path in self.repo.record_files()? {
            let body = fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            callback(&path.to_string_lossy(), &body)?;
        }

        Ok(())
    }
}
