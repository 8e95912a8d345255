//! Collaborators that read, write and enumerate records and media.
//!
//! The merge engine only talks to these traits. Filesystem implementations
//! live in [`repo`] and [`bucket`].

pub mod bucket;
pub mod feature;
pub mod repo;

#[cfg(test)]
pub mod memory;

use anyhow::Result;
use std::io::Read;

pub use bucket::DirBucket;
pub use feature::Feature;
pub use repo::{Repo, RepoIterator, RepoReader, RepoWriter};

/// Loads existing Target Records by native ID.
pub trait Reader: Send + Sync {
    fn load_by_id(&self, id: i64) -> Result<Vec<u8>>;
}

/// Persists Target Records, assigning an ID to records that lack one.
pub trait Writer: Send + Sync {
    fn write(&self, body: &[u8]) -> Result<i64>;
}

/// Fetches raw media bytes by bucket-relative path.
pub trait MediaBucket: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Enumerates every record in a corpus. An error returned by the callback
/// stops iteration and is returned to the caller.
pub trait RecordIterator {
    fn iterate(&self, callback: &mut dyn FnMut(&str, &[u8]) -> Result<()>) -> Result<()>;
}
