//! In-memory collaborators for tests.

use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Feature, MediaBucket, Reader, RecordIterator, Writer};

pub struct MemoryStore {
    records: Mutex<BTreeMap<i64, Vec<u8>>>,
    next_id: AtomicI64,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1000),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, id: i64, body: serde_json::Value) {
        let bytes = serde_json::to_vec(&body).unwrap();
        self.records.lock().unwrap().insert(id, bytes);
    }

    pub fn feature(&self, id: i64) -> Option<Feature> {
        let records = self.records.lock().unwrap();
        records.get(&id).map(|b| Feature::from_slice(b).unwrap())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Reader for MemoryStore {
    fn load_by_id(&self, id: i64) -> Result<Vec<u8>> {
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("No record {}", id))
    }
}

impl Writer for MemoryStore {
    fn write(&self, body: &[u8]) -> Result<i64> {
        let mut feature = Feature::from_slice(body)?;
        let id = match feature.id() {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                feature.set_id(id);
                id
            }
        };
        self.records.lock().unwrap().insert(id, feature.to_bytes()?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }
}

impl RecordIterator for MemoryStore {
    fn iterate(&self, callback: &mut dyn FnMut(&str, &[u8]) -> Result<()>) -> Result<()> {
        let records = self.records.lock().unwrap().clone();
        for (id, body) in records {
            callback(&format!("memory://{}", id), &body)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBucket {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryBucket {
    pub fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }
}

impl MediaBucket for MemoryBucket {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let bytes = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("No such file {}", path))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
