//! Find media that appear more than once across export bundles.
//!
//! Every post is keyed by `{taken}-{sha256}` and, for images, also by
//! `{taken}-{perceptual hash}`. A key seen twice is reported along with the
//! path that claimed it first.

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::media::hashing::is_video;
use crate::media::timestamp;
use crate::media::{MediaHasher, Post};
use crate::store::MediaBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    File,
    Perceptual,
}

impl HashKind {
    pub fn name(&self) -> &'static str {
        match self {
            HashKind::File => "file",
            HashKind::Perceptual => "perceptual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Duplicate {
    pub kind: HashKind,
    pub hash: String,
    pub path: String,
    pub existing_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct DuplicateReport {
    pub scanned: usize,
    pub duplicates: Vec<Duplicate>,
    pub failures: Vec<MediaFailure>,
}

struct HashedMedia {
    path: String,
    taken: i64,
    file_hash: String,
    perceptual_hash: Option<String>,
}

fn hash_post(
    body: &[u8],
    bucket: &dyn MediaBucket,
    hasher: &dyn MediaHasher,
    video_extensions: &[String],
) -> Result<Option<HashedMedia>> {
    let post = Post::from_slice(body)?;

    // Entries without media (text-only profile changes and the like) are not interesting
    let Some(path) = post.path.clone() else {
        return Ok(None);
    };

    let taken = timestamp::parse_taken_at(post.taken_at()?)?.timestamp();
    let bytes = bucket.read_all(&path)?;

    let perceptual_hash = if is_video(&path, video_extensions) {
        None
    } else {
        Some(hasher.perceptual_hash(&bytes)?)
    };

    Ok(Some(HashedMedia {
        file_hash: hasher.file_hash(&bytes),
        path,
        taken,
        perceptual_hash,
    }))
}

/// Accumulates `{taken}-{hash}` keys across one or more bundles.
#[derive(Debug, Default)]
pub struct DuplicateFinder {
    seen: HashMap<String, String>,
    report: DuplicateReport,
}

impl DuplicateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash every post in parallel, then record keys already claimed by an
    /// earlier post. Duplicates are attributed in input order.
    pub fn add_posts(
        &mut self,
        posts: &[Vec<u8>],
        bucket: &dyn MediaBucket,
        hasher: &dyn MediaHasher,
        video_extensions: &[String],
    ) {
        let hashed: Vec<(usize, Result<Option<HashedMedia>>)> = posts
            .par_iter()
            .enumerate()
            .map(|(i, body)| (i, hash_post(body, bucket, hasher, video_extensions)))
            .collect();

        for (index, outcome) in hashed {
            let media = match outcome {
                Ok(Some(media)) => media,
                Ok(None) => continue,
                Err(e) => {
                    let path = Post::from_slice(&posts[index])
                        .ok()
                        .and_then(|p| p.path)
                        .unwrap_or_else(|| format!("#{}", index));
                    warn!(path = %path, error = %format_args!("{:#}", e), "Failed to hash media");
                    self.report.failures.push(MediaFailure {
                        path,
                        error: format!("{:#}", e),
                    });
                    continue;
                }
            };

            self.record(media);
        }
    }

    fn record(&mut self, media: HashedMedia) {
        self.report.scanned += 1;
        debug!(path = %media.path, file_hash = %media.file_hash, "Hashed media");

        let mut keys = vec![(HashKind::File, media.file_hash.clone())];
        if let Some(phash) = &media.perceptual_hash {
            keys.push((HashKind::Perceptual, phash.clone()));
        }

        for (kind, hash) in keys {
            let key = format!("{}-{}", media.taken, hash);
            match self.seen.get(&key) {
                Some(existing) => {
                    warn!(kind = kind.name(), hash = %hash, path = %media.path, existing = %existing, "Duplicate media");
                    self.report.duplicates.push(Duplicate {
                        kind,
                        hash,
                        path: media.path.clone(),
                        existing_path: existing.clone(),
                    });
                }
                None => {
                    self.seen.insert(key, media.path.clone());
                }
            }
        }
    }

    pub fn finish(self) -> DuplicateReport {
        self.report
    }
}

/// Duplicate report for a single set of posts.
pub fn find_duplicates(
    posts: &[Vec<u8>],
    bucket: &dyn MediaBucket,
    hasher: &dyn MediaHasher,
    video_extensions: &[String],
) -> DuplicateReport {
    let mut finder = DuplicateFinder::new();
    finder.add_posts(posts, bucket, hasher, video_extensions);
    finder.finish()
}

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

pub fn write_report<W: Write>(report: &DuplicateReport, format: ReportFormat, mut out: W) -> Result<()> {
    match format {
        ReportFormat::Text => {
            for d in &report.duplicates {
                writeln!(
                    out,
                    "Existing {} hash ({}) for {}: {}",
                    d.kind.name(),
                    d.hash,
                    d.path,
                    d.existing_path
                )?;
            }
            writeln!(
                out,
                "{} scanned, {} duplicates, {} failures",
                report.scanned,
                report.duplicates.len(),
                report.failures.len()
            )?;
        }
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, report)?;
            writeln!(out)?;
        }
        ReportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(out);
            wtr.write_record(["kind", "hash", "path", "existing_path"])?;
            for d in &report.duplicates {
                wtr.write_record([d.kind.name(), d.hash.as_str(), d.path.as_str(), d.existing_path.as_str()])?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

pub fn export_report(report: &DuplicateReport, format: ReportFormat, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    write_report(report, format, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBucket;
    use serde_json::json;

    struct BytesHasher;

    impl MediaHasher for BytesHasher {
        fn perceptual_hash(&self, bytes: &[u8]) -> anyhow::Result<String> {
            Ok(format!("p:{}", bytes.first().copied().unwrap_or(0)))
        }

        fn file_hash(&self, bytes: &[u8]) -> String {
            String::from_utf8_lossy(bytes).to_string()
        }
    }

    fn post(path: &str, taken_at: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({"path": path, "taken_at": taken_at})).unwrap()
    }

    fn videos() -> Vec<String> {
        vec!["mp4".to_string()]
    }

    #[test]
    fn test_find_duplicates() {
        let bucket = MemoryBucket::default()
            .with_file("a.jpg", b"aaa")
            .with_file("b.jpg", b"aaa")
            .with_file("c.jpg", b"abc")
            .with_file("d.mp4", b"aaa");

        let posts = vec![
            post("a.jpg", "2019-03-11T21:14:37Z"),
            post("b.jpg", "2019-03-11T21:14:37Z"),
            post("c.jpg", "2019-03-11T21:14:37Z"),
            post("d.mp4", "2019-03-12T21:14:37Z"),
            serde_json::to_vec(&json!({"caption": "no media"})).unwrap(),
        ];

        let report = find_duplicates(&posts, &bucket, &BytesHasher, &videos());

        assert_eq!(report.scanned, 4);
        assert!(report.failures.is_empty());

        // b duplicates a on both hashes; c shares a's perceptual hash only
        assert_eq!(report.duplicates.len(), 3);
        assert_eq!(report.duplicates[0].kind, HashKind::File);
        assert_eq!(report.duplicates[0].path, "b.jpg");
        assert_eq!(report.duplicates[0].existing_path, "a.jpg");
        assert_eq!(report.duplicates[2].path, "c.jpg");
        assert_eq!(report.duplicates[2].kind, HashKind::Perceptual);
    }

    #[test]
    fn test_failures_are_collected() {
        let posts = vec![post("missing.jpg", "2019-03-11T21:14:37Z"), post("x.jpg", "not a date")];
        let report = find_duplicates(&posts, &MemoryBucket::default(), &BytesHasher, &videos());

        assert_eq!(report.scanned, 0);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].path, "missing.jpg");
    }

    #[test]
    fn test_duplicates_across_bundles() {
        let first = MemoryBucket::default().with_file("photos/a.jpg", b"xyz");
        let second = MemoryBucket::default().with_file("photos/b.jpg", b"xyz");

        let mut finder = DuplicateFinder::new();
        finder.add_posts(&[post("photos/a.jpg", "2019-03-11T21:14:37Z")], &first, &BytesHasher, &videos());
        finder.add_posts(&[post("photos/b.jpg", "2019-03-11T21:14:37Z")], &second, &BytesHasher, &videos());

        let report = finder.finish();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.duplicates.len(), 2);
        assert!(report.duplicates.iter().all(|d| d.existing_path == "photos/a.jpg"));
    }

    #[test]
    fn test_csv_report() {
        let report = DuplicateReport {
            scanned: 2,
            duplicates: vec![Duplicate {
                kind: HashKind::Perceptual,
                hash: "p:01".into(),
                path: "b.jpg".into(),
                existing_path: "a.jpg".into(),
            }],
            failures: vec![],
        };

        let mut out = Vec::new();
        write_report(&report, ReportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "kind,hash,path,existing_path\nperceptual,p:01,b.jpg,a.jpg\n");
    }

    #[test]
    fn test_report_format_names() {
        assert_eq!(ReportFormat::from_name("CSV"), Some(ReportFormat::Csv));
        assert_eq!(ReportFormat::from_name("xml"), None);
    }
}
