//! ig-assign-hash: give published records a perceptual hash computed from
//! their archived original image.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use instagram_publish::backfill::assign_perceptual_hash;
use instagram_publish::config::Config;
use instagram_publish::logging;
use instagram_publish::media::ImageHasher;
use instagram_publish::store::{DirBucket, RecordIterator, Repo, RepoIterator, RepoWriter, Writer};

#[derive(Parser, Debug)]
#[command(name = "ig-assign-hash", version, about = "Backfill perceptual hashes on published records")]
struct Args {
    /// Repository to update (defaults to [repo] path)
    #[arg(long)]
    iterator_source: Option<String>,

    /// Repository updated records are written to (defaults to the iterator source)
    #[arg(long)]
    writer_uri: Option<String>,

    /// Directory holding archived originals, {media_id}/{media_id}_{secret}_o.jpg
    #[arg(long)]
    media_bucket_uri: Option<String>,

    #[arg(short, long, env = "IGPUBLISH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging, args.verbose)?;

    let source = args
        .iterator_source
        .clone()
        .or_else(|| config.repo.path.as_ref().map(|p| p.display().to_string()))
        .ok_or_else(|| anyhow!("No iterator source: pass --iterator-source or set [repo] path"))?;

    let bucket_uri = args
        .media_bucket_uri
        .clone()
        .or_else(|| config.media.bucket.as_ref().map(|p| p.display().to_string()))
        .ok_or_else(|| anyhow!("No media bucket: pass --media-bucket-uri or set [media] bucket"))?;

    let bucket = DirBucket::open_bucket(&bucket_uri)
        .with_context(|| format!("Failed to open media bucket {}", bucket_uri))?;
    let writer = RepoWriter::new(Repo::new(args.writer_uri.as_deref().unwrap_or(&source)));
    let hasher = ImageHasher;

    let (mut updated, mut skipped, mut failed) = (0usize, 0usize, 0usize);

    RepoIterator::new(Repo::new(&source)).iterate(&mut |path, body| {
        match assign_perceptual_hash(body, &bucket, &hasher) {
            Ok(Some(mut feature)) => {
                feature.prepare_export();
                let id = writer.write(&feature.to_bytes()?)?;
                info!(path, wof_id = id, "Assigned perceptual hash");
                updated += 1;
            }
            Ok(None) => {
                debug!(path, "Already hashed");
                skipped += 1;
            }
            Err(e) => {
                warn!(path, error = %format_args!("{:#}", anyhow::Error::from(e)), "Failed to assign perceptual hash");
                failed += 1;
            }
        }
        Ok(())
    })?;

    info!(updated, skipped, failed, "Done");
    Ok(())
}
