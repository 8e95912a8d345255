//! ig-publish: merge posts from Instagram export bundles into a feature
//! repository.
//!
//! ## Usage
//!
//! ```bash
//! ig-publish --iterator-source repo:///data/instagram /exports/2019-03
//! ig-publish --media-bucket-uri /exports/2019-03 --max-procs 4 /exports/2019-03/media.json
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use instagram_publish::batch::{publish_batch, CancelToken, Throttle};
use instagram_publish::config::Config;
use instagram_publish::logging;
use instagram_publish::lookup::build_lookup;
use instagram_publish::media::{ExportBundle, ImageHasher};
use instagram_publish::publish::PublishOptions;
use instagram_publish::store::{DirBucket, Repo, RepoIterator, RepoReader, RepoWriter};

#[derive(Parser, Debug)]
#[command(name = "ig-publish", version, about = "Merge Instagram export bundles into a feature repository")]
struct Args {
    /// Repository whose records seed the lookup index
    #[arg(long)]
    iterator_source: Option<String>,

    /// Repository existing records are loaded from (defaults to the iterator source)
    #[arg(long)]
    reader_uri: Option<String>,

    /// Repository merged records are written to (defaults to the iterator source)
    #[arg(long)]
    writer_uri: Option<String>,

    /// Directory to read media from when posts need hashing
    #[arg(long)]
    media_bucket_uri: Option<String>,

    /// Value for wof:repo on new records
    #[arg(long)]
    repo_name: Option<String>,

    /// Maximum number of merges running at once
    #[arg(long)]
    max_procs: Option<usize>,

    #[arg(short, long, env = "IGPUBLISH_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Export bundles (directories or media.json files)
    #[arg(required = true)]
    bundles: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging, args.verbose)?;

    let source = args
        .iterator_source
        .clone()
        .or_else(|| config.repo.path.as_ref().map(|p| p.display().to_string()))
        .ok_or_else(|| anyhow!("No iterator source: pass --iterator-source or set [repo] path"))?;

    let source_repo = Repo::new(&source);
    let lookup = tokio::task::spawn_blocking(move || build_lookup(&RepoIterator::new(source_repo)))
        .await?
        .with_context(|| format!("Failed to build lookup index from {}", source))?;

    if !lookup.collisions().is_empty() {
        warn!(collisions = lookup.collisions().len(), "Some media identities map to more than one record");
    }

    let reader = RepoReader::new(Repo::new(args.reader_uri.as_deref().unwrap_or(&source)));
    let writer = RepoWriter::new(Repo::new(args.writer_uri.as_deref().unwrap_or(&source)));

    let mut opts = PublishOptions::new(Arc::new(lookup), Arc::new(reader), Arc::new(writer))
        .with_hasher(Arc::new(ImageHasher))
        .with_repo(args.repo_name.clone().unwrap_or_else(|| config.repo.name.clone()))
        .with_video_extensions(config.media.video_extensions.clone());

    let bucket_uri = args
        .media_bucket_uri
        .clone()
        .or_else(|| config.media.bucket.as_ref().map(|p| p.display().to_string()));

    if let Some(uri) = bucket_uri {
        let bucket = DirBucket::open_bucket(&uri).with_context(|| format!("Failed to open media bucket {}", uri))?;
        opts = opts.with_media_bucket(Arc::new(bucket));
    }

    // Open every bundle before merging anything
    let bundles = args
        .bundles
        .iter()
        .map(|uri| ExportBundle::open(uri).map(|b| (uri.clone(), b)))
        .collect::<Result<Vec<_>>>()?;

    let opts = Arc::new(opts);
    let throttle = Throttle::new(args.max_procs.unwrap_or(config.publish.max_procs));
    let cancel = CancelToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, letting running merges finish");
                cancel.cancel();
            }
        });
    }

    let (mut published, mut failed, mut cancelled) = (0, 0, 0);

    for (uri, bundle) in bundles {
        let posts = bundle
            .posts()
            .with_context(|| format!("Failed to read posts from {}", uri))?;

        info!(bundle = %uri, posts = posts.len(), "Publishing bundle");

        let report = publish_batch(opts.clone(), &throttle, &cancel, posts).await;
        published += report.published.len();
        failed += report.failed.len();
        cancelled += report.cancelled;
    }

    info!(published, failed, cancelled, "Done");
    Ok(())
}
