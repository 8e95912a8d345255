//! ig-hash: find media that appear more than once across export bundles.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use instagram_publish::config::Config;
use instagram_publish::duplicates::{export_report, write_report, DuplicateFinder, ReportFormat};
use instagram_publish::logging;
use instagram_publish::media::{ExportBundle, ImageHasher};
use instagram_publish::store::DirBucket;

#[derive(Parser, Debug)]
#[command(name = "ig-hash", version, about = "Report duplicate media in Instagram export bundles")]
struct Args {
    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format: text, json or csv
    #[arg(short, long, default_value = "text")]
    format: String,

    #[arg(short, long, env = "IGPUBLISH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// Export bundles (directories or media.json files)
    #[arg(required = true)]
    bundles: Vec<String>,
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

    let format = ReportFormat::from_name(&args.format)
        .ok_or_else(|| anyhow!("Unknown report format '{}'", args.format))?;

    let hasher = ImageHasher;
    let mut finder = DuplicateFinder::new();

    for uri in &args.bundles {
        let bundle = ExportBundle::open(uri)?;
        let bucket = DirBucket::open_bucket(&bundle.root().to_string_lossy())
            .with_context(|| format!("Failed to open media for {}", uri))?;
        let posts = bundle.posts()?;

        info!(bundle = %uri, posts = posts.len(), "Hashing bundle");
        finder.add_posts(&posts, &bucket, &hasher, &config.media.video_extensions);
    }

    let report = finder.finish();

    match &args.output {
        Some(path) => {
            export_report(&report, format, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), duplicates = report.duplicates.len(), "Report written");
        }
        None => write_report(&report, format, std::io::stdout().lock())?,
    }

    Ok(())
}
