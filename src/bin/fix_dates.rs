//! ig-fix-dates: repair `taken_at` on records whose Pacific wall-clock time
//! was exported labelled as UTC.
//!
//! Each run shifts the timestamps again, so run it once per repository.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use instagram_publish::backfill::fix_taken_at;
use instagram_publish::config::Config;
use instagram_publish::logging;
use instagram_publish::store::{RecordIterator, Repo, RepoIterator, RepoWriter, Writer};

#[derive(Parser, Debug)]
#[command(name = "ig-fix-dates", version, about = "Repair Pacific time taken_at values exported as UTC")]
struct Args {
    /// Repository to update (defaults to [repo] path)
    #[arg(long)]
    iterator_source: Option<String>,

    /// Repository repaired records are written to (defaults to the iterator source)
    #[arg(long)]
    writer_uri: Option<String>,

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

    let writer = RepoWriter::new(Repo::new(args.writer_uri.as_deref().unwrap_or(&source)));
    let (mut fixed, mut failed) = (0usize, 0usize);

    RepoIterator::new(Repo::new(&source)).iterate(&mut |path, body| {
        match fix_taken_at(body) {
            Ok(mut feature) => {
                feature.prepare_export();
                let id = writer.write(&feature.to_bytes()?)?;
                info!(path, wof_id = id, "Repaired taken_at");
                fixed += 1;
            }
            Err(e) => {
                warn!(path, error = %format_args!("{:#}", anyhow::Error::from(e)), "Failed to repair taken_at");
                failed += 1;
            }
        }
        Ok(())
    })?;

    info!(fixed, failed, "Done");
    Ok(())
}
