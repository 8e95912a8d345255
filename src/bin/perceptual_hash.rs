//! ig-perceptual-hash: print the perceptual hash of each file, one per line.
//!
//! ```bash
//! $ ig-perceptual-hash export.jpg archived_o.jpg
//! p:b867679231ccc633
//! p:b867679231ccc633
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use instagram_publish::media::{ImageHasher, MediaHasher};

#[derive(Parser, Debug)]
#[command(name = "ig-perceptual-hash", version, about = "Print the perceptual hash of image files")]
struct Args {
    /// Prefix each hash with the file it came from
    #[arg(long)]
    with_path: bool,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn output_line(path: &Path, hash: &str, with_path: bool) -> String {
    if with_path {
        format!("{} {}", path.display(), hash)
    } else {
        hash.to_string()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let hasher = ImageHasher;

    for path in &args.files {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let hash = hasher
            .perceptual_hash(&bytes)
            .with_context(|| format!("Failed to hash {}", path.display()))?;
        println!("{}", output_line(path, &hash, args.with_path));
    }

    Ok(())
}
