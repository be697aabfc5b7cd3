//! Command line interface.

use clap::Parser;
use std::path::PathBuf;

/// Collect, deduplicate, and persist news for a topic.
#[derive(Parser, Debug)]
#[command(name = "newsfold", version, about)]
pub struct Cli {
    /// Topic to collect news about.
    pub topic: String,

    /// Run configuration file.
    #[arg(short, long, default_value = "newsfold.yaml", env = "NEWSFOLD_CONFIG")]
    pub config: PathBuf,

    /// Directory batches are written under.
    #[arg(short, long, default_value = "output", env = "NEWSFOLD_OUT_DIR")]
    pub out_dir: PathBuf,

    /// Override the config's similarity threshold (0.0 to 1.0).
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Override every scraper's result limit.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Fetch detail pages for results without bodies, regardless of config.
    #[arg(long)]
    pub go_detail: bool,
}
