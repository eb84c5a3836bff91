//! Command-line interface.
//!
//! Every flag overrides the matching key of the YAML config file. The output
//! directory and dedup state path can also come from the environment.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Multi-source news ingestion: scrape the registered sites on a schedule and
/// publish each run as a JSON feed.
///
/// # Examples
///
/// ```sh
/// # Daemon with the defaults (hourly runs into ./feed)
/// newswire_ingest
///
/// # One run of two sources, for cron
/// newswire_ingest --once --source clarin --source lanacion -o /srv/feed \
///     --dedup-state /var/lib/newswire/dedup.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory the JSON feed is written to
    #[arg(short, long, env = "NEWSWIRE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Run a single ingestion cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Only run this source (repeatable)
    #[arg(long = "source", value_name = "NAME")]
    pub sources: Vec<String>,

    /// JSON file the dedup index is persisted to between runs
    #[arg(long, env = "NEWSWIRE_DEDUP_STATE")]
    pub dedup_state: Option<PathBuf>,

    /// Print the registered source names and exit
    #[arg(long)]
    pub list_sources: bool,
}

impl Cli {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.dedup_state {
            config.dedup_state = Some(path.clone());
        }
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
    }
}
